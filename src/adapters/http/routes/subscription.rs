use axum::{
    Json, Router,
    extract::{Path, State},
    http::HeaderMap,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;

use crate::{
    adapters::http::app_state::AppState,
    app_error::{AppError, AppResult},
    application::{
        ports::billing_provider::PriceId, use_cases::plan_change::PlanChangeMode,
    },
};

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
enum PlanChangeModeRequest {
    Immediate,
    Scheduled,
}

#[derive(Debug, Deserialize)]
struct PlanChangeRequest {
    price_id: String,
    mode: PlanChangeModeRequest,
    #[serde(default)]
    end_trial: Option<bool>,
}

impl PlanChangeRequest {
    fn mode(&self) -> AppResult<PlanChangeMode> {
        match (self.mode, self.end_trial) {
            (PlanChangeModeRequest::Immediate, end_trial) => Ok(PlanChangeMode::Immediate {
                end_trial: end_trial.unwrap_or(false),
            }),
            (PlanChangeModeRequest::Scheduled, Some(true)) => Err(AppError::InvalidInput(
                "end_trial only applies to immediate changes".into(),
            )),
            (PlanChangeModeRequest::Scheduled, _) => Ok(PlanChangeMode::Scheduled),
        }
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{account_id}/subscription", get(get_subscription))
        .route("/{account_id}/usage", get(get_usage))
        .route(
            "/{account_id}/subscription/change-plan",
            post(change_plan),
        )
}

/// GET /api/accounts/{account_id}/subscription
async fn get_subscription(
    State(app_state): State<AppState>,
    Path(account_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let view = app_state
        .account_use_cases
        .get_subscription_status(&account_id)
        .await?;
    Ok(Json(view))
}

/// GET /api/accounts/{account_id}/usage
async fn get_usage(
    State(app_state): State<AppState>,
    Path(account_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let view = app_state.account_use_cases.get_usage(&account_id).await?;
    Ok(Json(view))
}

/// POST /api/accounts/{account_id}/subscription/change-plan
async fn change_plan(
    State(app_state): State<AppState>,
    Path(account_id): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<PlanChangeRequest>,
) -> AppResult<impl IntoResponse> {
    let mode = payload.mode()?;

    // Get or generate idempotency key
    let idempotency_key = headers
        .get("Idempotency-Key")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let result = app_state
        .plan_change_use_cases
        .change_plan(
            &account_id,
            &PriceId::new(payload.price_id),
            mode,
            &idempotency_key,
        )
        .await?;

    Ok(Json(result))
}
