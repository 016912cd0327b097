//! Stripe webhook receiver.

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
};
use secrecy::ExposeSecret;
use serde_json::json;

use crate::{
    adapters::http::app_state::AppState,
    app_error::{AppError, AppResult},
    application::use_cases::webhook_dispatch::DispatchOutcome,
    domain::entities::billing_event::WebhookEnvelope,
    infra::stripe_client::StripeClient,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/webhook", post(handle_webhook))
}

/// POST /api/stripe/webhook
///
/// 200 once the event is applied, ignored, or already handled; 500 when a
/// handler failed so Stripe redelivers.
async fn handle_webhook(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> AppResult<impl IntoResponse> {
    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::InvalidSignature("Missing Stripe signature".into()))?;

    StripeClient::verify_webhook_signature(
        &body,
        signature,
        app_state.config.stripe_webhook_secret.expose_secret(),
        app_state.config.webhook_tolerance_secs,
    )?;

    let envelope: WebhookEnvelope = serde_json::from_str(&body)
        .map_err(|e| AppError::InvalidInput(format!("Invalid webhook payload: {}", e)))?;

    let outcome = app_state.webhook_dispatch.dispatch(&envelope).await?;

    let status = match outcome {
        DispatchOutcome::Failed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::OK,
    };
    Ok((status, Json(json!({ "status": outcome.as_str() }))))
}
