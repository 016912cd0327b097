use async_trait::async_trait;
use sqlx::Row;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::use_cases::account::{AccountProfile, AccountRepo, AccountUpdate},
    domain::entities::subscription_status::SubscriptionStatus,
};

fn row_to_profile(row: sqlx::postgres::PgRow) -> AccountProfile {
    let status: Option<String> = row.get("subscription_status");
    AccountProfile {
        account_id: row.get("account_id"),
        customer_id: row.get("customer_id"),
        subscription_id: row.get("subscription_id"),
        price_id: row.get("price_id"),
        plan_type: row.get("plan_type"),
        subscription_status: status.as_deref().map(SubscriptionStatus::from_stripe),
        trial_start: row.get("trial_start"),
        trial_end: row.get("trial_end"),
        current_period_start: row.get("current_period_start"),
        current_period_end: row.get("current_period_end"),
        canceled_at: row.get("canceled_at"),
        scheduled_plan_type: row.get("scheduled_plan_type"),
        scheduled_change_at: row.get("scheduled_change_at"),
        last_event_at: row.get("last_event_at"),
        plan_event_at: row.get("plan_event_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

const SELECT_COLS: &str = r#"
    account_id, customer_id, subscription_id, price_id, plan_type, subscription_status,
    trial_start, trial_end, current_period_start, current_period_end, canceled_at,
    scheduled_plan_type, scheduled_change_at, last_event_at, plan_event_at, created_at, updated_at
"#;

const PLAN_FRESH: &str = "($20::timestamptz IS NULL OR prev.plan_event_at IS NULL OR prev.plan_event_at <= $20::timestamptz)";
const STATUS_FRESH: &str = "($20::timestamptz IS NULL OR prev.last_event_at IS NULL OR prev.last_event_at <= $20::timestamptz)";

#[async_trait]
impl AccountRepo for PostgresPersistence {
    async fn get_by_id(&self, account_id: &str) -> AppResult<Option<AccountProfile>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM accounts WHERE account_id = $1",
            SELECT_COLS
        ))
        .bind(account_id)
        .fetch_optional(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(row.map(row_to_profile))
    }

    async fn get_by_customer_id(&self, customer_id: &str) -> AppResult<Option<AccountProfile>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM accounts WHERE customer_id = $1",
            SELECT_COLS
        ))
        .bind(customer_id)
        .fetch_optional(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(row.map(row_to_profile))
    }

    async fn update(&self, account_id: &str, update: &AccountUpdate) -> AppResult<bool> {
        // Each nullable column takes a (touch, value) pair so Some(None) can clear it.
        // Freshness is judged against the row as locked by `prev`, before this write.
        let row = sqlx::query(&format!(
            r#"
            WITH prev AS (
                SELECT account_id, last_event_at, plan_event_at
                FROM accounts WHERE account_id = $1
                FOR UPDATE
            )
            UPDATE accounts AS a SET
                subscription_id = CASE WHEN {plan} THEN COALESCE($2, a.subscription_id) ELSE a.subscription_id END,
                price_id = CASE WHEN {plan} THEN COALESCE($3, a.price_id) ELSE a.price_id END,
                plan_type = CASE WHEN {plan} THEN COALESCE($4, a.plan_type) ELSE a.plan_type END,
                subscription_status = CASE WHEN {status} THEN COALESCE($5, a.subscription_status) ELSE a.subscription_status END,
                trial_start = CASE WHEN $6 AND {status} THEN $7 ELSE a.trial_start END,
                trial_end = CASE WHEN $8 AND {status} THEN $9 ELSE a.trial_end END,
                current_period_start = CASE WHEN $10 AND {status} THEN $11 ELSE a.current_period_start END,
                current_period_end = CASE WHEN $12 AND {status} THEN $13 ELSE a.current_period_end END,
                canceled_at = CASE WHEN $14 AND {status} THEN $15 ELSE a.canceled_at END,
                scheduled_plan_type = CASE WHEN $16 THEN $17 ELSE a.scheduled_plan_type END,
                scheduled_change_at = CASE WHEN $18 THEN $19 ELSE a.scheduled_change_at END,
                plan_event_at = CASE
                    WHEN $20::timestamptz IS NULL OR NOT $21 THEN a.plan_event_at
                    ELSE GREATEST(a.plan_event_at, $20::timestamptz)
                END,
                last_event_at = CASE
                    WHEN $20::timestamptz IS NULL OR NOT $22 THEN a.last_event_at
                    ELSE GREATEST(a.last_event_at, $20::timestamptz)
                END,
                updated_at = NOW()
            FROM prev
            WHERE a.account_id = prev.account_id
            RETURNING ((NOT $21 OR {plan}) AND (NOT $22 OR {status})) AS applied
            "#,
            plan = PLAN_FRESH,
            status = STATUS_FRESH,
        ))
        .bind(account_id)
        .bind(update.subscription_id.as_deref())
        .bind(update.price_id.as_deref())
        .bind(update.plan_type.as_deref())
        .bind(update.subscription_status.map(|s| s.as_str()))
        .bind(update.trial_start.is_some())
        .bind(update.trial_start.flatten())
        .bind(update.trial_end.is_some())
        .bind(update.trial_end.flatten())
        .bind(update.current_period_start.is_some())
        .bind(update.current_period_start.flatten())
        .bind(update.current_period_end.is_some())
        .bind(update.current_period_end.flatten())
        .bind(update.canceled_at.is_some())
        .bind(update.canceled_at.flatten())
        .bind(update.scheduled_plan_type.is_some())
        .bind(update.scheduled_plan_type.clone().flatten())
        .bind(update.scheduled_change_at.is_some())
        .bind(update.scheduled_change_at.flatten())
        .bind(update.event_at)
        .bind(update.touches_plan())
        .bind(update.touches_status())
        .fetch_optional(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(row.is_some_and(|row| row.get::<bool, _>("applied")))
    }
}
