use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::use_cases::webhook_dispatch::{ClaimOutcome, WebhookEventRepo},
};

#[async_trait]
impl WebhookEventRepo for PostgresPersistence {
    async fn try_claim(
        &self,
        event_id: &str,
        event_type: &str,
        stale_before: DateTime<Utc>,
    ) -> AppResult<ClaimOutcome> {
        // Insert, or take over a failed/abandoned attempt. A row comes back only if we own it.
        let claimed = sqlx::query(
            r#"
            INSERT INTO webhook_events (event_id, event_type, processed, attempts)
            VALUES ($1, $2, FALSE, 1)
            ON CONFLICT (event_id) DO UPDATE SET
                attempts = webhook_events.attempts + 1,
                error_message = NULL,
                updated_at = NOW()
            WHERE webhook_events.processed = FALSE
              AND (webhook_events.error_message IS NOT NULL OR webhook_events.updated_at < $3)
            RETURNING event_id
            "#,
        )
        .bind(event_id)
        .bind(event_type)
        .bind(stale_before)
        .fetch_optional(self.pool())
        .await
        .map_err(AppError::from)?;

        if claimed.is_some() {
            return Ok(ClaimOutcome::Claimed);
        }

        let row = sqlx::query("SELECT processed FROM webhook_events WHERE event_id = $1")
            .bind(event_id)
            .fetch_optional(self.pool())
            .await
            .map_err(AppError::from)?;

        Ok(match row {
            Some(row) if row.get::<bool, _>("processed") => ClaimOutcome::AlreadyProcessed,
            _ => ClaimOutcome::InFlight,
        })
    }

    async fn mark_processed(&self, event_id: &str) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE webhook_events
            SET processed = TRUE, error_message = NULL, updated_at = NOW()
            WHERE event_id = $1
            "#,
        )
        .bind(event_id)
        .execute(self.pool())
        .await
        .map_err(AppError::from)?;
        Ok(())
    }

    async fn mark_failed(&self, event_id: &str, error_message: &str) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE webhook_events
            SET processed = FALSE, error_message = $2, updated_at = NOW()
            WHERE event_id = $1
            "#,
        )
        .bind(event_id)
        .bind(error_message)
        .execute(self.pool())
        .await
        .map_err(AppError::from)?;
        Ok(())
    }
}
