use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::use_cases::usage_period::{UsagePeriodProfile, UsagePeriodRepo},
};

fn row_to_profile(row: sqlx::postgres::PgRow) -> UsagePeriodProfile {
    UsagePeriodProfile {
        account_id: row.get("account_id"),
        period_start: row.get("period_start"),
        period_end: row.get("period_end"),
        article_count: row.get("article_count"),
        decoration_count: row.get("decoration_count"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

const SELECT_COLS: &str =
    "account_id, period_start, period_end, article_count, decoration_count, created_at, updated_at";

#[async_trait]
impl UsagePeriodRepo for PostgresPersistence {
    async fn reset(
        &self,
        account_id: &str,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> AppResult<UsagePeriodProfile> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO usage_periods (account_id, period_start, period_end, article_count, decoration_count)
            VALUES ($1, $2, $3, 0, 0)
            ON CONFLICT (account_id, period_start) DO UPDATE SET
                period_end = EXCLUDED.period_end,
                article_count = 0,
                decoration_count = 0,
                updated_at = NOW()
            RETURNING {}
            "#,
            SELECT_COLS
        ))
        .bind(account_id)
        .bind(period_start)
        .bind(period_end)
        .fetch_one(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(row_to_profile(row))
    }

    async fn get_current(&self, account_id: &str) -> AppResult<Option<UsagePeriodProfile>> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {} FROM usage_periods
            WHERE account_id = $1
            ORDER BY period_start DESC
            LIMIT 1
            "#,
            SELECT_COLS
        ))
        .bind(account_id)
        .fetch_optional(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(row.map(row_to_profile))
    }
}
