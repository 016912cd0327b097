use async_trait::async_trait;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::use_cases::billing_ledger::{BillingRecordRepo, NewBillingRecord},
};

#[async_trait]
impl BillingRecordRepo for PostgresPersistence {
    async fn append(&self, record: &NewBillingRecord) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO billing_records (
                id, account_id, invoice_id, payment_intent_id, amount, currency,
                status, plan_type, period_start, period_end
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (invoice_id, status) DO NOTHING
            "#,
        )
        .bind(uuid::Uuid::new_v4())
        .bind(&record.account_id)
        .bind(&record.invoice_id)
        .bind(record.payment_intent_id.as_deref())
        .bind(record.amount)
        .bind(&record.currency)
        .bind(record.status.as_str())
        .bind(record.plan_type.as_deref())
        .bind(record.period_start)
        .bind(record.period_end)
        .execute(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(result.rows_affected() == 1)
    }
}
