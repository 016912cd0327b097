use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    app_error::AppResult,
    application::use_cases::account::AccountProfile,
    domain::entities::{
        billing_event::{InvoiceObject, timestamp_to_utc},
        billing_record_status::BillingRecordStatus,
    },
};

/// Currency assumed when an invoice does not state one.
pub const DEFAULT_CURRENCY: &str = "jpy";

#[derive(Debug, Clone, PartialEq)]
pub struct BillingRecordProfile {
    pub id: Uuid,
    pub account_id: String,
    pub invoice_id: String,
    pub payment_intent_id: Option<String>,
    pub amount: i64,
    pub currency: String,
    pub status: BillingRecordStatus,
    pub plan_type: Option<String>,
    pub period_start: Option<DateTime<Utc>>,
    pub period_end: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewBillingRecord {
    pub account_id: String,
    pub invoice_id: String,
    pub payment_intent_id: Option<String>,
    pub amount: i64,
    pub currency: String,
    pub status: BillingRecordStatus,
    pub plan_type: Option<String>,
    pub period_start: Option<DateTime<Utc>>,
    pub period_end: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait BillingRecordRepo: Send + Sync {
    /// Append a record. Returns false if one already exists for the same invoice and status.
    async fn append(&self, record: &NewBillingRecord) -> AppResult<bool>;
}

/// Appends immutable invoice outcomes.
#[derive(Clone)]
pub struct BillingLedgerUseCases {
    repo: Arc<dyn BillingRecordRepo>,
}

impl BillingLedgerUseCases {
    pub fn new(repo: Arc<dyn BillingRecordRepo>) -> Self {
        Self { repo }
    }

    fn build(
        account: &AccountProfile,
        invoice: &InvoiceObject,
        status: BillingRecordStatus,
        amount: i64,
    ) -> NewBillingRecord {
        let period = invoice.line_period();
        NewBillingRecord {
            account_id: account.account_id.clone(),
            invoice_id: invoice.id.clone(),
            payment_intent_id: invoice.payment_intent.clone(),
            amount,
            currency: invoice
                .currency
                .clone()
                .unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
            status,
            plan_type: account.plan_type.clone(),
            period_start: period.and_then(|p| timestamp_to_utc(p.start)),
            period_end: period.and_then(|p| timestamp_to_utc(p.end)),
        }
    }

    async fn append(&self, record: NewBillingRecord) -> AppResult<()> {
        let inserted = self.repo.append(&record).await?;
        if inserted {
            info!(
                account_id = %record.account_id,
                invoice_id = %record.invoice_id,
                status = record.status.as_str(),
                amount = record.amount,
                currency = %record.currency,
                "Billing record appended"
            );
        } else {
            info!(
                invoice_id = %record.invoice_id,
                status = record.status.as_str(),
                "Billing record already present, skipping"
            );
        }
        Ok(())
    }

    /// Record money actually collected for an invoice.
    #[instrument(skip_all, fields(invoice_id = %invoice.id))]
    pub async fn record_paid(&self, account: &AccountProfile, invoice: &InvoiceObject) -> AppResult<()> {
        self.append(Self::build(
            account,
            invoice,
            BillingRecordStatus::Paid,
            invoice.amount_paid,
        ))
        .await
    }

    /// Record an uncollected invoice. The amount is what was due, not what was charged.
    #[instrument(skip_all, fields(invoice_id = %invoice.id))]
    pub async fn record_failed(
        &self,
        account: &AccountProfile,
        invoice: &InvoiceObject,
    ) -> AppResult<()> {
        self.append(Self::build(
            account,
            invoice,
            BillingRecordStatus::Failed,
            invoice.amount_due,
        ))
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{InMemoryBillingRecordRepo, create_test_account, test_invoice};

    #[tokio::test]
    async fn paid_record_uses_amount_paid() {
        let repo = Arc::new(InMemoryBillingRecordRepo::new());
        let uc = BillingLedgerUseCases::new(repo.clone());
        let account = create_test_account(|a| a.plan_type = Some("starter".into()));
        let invoice = test_invoice(|i| {
            i.amount_paid = 2000;
            i.amount_due = 2500;
        });

        uc.record_paid(&account, &invoice).await.unwrap();

        let records = repo.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, BillingRecordStatus::Paid);
        assert_eq!(records[0].amount, 2000);
        assert_eq!(records[0].plan_type.as_deref(), Some("starter"));
        assert!(records[0].period_start.is_some());
    }

    #[tokio::test]
    async fn failed_record_uses_amount_due() {
        let repo = Arc::new(InMemoryBillingRecordRepo::new());
        let uc = BillingLedgerUseCases::new(repo.clone());
        let account = create_test_account(|_| {});
        let invoice = test_invoice(|i| {
            i.amount_paid = 0;
            i.amount_due = 2000;
        });

        uc.record_failed(&account, &invoice).await.unwrap();

        let records = repo.records();
        assert_eq!(records[0].status, BillingRecordStatus::Failed);
        assert_eq!(records[0].amount, 2000);
        assert!(!records[0].status.counts_as_revenue());
    }

    #[tokio::test]
    async fn missing_currency_defaults_to_jpy() {
        let repo = Arc::new(InMemoryBillingRecordRepo::new());
        let uc = BillingLedgerUseCases::new(repo.clone());
        let invoice = test_invoice(|i| i.currency = None);

        uc.record_paid(&create_test_account(|_| {}), &invoice)
            .await
            .unwrap();

        assert_eq!(repo.records()[0].currency, DEFAULT_CURRENCY);
    }

    #[tokio::test]
    async fn duplicate_append_is_ignored() {
        let repo = Arc::new(InMemoryBillingRecordRepo::new());
        let uc = BillingLedgerUseCases::new(repo.clone());
        let account = create_test_account(|_| {});
        let invoice = test_invoice(|_| {});

        uc.record_paid(&account, &invoice).await.unwrap();
        uc.record_paid(&account, &invoice).await.unwrap();

        assert_eq!(repo.records().len(), 1);
    }
}
