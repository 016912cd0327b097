use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, instrument};

use crate::app_error::{AppError, AppResult};

#[derive(Debug, Clone, PartialEq)]
pub struct UsagePeriodProfile {
    pub account_id: String,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub article_count: i32,
    pub decoration_count: i32,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait UsagePeriodRepo: Send + Sync {
    /// Write a zero-count period for the given bounds, replacing any record with the same start.
    async fn reset(
        &self,
        account_id: &str,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> AppResult<UsagePeriodProfile>;

    /// The most recently started period for the account.
    async fn get_current(&self, account_id: &str) -> AppResult<Option<UsagePeriodProfile>>;
}

/// Owns billing-cycle counters. Prior periods are kept as history.
#[derive(Clone)]
pub struct UsagePeriodUseCases {
    repo: Arc<dyn UsagePeriodRepo>,
}

impl UsagePeriodUseCases {
    pub fn new(repo: Arc<dyn UsagePeriodRepo>) -> Self {
        Self { repo }
    }

    #[instrument(skip(self))]
    pub async fn reset(
        &self,
        account_id: &str,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> AppResult<UsagePeriodProfile> {
        if period_end <= period_start {
            return Err(AppError::InvalidInput(format!(
                "Usage period end {period_end} is not after start {period_start}"
            )));
        }

        let period = self.repo.reset(account_id, period_start, period_end).await?;
        info!(
            account_id,
            period_start = %period.period_start,
            period_end = %period.period_end,
            "Usage period reset"
        );
        Ok(period)
    }
}
