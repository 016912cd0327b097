use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::instrument;

use crate::{
    app_error::{AppError, AppResult},
    application::use_cases::usage_period::UsagePeriodRepo,
    domain::entities::{
        plan_rules::{PlanFeatures, PlanRuleTable, PlanTier, UNLIMITED, resolve_effective_plan},
        subscription_status::SubscriptionStatus,
    },
};

// ============================================================================
// Profiles
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct AccountProfile {
    pub account_id: String,
    pub customer_id: Option<String>,
    pub subscription_id: Option<String>,
    pub price_id: Option<String>,
    /// Last known paid plan. Display data only, see `effective_plan`.
    pub plan_type: Option<String>,
    pub subscription_status: Option<SubscriptionStatus>,
    pub trial_start: Option<DateTime<Utc>>,
    pub trial_end: Option<DateTime<Utc>>,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    /// Set only while cancellation at period end is pending.
    pub canceled_at: Option<DateTime<Utc>>,
    pub scheduled_plan_type: Option<String>,
    pub scheduled_change_at: Option<DateTime<Utc>>,
    /// Provider timestamp of the newest event whose status fields were applied.
    pub last_event_at: Option<DateTime<Utc>>,
    /// Provider timestamp of the newest event whose subscription and plan fields were applied.
    pub plan_event_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl AccountProfile {
    pub fn effective_plan(&self) -> PlanTier {
        resolve_effective_plan(self.subscription_status, self.plan_type.as_deref())
    }
}

/// Field-by-field overwrite of an account.
///
/// `None` leaves a column untouched. For nullable columns, `Some(None)` clears it.
///
/// When `event_at` is set, two field groups are ordered independently:
/// - plan fields (`subscription_id`, `price_id`, `plan_type`) against `plan_event_at`
/// - status fields (status, trial, period bounds, `canceled_at`) against `last_event_at`
///
/// A group only applies if no newer event already wrote it, so a stale event can still
/// fill the group a newer event did not carry. Scheduled-change fields are never ordered.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccountUpdate {
    pub subscription_id: Option<String>,
    pub price_id: Option<String>,
    pub plan_type: Option<String>,
    pub subscription_status: Option<SubscriptionStatus>,
    pub trial_start: Option<Option<DateTime<Utc>>>,
    pub trial_end: Option<Option<DateTime<Utc>>>,
    pub current_period_start: Option<Option<DateTime<Utc>>>,
    pub current_period_end: Option<Option<DateTime<Utc>>>,
    pub canceled_at: Option<Option<DateTime<Utc>>>,
    pub scheduled_plan_type: Option<Option<String>>,
    pub scheduled_change_at: Option<Option<DateTime<Utc>>>,
    pub event_at: Option<DateTime<Utc>>,
}

fn is_fresh(incoming: Option<DateTime<Utc>>, last: Option<DateTime<Utc>>) -> bool {
    match (incoming, last) {
        (Some(incoming), Some(last)) => incoming >= last,
        _ => true,
    }
}

fn advance(last: Option<DateTime<Utc>>, at: DateTime<Utc>) -> Option<DateTime<Utc>> {
    Some(last.map_or(at, |last| last.max(at)))
}

impl AccountUpdate {
    pub fn touches_plan(&self) -> bool {
        self.subscription_id.is_some() || self.price_id.is_some() || self.plan_type.is_some()
    }

    pub fn touches_status(&self) -> bool {
        self.subscription_status.is_some()
            || self.trial_start.is_some()
            || self.trial_end.is_some()
            || self.current_period_start.is_some()
            || self.current_period_end.is_some()
            || self.canceled_at.is_some()
    }

    /// Apply this update to an in-memory profile, honoring the per-group ordering guard.
    ///
    /// Returns false when any field group carried by the update was held back.
    pub fn apply_to(&self, account: &mut AccountProfile) -> bool {
        let plan_fresh = is_fresh(self.event_at, account.plan_event_at);
        let status_fresh = is_fresh(self.event_at, account.last_event_at);

        if plan_fresh {
            if let Some(v) = &self.subscription_id {
                account.subscription_id = Some(v.clone());
            }
            if let Some(v) = &self.price_id {
                account.price_id = Some(v.clone());
            }
            if let Some(v) = &self.plan_type {
                account.plan_type = Some(v.clone());
            }
        }
        if status_fresh {
            if let Some(v) = self.subscription_status {
                account.subscription_status = Some(v);
            }
            if let Some(v) = self.trial_start {
                account.trial_start = v;
            }
            if let Some(v) = self.trial_end {
                account.trial_end = v;
            }
            if let Some(v) = self.current_period_start {
                account.current_period_start = v;
            }
            if let Some(v) = self.current_period_end {
                account.current_period_end = v;
            }
            if let Some(v) = self.canceled_at {
                account.canceled_at = v;
            }
        }
        if let Some(v) = &self.scheduled_plan_type {
            account.scheduled_plan_type = v.clone();
        }
        if let Some(v) = self.scheduled_change_at {
            account.scheduled_change_at = v;
        }
        if let Some(at) = self.event_at {
            if self.touches_plan() {
                account.plan_event_at = advance(account.plan_event_at, at);
            }
            if self.touches_status() {
                account.last_event_at = advance(account.last_event_at, at);
            }
        }

        (plan_fresh || !self.touches_plan()) && (status_fresh || !self.touches_status())
    }
}

// ============================================================================
// Repository Trait
// ============================================================================

#[async_trait]
pub trait AccountRepo: Send + Sync {
    async fn get_by_id(&self, account_id: &str) -> AppResult<Option<AccountProfile>>;

    async fn get_by_customer_id(&self, customer_id: &str) -> AppResult<Option<AccountProfile>>;

    /// Returns false when the account is unknown or a field group was held back by the
    /// ordering guard.
    async fn update(&self, account_id: &str, update: &AccountUpdate) -> AppResult<bool>;
}

// ============================================================================
// Query views
// ============================================================================

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SubscriptionStatusView {
    pub plan_type: Option<String>,
    pub subscription_status: Option<SubscriptionStatus>,
    pub effective_plan: PlanTier,
    pub article_count: i32,
    pub article_limit: i32,
    pub decoration_count: i32,
    pub decoration_limit: i32,
    pub features: PlanFeatures,
    pub current_period_end: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
    pub trial_end: Option<DateTime<Utc>>,
    pub scheduled_plan_type: Option<String>,
    pub scheduled_change_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UsageView {
    pub article_used: i32,
    pub article_limit: i32,
    pub article_remaining: i32,
    pub article_percentage: i32,
    pub decoration_used: i32,
    pub decoration_limit: i32,
    pub reset_date: Option<DateTime<Utc>>,
    pub is_trial: bool,
}

/// Remaining allowance and percentage used for one counter.
fn remaining_and_percentage(used: i32, limit: i32) -> (i32, i32) {
    if limit == UNLIMITED {
        (UNLIMITED, 0)
    } else if limit > 0 {
        let remaining = (limit - used).max(0);
        let percentage = (f64::from(used) / f64::from(limit) * 100.0).round() as i32;
        (remaining, percentage)
    } else {
        (0, 0)
    }
}

// ============================================================================
// Use Cases
// ============================================================================

/// Read-only queries the rest of the application uses to decide entitlement.
#[derive(Clone)]
pub struct AccountUseCases {
    account_repo: Arc<dyn AccountRepo>,
    usage_repo: Arc<dyn UsagePeriodRepo>,
    rules: Arc<PlanRuleTable>,
}

impl AccountUseCases {
    pub fn new(
        account_repo: Arc<dyn AccountRepo>,
        usage_repo: Arc<dyn UsagePeriodRepo>,
        rules: Arc<PlanRuleTable>,
    ) -> Self {
        Self {
            account_repo,
            usage_repo,
            rules,
        }
    }

    async fn get_account(&self, account_id: &str) -> AppResult<AccountProfile> {
        self.account_repo
            .get_by_id(account_id)
            .await?
            .ok_or(AppError::NotFound)
    }

    async fn current_counts(&self, account_id: &str) -> AppResult<(i32, i32)> {
        Ok(self
            .usage_repo
            .get_current(account_id)
            .await?
            .map(|u| (u.article_count, u.decoration_count))
            .unwrap_or((0, 0)))
    }

    /// Effective plan, limits and current counters for an account.
    #[instrument(skip(self))]
    pub async fn get_subscription_status(
        &self,
        account_id: &str,
    ) -> AppResult<SubscriptionStatusView> {
        let account = self.get_account(account_id).await?;
        let effective_plan = account.effective_plan();
        let rule = self.rules.rule(effective_plan);
        let (article_count, decoration_count) = self.current_counts(account_id).await?;

        Ok(SubscriptionStatusView {
            plan_type: account.plan_type,
            subscription_status: account.subscription_status,
            effective_plan,
            article_count,
            article_limit: rule.article_limit,
            decoration_count,
            decoration_limit: rule.decoration_limit,
            features: rule.features,
            current_period_end: account.current_period_end,
            cancel_at_period_end: account.canceled_at.is_some(),
            trial_end: account.trial_end,
            scheduled_plan_type: account.scheduled_plan_type,
            scheduled_change_at: account.scheduled_change_at,
        })
    }

    /// Usage against the effective plan's limits for the current period.
    #[instrument(skip(self))]
    pub async fn get_usage(&self, account_id: &str) -> AppResult<UsageView> {
        let account = self.get_account(account_id).await?;
        let effective_plan = account.effective_plan();
        let rule = self.rules.rule(effective_plan);
        let (article_used, decoration_used) = self.current_counts(account_id).await?;
        let (article_remaining, article_percentage) =
            remaining_and_percentage(article_used, rule.article_limit);

        Ok(UsageView {
            article_used,
            article_limit: rule.article_limit,
            article_remaining,
            article_percentage,
            decoration_used,
            decoration_limit: rule.decoration_limit,
            reset_date: account.current_period_end,
            is_trial: effective_plan == PlanTier::Trialing,
        })
    }
}
