//! Applies subscription and invoice webhooks to account state.
//!
//! Every handler overwrites fields with the provider's values instead of
//! merging, so re-running a handler with the same payload is harmless. Plan and
//! status writes are additionally ordered by the event timestamp, each group on
//! its own (see `AccountUpdate`).

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use crate::{
    app_error::{AppError, AppResult},
    application::use_cases::{
        account::{AccountProfile, AccountRepo, AccountUpdate},
        billing_ledger::BillingLedgerUseCases,
        usage_period::UsagePeriodUseCases,
    },
    domain::entities::{
        billing_event::{
            InvoiceObject, PreviousAttributes, SubscriptionItem, SubscriptionObject,
            find_base_plan_item, timestamp_to_utc,
        },
        subscription_status::SubscriptionStatus,
    },
};

/// Identity and timing of the event being handled.
#[derive(Debug, Clone)]
pub struct EventContext {
    pub event_id: String,
    pub occurred_at: Option<DateTime<Utc>>,
}

fn ts(secs: Option<i64>) -> Option<DateTime<Utc>> {
    secs.and_then(timestamp_to_utc)
}

fn require_base_item(subscription: &SubscriptionObject) -> AppResult<&SubscriptionItem> {
    subscription.base_plan_item().ok_or_else(|| {
        error!(
            subscription_id = %subscription.id,
            "No line item with plan metadata; check price configuration"
        );
        AppError::MissingBasePlanItem(subscription.id.clone())
    })
}

#[derive(Clone)]
pub struct SubscriptionSyncUseCases {
    account_repo: Arc<dyn AccountRepo>,
    usage: Arc<UsagePeriodUseCases>,
    ledger: Arc<BillingLedgerUseCases>,
}

impl SubscriptionSyncUseCases {
    pub fn new(
        account_repo: Arc<dyn AccountRepo>,
        usage: Arc<UsagePeriodUseCases>,
        ledger: Arc<BillingLedgerUseCases>,
    ) -> Self {
        Self {
            account_repo,
            usage,
            ledger,
        }
    }

    /// Accounts are never created from webhooks; a miss is logged and skipped.
    async fn find_account(&self, customer_id: &str) -> AppResult<Option<AccountProfile>> {
        let account = self.account_repo.get_by_customer_id(customer_id).await?;
        if account.is_none() {
            warn!(customer_id, "No account for customer, skipping event");
        }
        Ok(account)
    }

    async fn apply(&self, account: &AccountProfile, update: &AccountUpdate) -> AppResult<bool> {
        let applied = self.account_repo.update(&account.account_id, update).await?;
        if !applied {
            info!(
                account_id = %account.account_id,
                event_at = ?update.event_at,
                last_event_at = ?account.last_event_at,
                plan_event_at = ?account.plan_event_at,
                "Newer event already applied, its fields left as is"
            );
        }
        Ok(applied)
    }

    #[instrument(skip_all, fields(event_id = %ctx.event_id, subscription_id = %subscription.id))]
    pub async fn on_subscription_created(
        &self,
        ctx: &EventContext,
        subscription: &SubscriptionObject,
    ) -> AppResult<()> {
        let Some(account) = self.find_account(&subscription.customer).await? else {
            return Ok(());
        };
        let base_item = require_base_item(subscription)?;
        let period_start = ts(subscription.period_start());
        let period_end = ts(subscription.period_end());

        let update = AccountUpdate {
            subscription_id: Some(subscription.id.clone()),
            price_id: Some(base_item.price.id.clone()),
            plan_type: base_item.price.plan_type().map(str::to_string),
            subscription_status: Some(SubscriptionStatus::from_stripe(&subscription.status)),
            trial_start: Some(ts(subscription.trial_start)),
            trial_end: Some(ts(subscription.trial_end)),
            current_period_start: Some(period_start),
            current_period_end: Some(period_end),
            event_at: ctx.occurred_at,
            ..Default::default()
        };
        self.apply(&account, &update).await?;

        match (period_start, period_end) {
            (Some(start), Some(end)) => {
                self.usage.reset(&account.account_id, start, end).await?;
            }
            _ => warn!(
                account_id = %account.account_id,
                "Subscription has no current period, usage not initialized"
            ),
        }

        info!(
            account_id = %account.account_id,
            status = %subscription.status,
            plan_type = ?base_item.price.plan_type(),
            "Subscription created"
        );
        Ok(())
    }

    #[instrument(skip_all, fields(event_id = %ctx.event_id, subscription_id = %subscription.id))]
    pub async fn on_subscription_updated(
        &self,
        ctx: &EventContext,
        subscription: &SubscriptionObject,
        previous: &PreviousAttributes,
    ) -> AppResult<()> {
        let Some(account) = self.find_account(&subscription.customer).await? else {
            return Ok(());
        };

        let mut update = AccountUpdate {
            subscription_status: Some(SubscriptionStatus::from_stripe(&subscription.status)),
            event_at: ctx.occurred_at,
            ..Default::default()
        };

        if previous.changed("trial_end") {
            update.trial_end = Some(ts(subscription.trial_end));
        }

        // The event's items are the provider's current state, so every update
        // restates the plan rather than trusting only the `previous` snapshot.
        if let Some(new_base) = subscription.base_plan_item() {
            if account.price_id.as_deref() != Some(new_base.price.id.as_str()) {
                let old_price = previous
                    .items()
                    .and_then(|items| find_base_plan_item(&items).map(|i| i.price.id.clone()))
                    .or_else(|| account.price_id.clone());
                info!(
                    account_id = %account.account_id,
                    old_price = ?old_price,
                    new_price = %new_base.price.id,
                    plan_type = ?new_base.price.plan_type(),
                    "Plan changed"
                );
            }
            update.subscription_id = Some(subscription.id.clone());
            update.price_id = Some(new_base.price.id.clone());
            update.plan_type = new_base.price.plan_type().map(str::to_string);
        }

        if subscription.cancel_at_period_end {
            update.canceled_at = Some(ts(subscription.scheduled_cancellation()));
        } else if previous.changed("cancel_at_period_end") {
            update.canceled_at = Some(None);
        }

        if let Some(start) = ts(subscription.period_start()) {
            update.current_period_start = Some(Some(start));
        }
        if let Some(end) = ts(subscription.period_end()) {
            update.current_period_end = Some(Some(end));
        }

        if self.apply(&account, &update).await? {
            info!(
                account_id = %account.account_id,
                status = %subscription.status,
                previous_status = ?previous.previous_status(),
                "Subscription updated"
            );
        }
        Ok(())
    }

    /// `plan_type` is left as the last paid plan; entitlement drops through the resolver.
    #[instrument(skip_all, fields(event_id = %ctx.event_id, subscription_id = %subscription.id))]
    pub async fn on_subscription_deleted(
        &self,
        ctx: &EventContext,
        subscription: &SubscriptionObject,
    ) -> AppResult<()> {
        let Some(account) = self.find_account(&subscription.customer).await? else {
            return Ok(());
        };

        let update = AccountUpdate {
            subscription_status: Some(SubscriptionStatus::Canceled),
            event_at: ctx.occurred_at,
            ..Default::default()
        };
        if self.apply(&account, &update).await? {
            info!(account_id = %account.account_id, "Subscription canceled");
        }
        Ok(())
    }

    #[instrument(skip_all, fields(event_id = %ctx.event_id, invoice_id = %invoice.id))]
    pub async fn on_invoice_paid(&self, ctx: &EventContext, invoice: &InvoiceObject) -> AppResult<()> {
        if invoice.subscription.is_none() {
            debug!("Invoice not tied to a subscription, skipping");
            return Ok(());
        }
        let Some(account) = self.find_account(&invoice.customer).await? else {
            return Ok(());
        };

        if invoice.starts_new_cycle() {
            match invoice.line_period() {
                Some(period) => {
                    let (Some(start), Some(end)) =
                        (timestamp_to_utc(period.start), timestamp_to_utc(period.end))
                    else {
                        return Err(AppError::InvalidInput(format!(
                            "Invoice {} has an out-of-range line period",
                            invoice.id
                        )));
                    };
                    self.usage.reset(&account.account_id, start, end).await?;

                    // The invoice defines the cycle that just started.
                    let update = AccountUpdate {
                        current_period_start: Some(Some(start)),
                        current_period_end: Some(Some(end)),
                        ..Default::default()
                    };
                    self.account_repo.update(&account.account_id, &update).await?;
                }
                None => warn!(
                    account_id = %account.account_id,
                    billing_reason = ?invoice.billing_reason,
                    "Cycle invoice has no subscription line period, usage not reset"
                ),
            }
        }

        if invoice.amount_paid > 0 {
            self.ledger.record_paid(&account, invoice).await?;
        }
        Ok(())
    }

    #[instrument(skip_all, fields(event_id = %ctx.event_id, invoice_id = %invoice.id))]
    pub async fn on_invoice_payment_failed(
        &self,
        ctx: &EventContext,
        invoice: &InvoiceObject,
    ) -> AppResult<()> {
        if invoice.subscription.is_none() {
            debug!("Invoice not tied to a subscription, skipping");
            return Ok(());
        }
        let Some(account) = self.find_account(&invoice.customer).await? else {
            return Ok(());
        };

        let update = AccountUpdate {
            subscription_status: Some(SubscriptionStatus::PastDue),
            event_at: ctx.occurred_at,
            ..Default::default()
        };
        self.apply(&account, &update).await?;
        self.ledger.record_failed(&account, invoice).await?;

        warn!(
            account_id = %account.account_id,
            amount_due = invoice.amount_due,
            "Invoice payment failed, subscription past due"
        );
        Ok(())
    }

    /// Informational only. No account fields change.
    #[instrument(skip_all, fields(event_id = %ctx.event_id, subscription_id = %subscription.id))]
    pub async fn on_trial_will_end(
        &self,
        ctx: &EventContext,
        subscription: &SubscriptionObject,
    ) -> AppResult<()> {
        let Some(account) = self.find_account(&subscription.customer).await? else {
            return Ok(());
        };
        let base_item = require_base_item(subscription)?;

        info!(
            account_id = %account.account_id,
            plan_type = ?base_item.price.plan_type(),
            trial_end = ?ts(subscription.trial_end),
            "Trial ending soon"
        );
        Ok(())
    }
}
