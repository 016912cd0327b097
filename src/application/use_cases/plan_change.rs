use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::{
    app_error::{AppError, AppResult},
    application::{
        ports::billing_provider::{
            BillingProviderPort, ItemChangeBilling, PriceId, SchedulePhase, ScheduleId,
            SubscriptionId,
        },
        use_cases::{
            account::{AccountRepo, AccountUpdate},
            subscription_sync::EventContext,
        },
    },
    domain::entities::{
        billing_event::{ScheduleObject, SubscriptionItem, SubscriptionObject, timestamp_to_utc},
        plan_rules::PlanTier,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanChangeMode {
    /// Swap the price now. `end_trial` ends any trial instead of prorating.
    Immediate { end_trial: bool },
    /// Keep the current price until period end, then switch.
    Scheduled,
}

impl PlanChangeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanChangeMode::Immediate { .. } => "immediate",
            PlanChangeMode::Scheduled => "scheduled",
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PlanChangeResult {
    pub mode: &'static str,
    pub subscription_id: String,
    pub new_price_id: String,
    pub scheduled_plan_type: Option<String>,
    pub scheduled_change_at: Option<DateTime<Utc>>,
}

/// Base item, or the first item when none carries plan metadata.
fn plan_item(subscription: &SubscriptionObject) -> Option<&SubscriptionItem> {
    subscription
        .base_plan_item()
        .or_else(|| subscription.items.data.first())
}

#[derive(Clone)]
pub struct PlanChangeUseCases {
    account_repo: Arc<dyn AccountRepo>,
    provider: Arc<dyn BillingProviderPort>,
}

impl PlanChangeUseCases {
    pub fn new(account_repo: Arc<dyn AccountRepo>, provider: Arc<dyn BillingProviderPort>) -> Self {
        Self {
            account_repo,
            provider,
        }
    }

    /// Change the account's plan at the provider.
    ///
    /// Local state is written only after every provider call has succeeded.
    #[instrument(skip(self))]
    pub async fn change_plan(
        &self,
        account_id: &str,
        new_price: &PriceId,
        mode: PlanChangeMode,
        idempotency_key: &str,
    ) -> AppResult<PlanChangeResult> {
        if new_price.as_str().trim().is_empty() {
            return Err(AppError::InvalidInput("price_id is required".into()));
        }

        let account = self
            .account_repo
            .get_by_id(account_id)
            .await?
            .ok_or(AppError::NotFound)?;
        let subscription_id = account
            .subscription_id
            .as_deref()
            .map(SubscriptionId::new)
            .ok_or(AppError::NoActiveSubscription)?;

        let subscription = self.provider.retrieve_subscription(&subscription_id).await?;
        let item = plan_item(&subscription)
            .ok_or_else(|| AppError::MissingBasePlanItem(subscription.id.clone()))?;

        if item.price.id == new_price.as_str() {
            return Err(AppError::InvalidInput(
                "Subscription is already on this price".into(),
            ));
        }

        match mode {
            PlanChangeMode::Immediate { end_trial } => {
                let billing = if end_trial {
                    ItemChangeBilling::EndTrialNow
                } else {
                    ItemChangeBilling::Prorate
                };
                self.provider
                    .replace_item_price(
                        &subscription_id,
                        &item.id,
                        new_price,
                        billing,
                        &format!("{idempotency_key}:items"),
                    )
                    .await?;

                info!(
                    account_id,
                    subscription_id = %subscription_id,
                    old_price = %item.price.id,
                    new_price = %new_price,
                    end_trial,
                    "Plan changed immediately"
                );

                Ok(PlanChangeResult {
                    mode: mode.as_str(),
                    subscription_id: subscription_id.to_string(),
                    new_price_id: new_price.to_string(),
                    scheduled_plan_type: None,
                    scheduled_change_at: None,
                })
            }
            PlanChangeMode::Scheduled => {
                self.schedule_change(account_id, &subscription, item, new_price, idempotency_key)
                    .await
            }
        }
    }

    async fn schedule_change(
        &self,
        account_id: &str,
        subscription: &SubscriptionObject,
        item: &SubscriptionItem,
        new_price: &PriceId,
        idempotency_key: &str,
    ) -> AppResult<PlanChangeResult> {
        let subscription_id = SubscriptionId::new(subscription.id.clone());
        let period_start = item
            .current_period_start
            .or_else(|| subscription.period_start());
        let period_end = item.current_period_end.or_else(|| subscription.period_end());
        let Some(period_end) = period_end else {
            return Err(AppError::Provider(format!(
                "Subscription {} reports no current period end",
                subscription.id
            )));
        };
        let change_at = timestamp_to_utc(period_end).ok_or_else(|| {
            AppError::Provider(format!("Invalid period end {period_end} on {}", subscription.id))
        })?;

        // Only one schedule may be attached to a subscription. Step keys name the
        // schedule they act on: a retry that finds the schedule its first attempt
        // created must not replay that attempt's keys with different parameters.
        let existing = subscription.schedule.as_deref();
        if let Some(existing) = existing {
            self.provider
                .release_schedule(
                    &ScheduleId::new(existing),
                    &format!("{idempotency_key}:release:{existing}"),
                )
                .await?;
        }

        let schedule_id = self
            .provider
            .create_schedule_from_subscription(
                &subscription_id,
                &format!("{idempotency_key}:create:{}", existing.unwrap_or("none")),
            )
            .await?;

        let phases = [
            SchedulePhase {
                price: PriceId::new(item.price.id.clone()),
                quantity: 1,
                start: period_start,
                end: Some(period_end),
            },
            SchedulePhase {
                price: new_price.clone(),
                quantity: 1,
                start: None,
                end: None,
            },
        ];
        self.provider
            .set_schedule_phases(
                &schedule_id,
                &phases,
                &format!("{idempotency_key}:phases:{schedule_id}"),
            )
            .await?;

        let price = self.provider.retrieve_price(new_price).await?;
        let scheduled_plan_type = price
            .plan_type()
            .unwrap_or(PlanTier::DEFAULT_PAID.as_str())
            .to_string();

        let update = AccountUpdate {
            scheduled_plan_type: Some(Some(scheduled_plan_type.clone())),
            scheduled_change_at: Some(Some(change_at)),
            ..Default::default()
        };
        self.account_repo.update(account_id, &update).await?;

        info!(
            account_id,
            subscription_id = %subscription_id,
            schedule_id = %schedule_id,
            scheduled_plan_type = %scheduled_plan_type,
            change_at = %change_at,
            "Plan change scheduled"
        );

        Ok(PlanChangeResult {
            mode: PlanChangeMode::Scheduled.as_str(),
            subscription_id: subscription_id.to_string(),
            new_price_id: new_price.to_string(),
            scheduled_plan_type: Some(scheduled_plan_type),
            scheduled_change_at: Some(change_at),
        })
    }

    /// Retire the scheduled-change display hint once the provider has run the schedule.
    ///
    /// The price change itself arrives through the ordinary subscription update.
    #[instrument(skip_all, fields(event_id = %ctx.event_id, schedule_id = %schedule.id))]
    pub async fn on_schedule_completed(
        &self,
        ctx: &EventContext,
        schedule: &ScheduleObject,
    ) -> AppResult<()> {
        let Some(subscription_id) = schedule.subscription.as_deref() else {
            info!("Completed schedule has no subscription, skipping");
            return Ok(());
        };

        let subscription = self
            .provider
            .retrieve_subscription(&SubscriptionId::new(subscription_id))
            .await?;

        let Some(account) = self
            .account_repo
            .get_by_customer_id(&subscription.customer)
            .await?
        else {
            warn!(customer_id = %subscription.customer, "No account for customer, skipping event");
            return Ok(());
        };

        let update = AccountUpdate {
            scheduled_plan_type: Some(None),
            scheduled_change_at: Some(None),
            ..Default::default()
        };
        self.account_repo.update(&account.account_id, &update).await?;

        info!(account_id = %account.account_id, "Scheduled plan change completed");
        Ok(())
    }
}
