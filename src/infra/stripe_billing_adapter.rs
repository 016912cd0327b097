use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::{
    app_error::AppResult,
    application::ports::billing_provider::{
        BillingProviderPort, ItemChangeBilling, PriceId, ScheduleId, SchedulePhase,
        SubscriptionId,
    },
    domain::entities::billing_event::{Price, SubscriptionObject},
    infra::stripe_client::{StripeClient, StripeSchedulePhaseParams},
};

/// Stripe-backed implementation of [`BillingProviderPort`].
pub struct StripeBillingAdapter {
    client: StripeClient,
}

impl StripeBillingAdapter {
    pub fn new(secret_key: &SecretString) -> Self {
        Self {
            client: StripeClient::new(secret_key.expose_secret().to_string()),
        }
    }
}

#[async_trait]
impl BillingProviderPort for StripeBillingAdapter {
    async fn retrieve_subscription(
        &self,
        subscription_id: &SubscriptionId,
    ) -> AppResult<SubscriptionObject> {
        self.client.get_subscription(subscription_id.as_str()).await
    }

    async fn retrieve_price(&self, price_id: &PriceId) -> AppResult<Price> {
        self.client.get_price(price_id.as_str()).await
    }

    async fn replace_item_price(
        &self,
        subscription_id: &SubscriptionId,
        item_id: &str,
        new_price: &PriceId,
        billing: ItemChangeBilling,
        idempotency_key: &str,
    ) -> AppResult<()> {
        let end_trial = matches!(billing, ItemChangeBilling::EndTrialNow);
        let updated = self
            .client
            .update_subscription_item_price(
                subscription_id.as_str(),
                item_id,
                new_price.as_str(),
                end_trial,
                idempotency_key,
            )
            .await?;

        tracing::info!(
            subscription_id = %updated.id,
            price_id = %new_price,
            end_trial,
            "Subscription item price replaced"
        );
        Ok(())
    }

    async fn release_schedule(
        &self,
        schedule_id: &ScheduleId,
        idempotency_key: &str,
    ) -> AppResult<()> {
        self.client
            .release_schedule(schedule_id.as_str(), idempotency_key)
            .await?;
        Ok(())
    }

    async fn create_schedule_from_subscription(
        &self,
        subscription_id: &SubscriptionId,
        idempotency_key: &str,
    ) -> AppResult<ScheduleId> {
        let schedule = self
            .client
            .create_schedule_from_subscription(subscription_id.as_str(), idempotency_key)
            .await?;
        Ok(ScheduleId::new(schedule.id))
    }

    async fn set_schedule_phases(
        &self,
        schedule_id: &ScheduleId,
        phases: &[SchedulePhase],
        idempotency_key: &str,
    ) -> AppResult<()> {
        let params: Vec<StripeSchedulePhaseParams> = phases
            .iter()
            .map(|phase| StripeSchedulePhaseParams {
                price: phase.price.as_str().to_string(),
                quantity: phase.quantity,
                start_date: phase.start,
                end_date: phase.end,
            })
            .collect();

        self.client
            .update_schedule_phases(schedule_id.as_str(), &params, idempotency_key)
            .await?;
        Ok(())
    }
}
