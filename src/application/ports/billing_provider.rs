use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    app_error::AppResult,
    domain::entities::billing_event::{Price, SubscriptionObject},
};

// ============================================================================
// Port Types
// ============================================================================

/// Unique identifier for a customer in the payment provider
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CustomerId(pub String);

impl CustomerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CustomerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a subscription in the payment provider
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(pub String);

impl SubscriptionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PriceId(pub String);

impl PriceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PriceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScheduleId(pub String);

impl ScheduleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ScheduleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How the provider should bill an immediate price swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemChangeBilling {
    /// End the trial now; no prorated credit.
    EndTrialNow,
    /// Standard day-based proration.
    Prorate,
}

/// One phase of a subscription schedule. `end == None` means open-ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulePhase {
    pub price: PriceId,
    pub quantity: u64,
    pub start: Option<i64>,
    pub end: Option<i64>,
}

// ============================================================================
// Port
// ============================================================================

/// Outbound calls the reconciler makes against the payment provider.
///
/// Every mutating call takes an idempotency key so a transport-level retry by
/// the caller cannot apply the same change twice.
#[async_trait]
pub trait BillingProviderPort: Send + Sync {
    async fn retrieve_subscription(
        &self,
        subscription_id: &SubscriptionId,
    ) -> AppResult<SubscriptionObject>;

    async fn retrieve_price(&self, price_id: &PriceId) -> AppResult<Price>;

    /// Swap the price on one subscription line item.
    async fn replace_item_price(
        &self,
        subscription_id: &SubscriptionId,
        item_id: &str,
        new_price: &PriceId,
        billing: ItemChangeBilling,
        idempotency_key: &str,
    ) -> AppResult<()>;

    async fn release_schedule(&self, schedule_id: &ScheduleId, idempotency_key: &str)
    -> AppResult<()>;

    async fn create_schedule_from_subscription(
        &self,
        subscription_id: &SubscriptionId,
        idempotency_key: &str,
    ) -> AppResult<ScheduleId>;

    /// Replace the schedule's phases; the schedule releases the subscription after the last one.
    async fn set_schedule_phases(
        &self,
        schedule_id: &ScheduleId,
        phases: &[SchedulePhase],
        idempotency_key: &str,
    ) -> AppResult<()>;
}
