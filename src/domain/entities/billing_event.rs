//! Provider webhook events, decoded into a closed set of kinds.
//!
//! The payload structs only carry the fields the reconciler reads. Anything else
//! Stripe sends is ignored by serde.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;

pub const SUBSCRIPTION_CREATED: &str = "customer.subscription.created";
pub const SUBSCRIPTION_UPDATED: &str = "customer.subscription.updated";
pub const SUBSCRIPTION_DELETED: &str = "customer.subscription.deleted";
pub const SUBSCRIPTION_TRIAL_WILL_END: &str = "customer.subscription.trial_will_end";
pub const INVOICE_PAID: &str = "invoice.paid";
pub const INVOICE_PAYMENT_FAILED: &str = "invoice.payment_failed";
pub const SCHEDULE_COMPLETED: &str = "subscription_schedule.completed";

/// Price metadata key that marks the base-plan line item.
pub const PLAN_TYPE_METADATA_KEY: &str = "plan_type";

/// Convert a Unix timestamp to a UTC instant.
pub fn timestamp_to_utc(secs: i64) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(secs, 0)
}

// ============================================================================
// Envelope
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEnvelope {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub created: Option<i64>,
    pub data: WebhookEnvelopeData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEnvelopeData {
    pub object: serde_json::Value,
    #[serde(default)]
    pub previous_attributes: Option<serde_json::Value>,
}

impl WebhookEnvelope {
    pub fn occurred_at(&self) -> Option<DateTime<Utc>> {
        self.created.and_then(timestamp_to_utc)
    }
}

// ============================================================================
// Payload objects
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Price {
    pub id: String,
    #[serde(default)]
    pub unit_amount: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Price {
    pub fn plan_type(&self) -> Option<&str> {
        self.metadata
            .get(PLAN_TYPE_METADATA_KEY)
            .map(String::as_str)
            .filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionItem {
    pub id: String,
    pub price: Price,
    #[serde(default)]
    pub quantity: Option<u64>,
    #[serde(default)]
    pub current_period_start: Option<i64>,
    #[serde(default)]
    pub current_period_end: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubscriptionItemList {
    #[serde(default)]
    pub data: Vec<SubscriptionItem>,
}

/// The line item whose price carries plan metadata, as opposed to add-on items.
pub fn find_base_plan_item(items: &[SubscriptionItem]) -> Option<&SubscriptionItem> {
    items.iter().find(|item| item.price.plan_type().is_some())
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionObject {
    pub id: String,
    pub customer: String,
    pub status: String,
    #[serde(default)]
    pub items: SubscriptionItemList,
    #[serde(default)]
    pub trial_start: Option<i64>,
    #[serde(default)]
    pub trial_end: Option<i64>,
    #[serde(default)]
    pub current_period_start: Option<i64>,
    #[serde(default)]
    pub current_period_end: Option<i64>,
    #[serde(default)]
    pub cancel_at_period_end: bool,
    #[serde(default)]
    pub cancel_at: Option<i64>,
    #[serde(default)]
    pub schedule: Option<String>,
}

impl SubscriptionObject {
    pub fn base_plan_item(&self) -> Option<&SubscriptionItem> {
        find_base_plan_item(&self.items.data)
    }

    /// Period start, preferring the subscription field and falling back to the base item.
    ///
    /// Newer API versions only report billing periods on line items.
    pub fn period_start(&self) -> Option<i64> {
        self.current_period_start
            .or_else(|| self.base_plan_item().and_then(|i| i.current_period_start))
    }

    pub fn period_end(&self) -> Option<i64> {
        self.current_period_end
            .or_else(|| self.base_plan_item().and_then(|i| i.current_period_end))
    }

    /// Instant the subscription will cancel, when cancellation is scheduled for period end.
    pub fn scheduled_cancellation(&self) -> Option<i64> {
        if !self.cancel_at_period_end {
            return None;
        }
        self.cancel_at.or_else(|| self.period_end())
    }
}

/// The `previous_attributes` map of an `updated` event.
///
/// Presence of a key matters even when its previous value was null, so the raw
/// map is kept rather than a typed struct.
#[derive(Debug, Clone, Default)]
pub struct PreviousAttributes(serde_json::Map<String, serde_json::Value>);

impl PreviousAttributes {
    pub fn from_value(value: Option<&serde_json::Value>) -> Self {
        match value.and_then(|v| v.as_object()) {
            Some(map) => Self(map.clone()),
            None => Self::default(),
        }
    }

    pub fn changed(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn previous_status(&self) -> Option<&str> {
        self.0.get("status").and_then(|v| v.as_str())
    }

    /// Line items as they were before the update, if the event reports them.
    pub fn items(&self) -> Option<Vec<SubscriptionItem>> {
        let raw = self.0.get("items")?;
        match serde_json::from_value::<SubscriptionItemList>(raw.clone()) {
            Ok(list) => Some(list.data),
            Err(err) => {
                tracing::warn!(error = %err, "Unreadable previous items on subscription update");
                None
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct InvoiceLinePeriod {
    pub start: i64,
    pub end: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InvoiceLine {
    #[serde(default)]
    pub subscription: Option<String>,
    #[serde(default)]
    pub period: Option<InvoiceLinePeriod>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InvoiceLineList {
    #[serde(default)]
    pub data: Vec<InvoiceLine>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InvoiceObject {
    pub id: String,
    pub customer: String,
    #[serde(default)]
    pub subscription: Option<String>,
    #[serde(default)]
    pub billing_reason: Option<String>,
    #[serde(default)]
    pub amount_paid: i64,
    #[serde(default)]
    pub amount_due: i64,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub payment_intent: Option<String>,
    #[serde(default)]
    pub lines: InvoiceLineList,
}

impl InvoiceObject {
    /// First line item that belongs to a subscription.
    pub fn subscription_line(&self) -> Option<&InvoiceLine> {
        self.lines.data.iter().find(|l| l.subscription.is_some())
    }

    pub fn line_period(&self) -> Option<&InvoiceLinePeriod> {
        self.subscription_line().and_then(|l| l.period.as_ref())
    }

    /// Whether this invoice opens a new billing cycle (first charge or renewal).
    pub fn starts_new_cycle(&self) -> bool {
        matches!(
            self.billing_reason.as_deref(),
            Some("subscription_cycle") | Some("subscription_create")
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleObject {
    pub id: String,
    #[serde(default)]
    pub subscription: Option<String>,
}

// ============================================================================
// Closed event set
// ============================================================================

#[derive(Debug, Clone)]
pub enum BillingEvent {
    SubscriptionCreated(SubscriptionObject),
    SubscriptionUpdated {
        subscription: SubscriptionObject,
        previous: PreviousAttributes,
    },
    SubscriptionDeleted(SubscriptionObject),
    TrialWillEnd(SubscriptionObject),
    InvoicePaid(InvoiceObject),
    InvoicePaymentFailed(InvoiceObject),
    ScheduleCompleted(ScheduleObject),
    Unknown(String),
}

impl BillingEvent {
    /// Decode the envelope's object into the variant for its type.
    ///
    /// Unrecognized types decode to `Unknown` without touching the payload.
    pub fn decode(envelope: &WebhookEnvelope) -> Result<Self, serde_json::Error> {
        let object = &envelope.data.object;
        let event = match envelope.event_type.as_str() {
            SUBSCRIPTION_CREATED => {
                BillingEvent::SubscriptionCreated(serde_json::from_value(object.clone())?)
            }
            SUBSCRIPTION_UPDATED => BillingEvent::SubscriptionUpdated {
                subscription: serde_json::from_value(object.clone())?,
                previous: PreviousAttributes::from_value(
                    envelope.data.previous_attributes.as_ref(),
                ),
            },
            SUBSCRIPTION_DELETED => {
                BillingEvent::SubscriptionDeleted(serde_json::from_value(object.clone())?)
            }
            SUBSCRIPTION_TRIAL_WILL_END => {
                BillingEvent::TrialWillEnd(serde_json::from_value(object.clone())?)
            }
            INVOICE_PAID => BillingEvent::InvoicePaid(serde_json::from_value(object.clone())?),
            INVOICE_PAYMENT_FAILED => {
                BillingEvent::InvoicePaymentFailed(serde_json::from_value(object.clone())?)
            }
            SCHEDULE_COMPLETED => {
                BillingEvent::ScheduleCompleted(serde_json::from_value(object.clone())?)
            }
            other => BillingEvent::Unknown(other.to_string()),
        };
        Ok(event)
    }
}
