//! Test data factories for creating valid test fixtures.
//!
//! Each factory function creates a complete, valid object with sensible defaults.
//! Use the closure parameter to override specific fields as needed.

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::{Value, json};
use std::collections::HashMap;

use crate::{
    application::use_cases::account::AccountProfile,
    domain::entities::billing_event::{
        InvoiceLine, InvoiceLineList, InvoiceLinePeriod, InvoiceObject, Price, SubscriptionItem,
        SubscriptionItemList, SubscriptionObject,
    },
};

/// Fixed instant all fixtures are built around.
pub fn test_datetime() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
}

pub fn unix(at: DateTime<Utc>) -> i64 {
    at.timestamp()
}

/// Create a test account with a customer reference and no subscription yet.
pub fn create_test_account(overrides: impl FnOnce(&mut AccountProfile)) -> AccountProfile {
    let mut account = AccountProfile {
        account_id: "acct_test".to_string(),
        customer_id: Some("cus_test".to_string()),
        subscription_id: None,
        price_id: None,
        plan_type: None,
        subscription_status: None,
        trial_start: None,
        trial_end: None,
        current_period_start: None,
        current_period_end: None,
        canceled_at: None,
        scheduled_plan_type: None,
        scheduled_change_at: None,
        last_event_at: None,
        plan_event_at: None,
        created_at: Some(test_datetime()),
        updated_at: Some(test_datetime()),
    };
    overrides(&mut account);
    account
}

pub fn test_price(id: &str, plan_type: Option<&str>) -> Price {
    let mut metadata = HashMap::new();
    if let Some(plan) = plan_type {
        metadata.insert("plan_type".to_string(), plan.to_string());
    }
    Price {
        id: id.to_string(),
        unit_amount: Some(2000),
        currency: Some("jpy".to_string()),
        metadata,
    }
}

/// Active starter subscription for `cus_test` covering 30 days from `test_datetime`.
pub fn test_subscription(overrides: impl FnOnce(&mut SubscriptionObject)) -> SubscriptionObject {
    let start = test_datetime();
    let end = start + Duration::days(30);
    let mut subscription = SubscriptionObject {
        id: "sub_test".to_string(),
        customer: "cus_test".to_string(),
        status: "active".to_string(),
        items: SubscriptionItemList {
            data: vec![SubscriptionItem {
                id: "si_base".to_string(),
                price: test_price("price_starter", Some("starter")),
                quantity: Some(1),
                current_period_start: None,
                current_period_end: None,
            }],
        },
        trial_start: None,
        trial_end: None,
        current_period_start: Some(unix(start)),
        current_period_end: Some(unix(end)),
        cancel_at_period_end: false,
        cancel_at: None,
        schedule: None,
    };
    overrides(&mut subscription);
    subscription
}

/// Paid renewal invoice of 2000 JPY for `sub_test`.
pub fn test_invoice(overrides: impl FnOnce(&mut InvoiceObject)) -> InvoiceObject {
    let start = test_datetime();
    let end = start + Duration::days(30);
    let mut invoice = InvoiceObject {
        id: "in_test".to_string(),
        customer: "cus_test".to_string(),
        subscription: Some("sub_test".to_string()),
        billing_reason: Some("subscription_cycle".to_string()),
        amount_paid: 2000,
        amount_due: 2000,
        currency: Some("jpy".to_string()),
        payment_intent: Some("pi_test".to_string()),
        lines: InvoiceLineList {
            data: vec![InvoiceLine {
                subscription: Some("sub_test".to_string()),
                period: Some(InvoiceLinePeriod {
                    start: unix(start),
                    end: unix(end),
                }),
            }],
        },
    };
    overrides(&mut invoice);
    invoice
}

fn merge(mut base: Value, overrides: Value) -> Value {
    if let (Some(target), Value::Object(fields)) = (base.as_object_mut(), overrides) {
        for (key, value) in fields {
            target.insert(key, value);
        }
    }
    base
}

fn event_json(event_id: &str, event_type: &str, object: Value, previous: Option<Value>) -> Value {
    let mut data = json!({ "object": object });
    if let Some(previous) = previous {
        data["previous_attributes"] = previous;
    }
    json!({
        "id": event_id,
        "object": "event",
        "type": event_type,
        "created": unix(test_datetime()),
        "data": data,
    })
}

/// Webhook event JSON wrapping the default subscription, with top-level fields overridden.
pub fn subscription_event_json(
    event_id: &str,
    event_type: &str,
    overrides: Value,
    previous: Option<Value>,
) -> Value {
    let start = test_datetime();
    let base = json!({
        "id": "sub_test",
        "object": "subscription",
        "customer": "cus_test",
        "status": "active",
        "current_period_start": unix(start),
        "current_period_end": unix(start + Duration::days(30)),
        "cancel_at_period_end": false,
        "items": { "object": "list", "data": [{
            "id": "si_base",
            "quantity": 1,
            "price": { "id": "price_starter", "metadata": { "plan_type": "starter" } }
        }]}
    });
    event_json(event_id, event_type, merge(base, overrides), previous)
}

/// Webhook event JSON wrapping the default invoice, with top-level fields overridden.
pub fn invoice_event_json(event_id: &str, event_type: &str, overrides: Value) -> Value {
    let start = test_datetime();
    let base = json!({
        "id": "in_test",
        "object": "invoice",
        "customer": "cus_test",
        "subscription": "sub_test",
        "billing_reason": "subscription_cycle",
        "amount_paid": 2000,
        "amount_due": 2000,
        "currency": "jpy",
        "payment_intent": "pi_test",
        "lines": { "data": [{
            "subscription": "sub_test",
            "period": { "start": unix(start), "end": unix(start + Duration::days(30)) }
        }]}
    });
    event_json(event_id, event_type, merge(base, overrides), None)
}

/// Build a `Stripe-Signature` header value for `payload`.
pub fn sign_webhook(payload: &str, secret: &str, timestamp: i64) -> String {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(format!("{timestamp}.{payload}").as_bytes());
    format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
}
