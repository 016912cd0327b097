use reqwest::{Client, RequestBuilder};
use serde::Deserialize;

use crate::{
    app_error::{AppError, AppResult},
    domain::entities::billing_event::{Price, SubscriptionObject},
};

const STRIPE_API_BASE: &str = "https://api.stripe.com/v1";

#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    secret_key: String,
    api_base: String,
}

impl StripeClient {
    pub fn new(secret_key: String) -> Self {
        Self::with_api_base(secret_key, STRIPE_API_BASE.to_string())
    }

    /// Point the client at a different API host (stripe-mock, recorded fixtures).
    pub fn with_api_base(secret_key: String, api_base: String) -> Self {
        Self {
            client: Client::new(),
            secret_key,
            api_base,
        }
    }

    fn auth_header(&self) -> String {
        use base64::Engine;
        let encoded =
            base64::engine::general_purpose::STANDARD.encode(format!("{}:", self.secret_key));
        format!("Basic {}", encoded)
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.client
            .get(format!("{}{}", self.api_base, path))
            .header("Authorization", self.auth_header())
    }

    fn post(&self, path: &str, idempotency_key: &str) -> RequestBuilder {
        self.client
            .post(format!("{}{}", self.api_base, path))
            .header("Authorization", self.auth_header())
            .header("Idempotency-Key", idempotency_key)
    }

    async fn send<T: for<'de> Deserialize<'de>>(&self, request: RequestBuilder) -> AppResult<T> {
        let response = request
            .send()
            .await
            .map_err(|e| AppError::Provider(format!("Stripe request failed: {}", e)))?;
        self.handle_response(response).await
    }

    // ========================================================================
    // Subscriptions
    // ========================================================================

    pub async fn get_subscription(&self, subscription_id: &str) -> AppResult<SubscriptionObject> {
        self.send(self.get(&format!("/subscriptions/{}", subscription_id)))
            .await
    }

    /// Swap the price on one line item. With `end_trial`, the trial ends now
    /// instead of prorating.
    pub async fn update_subscription_item_price(
        &self,
        subscription_id: &str,
        item_id: &str,
        price_id: &str,
        end_trial: bool,
        idempotency_key: &str,
    ) -> AppResult<SubscriptionObject> {
        let mut params: Vec<(&str, &str)> = vec![
            ("items[0][id]", item_id),
            ("items[0][price]", price_id),
        ];
        if end_trial {
            params.push(("trial_end", "now"));
        } else {
            params.push(("proration_behavior", "create_prorations"));
        }

        self.send(
            self.post(&format!("/subscriptions/{}", subscription_id), idempotency_key)
                .form(&params),
        )
        .await
    }

    // ========================================================================
    // Prices
    // ========================================================================

    pub async fn get_price(&self, price_id: &str) -> AppResult<Price> {
        self.send(self.get(&format!("/prices/{}", price_id))).await
    }

    // ========================================================================
    // Subscription Schedules
    // ========================================================================

    pub async fn create_schedule_from_subscription(
        &self,
        subscription_id: &str,
        idempotency_key: &str,
    ) -> AppResult<StripeSubscriptionSchedule> {
        self.send(
            self.post("/subscription_schedules", idempotency_key)
                .form(&[("from_subscription", subscription_id)]),
        )
        .await
    }

    pub async fn release_schedule(
        &self,
        schedule_id: &str,
        idempotency_key: &str,
    ) -> AppResult<StripeSubscriptionSchedule> {
        self.send(self.post(
            &format!("/subscription_schedules/{}/release", schedule_id),
            idempotency_key,
        ))
        .await
    }

    /// Replace a schedule's phases; the subscription is released after the last phase.
    pub async fn update_schedule_phases(
        &self,
        schedule_id: &str,
        phases: &[StripeSchedulePhaseParams],
        idempotency_key: &str,
    ) -> AppResult<StripeSubscriptionSchedule> {
        let mut params: Vec<(String, String)> =
            vec![("end_behavior".to_string(), "release".to_string())];

        for (i, phase) in phases.iter().enumerate() {
            params.push((format!("phases[{i}][items][0][price]"), phase.price.clone()));
            params.push((
                format!("phases[{i}][items][0][quantity]"),
                phase.quantity.to_string(),
            ));
            if let Some(start) = phase.start_date {
                params.push((format!("phases[{i}][start_date]"), start.to_string()));
            }
            if let Some(end) = phase.end_date {
                params.push((format!("phases[{i}][end_date]"), end.to_string()));
            }
        }

        self.send(
            self.post(
                &format!("/subscription_schedules/{}", schedule_id),
                idempotency_key,
            )
            .form(&params),
        )
        .await
    }

    // ========================================================================
    // Webhook Signature Verification
    // ========================================================================

    pub fn verify_webhook_signature(
        payload: &str,
        signature_header: &str,
        webhook_secret: &str,
        tolerance_secs: i64,
    ) -> AppResult<()> {
        use hmac::{Hmac, Mac};
        use sha2::Sha256;

        // Parse signature header: "t=timestamp,v1=signature,..."
        let mut timestamp: Option<&str> = None;
        let mut signatures: Vec<&str> = Vec::new();

        for part in signature_header.split(',') {
            let Some((key, value)) = part.trim().split_once('=') else {
                continue;
            };
            match key {
                "t" => timestamp = Some(value),
                "v1" => signatures.push(value),
                _ => {}
            }
        }

        let timestamp = timestamp
            .ok_or_else(|| AppError::InvalidSignature("Missing timestamp in signature".into()))?;

        if signatures.is_empty() {
            return Err(AppError::InvalidSignature("Missing signature".into()));
        }

        let signed_payload = format!("{}.{}", timestamp, payload);
        let mut mac = Hmac::<Sha256>::new_from_slice(webhook_secret.as_bytes())
            .map_err(|_| AppError::Internal("HMAC error".into()))?;
        mac.update(signed_payload.as_bytes());
        let expected = hex::encode(mac.finalize().into_bytes());

        if !signatures.iter().any(|sig| constant_time_compare(sig, &expected)) {
            return Err(AppError::InvalidSignature("Invalid signature".into()));
        }

        let ts: i64 = timestamp
            .parse()
            .map_err(|_| AppError::InvalidSignature("Invalid timestamp".into()))?;
        let now = chrono::Utc::now().timestamp();
        if (now - ts).abs() > tolerance_secs {
            return Err(AppError::InvalidSignature("Timestamp outside tolerance".into()));
        }
        Ok(())
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    async fn handle_response<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::Response,
    ) -> AppResult<T> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::Provider(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            tracing::error!(status = %status, body = %body, "Stripe API error");

            if let Ok(error) = serde_json::from_str::<StripeErrorResponse>(&body) {
                return Err(AppError::Provider(format!(
                    "Stripe error ({}): {}",
                    status,
                    error.error.message.unwrap_or(error.error.error_type)
                )));
            }

            return Err(AppError::Provider(format!(
                "Stripe API error: {} - {}",
                status, body
            )));
        }

        serde_json::from_str(&body).map_err(|e| {
            tracing::error!(body = %body, error = %e, "Failed to parse Stripe response");
            AppError::Provider(format!("Failed to parse Stripe response: {}", e))
        })
    }
}

fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}

// ============================================================================
// Stripe Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct StripeSubscriptionSchedule {
    pub id: String,
    #[serde(default)]
    pub subscription: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StripeSchedulePhaseParams {
    pub price: String,
    pub quantity: u64,
    pub start_date: Option<i64>,
    pub end_date: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct StripeErrorResponse {
    pub error: StripeError,
}

#[derive(Debug, Deserialize)]
pub struct StripeError {
    #[serde(rename = "type")]
    pub error_type: String,
    pub message: Option<String>,
    pub code: Option<String>,
}
