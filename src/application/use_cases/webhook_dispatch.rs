use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{error, info, instrument};

use crate::{
    app_error::{AppError, AppResult},
    application::use_cases::{
        plan_change::PlanChangeUseCases,
        subscription_sync::{EventContext, SubscriptionSyncUseCases},
    },
    domain::entities::billing_event::{BillingEvent, WebhookEnvelope},
};

// ============================================================================
// Idempotency Ledger
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct WebhookEventProfile {
    pub event_id: String,
    pub event_type: String,
    pub processed: bool,
    pub error_message: Option<String>,
    pub attempts: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Result of trying to take ownership of an event ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// This delivery owns the event and must run the handler.
    Claimed,
    /// A previous delivery finished successfully.
    AlreadyProcessed,
    /// Another delivery holds a fresh claim and has not finished.
    InFlight,
}

#[async_trait]
pub trait WebhookEventRepo: Send + Sync {
    /// Atomically record the event as seen.
    ///
    /// A new ID is inserted unprocessed. An unprocessed record is re-claimed if its
    /// last attempt failed or was claimed before `stale_before`.
    async fn try_claim(
        &self,
        event_id: &str,
        event_type: &str,
        stale_before: DateTime<Utc>,
    ) -> AppResult<ClaimOutcome>;

    async fn mark_processed(&self, event_id: &str) -> AppResult<()>;

    async fn mark_failed(&self, event_id: &str, error_message: &str) -> AppResult<()>;
}

// ============================================================================
// Dispatcher
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    AlreadyProcessed,
    Processed,
    /// Unrecognized event type, recorded as processed.
    Ignored,
    /// A handler failed; the provider should redeliver.
    Failed(String),
}

impl DispatchOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchOutcome::AlreadyProcessed => "already_processed",
            DispatchOutcome::Processed => "ok",
            DispatchOutcome::Ignored => "ignored",
            DispatchOutcome::Failed(_) => "failed",
        }
    }
}

#[derive(Clone)]
pub struct WebhookDispatchUseCases {
    event_repo: Arc<dyn WebhookEventRepo>,
    subscription_sync: Arc<SubscriptionSyncUseCases>,
    plan_change: Arc<PlanChangeUseCases>,
    stale_claim_after: Duration,
}

impl WebhookDispatchUseCases {
    pub fn new(
        event_repo: Arc<dyn WebhookEventRepo>,
        subscription_sync: Arc<SubscriptionSyncUseCases>,
        plan_change: Arc<PlanChangeUseCases>,
        stale_claim_after: Duration,
    ) -> Self {
        Self {
            event_repo,
            subscription_sync,
            plan_change,
            stale_claim_after,
        }
    }

    /// Run one verified event through the ledger and its handler.
    ///
    /// Errors are returned only when the ledger itself is unavailable; handler
    /// failures are recorded and reported as `DispatchOutcome::Failed`.
    #[instrument(skip_all, fields(event_id = %envelope.id, event_type = %envelope.event_type))]
    pub async fn dispatch(&self, envelope: &WebhookEnvelope) -> AppResult<DispatchOutcome> {
        let stale_before = Utc::now() - self.stale_claim_after;
        match self
            .event_repo
            .try_claim(&envelope.id, &envelope.event_type, stale_before)
            .await?
        {
            ClaimOutcome::Claimed => {}
            ClaimOutcome::AlreadyProcessed => {
                info!("Event already processed, skipping");
                return Ok(DispatchOutcome::AlreadyProcessed);
            }
            ClaimOutcome::InFlight => {
                info!("Event is being processed by another delivery, skipping");
                return Ok(DispatchOutcome::AlreadyProcessed);
            }
        }

        match self.handle(envelope).await {
            Ok(outcome) => {
                self.event_repo.mark_processed(&envelope.id).await?;
                Ok(outcome)
            }
            Err(err) => {
                let message = err.to_string();
                error!(error = %err, "Webhook handler failed, provider will redeliver");
                if let Err(mark_err) = self.event_repo.mark_failed(&envelope.id, &message).await {
                    error!(error = %mark_err, "Could not record webhook failure");
                }
                Ok(DispatchOutcome::Failed(message))
            }
        }
    }

    async fn handle(&self, envelope: &WebhookEnvelope) -> AppResult<DispatchOutcome> {
        let event = BillingEvent::decode(envelope).map_err(|e| {
            error!(error = %e, "Webhook payload does not match its event type");
            AppError::InvalidInput(format!(
                "Malformed {} payload: {}",
                envelope.event_type, e
            ))
        })?;
        let ctx = EventContext {
            event_id: envelope.id.clone(),
            occurred_at: envelope.occurred_at(),
        };

        match event {
            BillingEvent::SubscriptionCreated(sub) => {
                self.subscription_sync.on_subscription_created(&ctx, &sub).await?
            }
            BillingEvent::SubscriptionUpdated {
                subscription,
                previous,
            } => {
                self.subscription_sync
                    .on_subscription_updated(&ctx, &subscription, &previous)
                    .await?
            }
            BillingEvent::SubscriptionDeleted(sub) => {
                self.subscription_sync.on_subscription_deleted(&ctx, &sub).await?
            }
            BillingEvent::TrialWillEnd(sub) => {
                self.subscription_sync.on_trial_will_end(&ctx, &sub).await?
            }
            BillingEvent::InvoicePaid(invoice) => {
                self.subscription_sync.on_invoice_paid(&ctx, &invoice).await?
            }
            BillingEvent::InvoicePaymentFailed(invoice) => {
                self.subscription_sync
                    .on_invoice_payment_failed(&ctx, &invoice)
                    .await?
            }
            BillingEvent::ScheduleCompleted(schedule) => {
                self.plan_change.on_schedule_completed(&ctx, &schedule).await?
            }
            BillingEvent::Unknown(event_type) => {
                info!(event_type = %event_type, "Unhandled event type, acknowledging");
                return Ok(DispatchOutcome::Ignored);
            }
        }
        Ok(DispatchOutcome::Processed)
    }
}
