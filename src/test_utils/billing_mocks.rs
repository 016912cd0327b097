//! In-memory implementations of the repository traits and the provider port.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::{
        ports::billing_provider::{
            BillingProviderPort, ItemChangeBilling, PriceId, SchedulePhase, ScheduleId,
            SubscriptionId,
        },
        use_cases::{
            account::{AccountProfile, AccountRepo, AccountUpdate},
            billing_ledger::{BillingRecordProfile, BillingRecordRepo, NewBillingRecord},
            usage_period::{UsagePeriodProfile, UsagePeriodRepo},
            webhook_dispatch::{ClaimOutcome, WebhookEventProfile, WebhookEventRepo},
        },
    },
    domain::entities::billing_event::{Price, SubscriptionObject},
};

// ============================================================================
// InMemoryAccountRepo
// ============================================================================

#[derive(Default)]
pub struct InMemoryAccountRepo {
    pub accounts: Mutex<HashMap<String, AccountProfile>>,
}

impl InMemoryAccountRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_accounts(accounts: Vec<AccountProfile>) -> Self {
        let map = accounts
            .into_iter()
            .map(|a| (a.account_id.clone(), a))
            .collect();
        Self {
            accounts: Mutex::new(map),
        }
    }

    pub fn get(&self, account_id: &str) -> Option<AccountProfile> {
        self.accounts.lock().unwrap().get(account_id).cloned()
    }

    pub fn modify(&self, account_id: &str, f: impl FnOnce(&mut AccountProfile)) {
        if let Some(account) = self.accounts.lock().unwrap().get_mut(account_id) {
            f(account);
        }
    }
}

#[async_trait]
impl AccountRepo for InMemoryAccountRepo {
    async fn get_by_id(&self, account_id: &str) -> AppResult<Option<AccountProfile>> {
        Ok(self.get(account_id))
    }

    async fn get_by_customer_id(&self, customer_id: &str) -> AppResult<Option<AccountProfile>> {
        Ok(self
            .accounts
            .lock()
            .unwrap()
            .values()
            .find(|a| a.customer_id.as_deref() == Some(customer_id))
            .cloned())
    }

    async fn update(&self, account_id: &str, update: &AccountUpdate) -> AppResult<bool> {
        let mut accounts = self.accounts.lock().unwrap();
        let account = accounts.get_mut(account_id).ok_or(AppError::NotFound)?;
        let applied = update.apply_to(account);
        account.updated_at = Some(Utc::now());
        Ok(applied)
    }
}

// ============================================================================
// InMemoryUsagePeriodRepo
// ============================================================================

#[derive(Default)]
pub struct InMemoryUsagePeriodRepo {
    pub periods: Mutex<HashMap<(String, DateTime<Utc>), UsagePeriodProfile>>,
}

impl InMemoryUsagePeriodRepo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a period with existing counts.
    pub fn seed(
        &self,
        account_id: &str,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
        article_count: i32,
        decoration_count: i32,
    ) {
        self.periods.lock().unwrap().insert(
            (account_id.to_string(), period_start),
            UsagePeriodProfile {
                account_id: account_id.to_string(),
                period_start,
                period_end,
                article_count,
                decoration_count,
                created_at: Some(Utc::now()),
                updated_at: Some(Utc::now()),
            },
        );
    }

    /// All periods for an account, oldest first.
    pub fn periods_for(&self, account_id: &str) -> Vec<UsagePeriodProfile> {
        let mut periods: Vec<_> = self
            .periods
            .lock()
            .unwrap()
            .values()
            .filter(|p| p.account_id == account_id)
            .cloned()
            .collect();
        periods.sort_by_key(|p| p.period_start);
        periods
    }

    pub fn current(&self, account_id: &str) -> Option<UsagePeriodProfile> {
        self.periods_for(account_id).pop()
    }
}

#[async_trait]
impl UsagePeriodRepo for InMemoryUsagePeriodRepo {
    async fn reset(
        &self,
        account_id: &str,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> AppResult<UsagePeriodProfile> {
        self.seed(account_id, period_start, period_end, 0, 0);
        Ok(self
            .periods
            .lock()
            .unwrap()
            .get(&(account_id.to_string(), period_start))
            .cloned()
            .ok_or(AppError::NotFound)?)
    }

    async fn get_current(&self, account_id: &str) -> AppResult<Option<UsagePeriodProfile>> {
        Ok(self.current(account_id))
    }
}

// ============================================================================
// InMemoryBillingRecordRepo
// ============================================================================

#[derive(Default)]
pub struct InMemoryBillingRecordRepo {
    pub records: Mutex<Vec<BillingRecordProfile>>,
    fail_next: Mutex<bool>,
}

impl InMemoryBillingRecordRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<BillingRecordProfile> {
        self.records.lock().unwrap().clone()
    }

    /// Make the next `append` return a database error.
    pub fn fail_next_append(&self) {
        *self.fail_next.lock().unwrap() = true;
    }
}

#[async_trait]
impl BillingRecordRepo for InMemoryBillingRecordRepo {
    async fn append(&self, record: &NewBillingRecord) -> AppResult<bool> {
        {
            let mut fail = self.fail_next.lock().unwrap();
            if *fail {
                *fail = false;
                return Err(AppError::Database("simulated outage".into()));
            }
        }

        let mut records = self.records.lock().unwrap();
        if records
            .iter()
            .any(|r| r.invoice_id == record.invoice_id && r.status == record.status)
        {
            return Ok(false);
        }
        records.push(BillingRecordProfile {
            id: Uuid::new_v4(),
            account_id: record.account_id.clone(),
            invoice_id: record.invoice_id.clone(),
            payment_intent_id: record.payment_intent_id.clone(),
            amount: record.amount,
            currency: record.currency.clone(),
            status: record.status,
            plan_type: record.plan_type.clone(),
            period_start: record.period_start,
            period_end: record.period_end,
            created_at: Some(Utc::now()),
        });
        Ok(true)
    }
}

// ============================================================================
// InMemoryWebhookEventRepo
// ============================================================================

#[derive(Default)]
pub struct InMemoryWebhookEventRepo {
    pub events: Mutex<HashMap<String, WebhookEventProfile>>,
}

impl InMemoryWebhookEventRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, event_id: &str) -> Option<WebhookEventProfile> {
        self.events.lock().unwrap().get(event_id).cloned()
    }

    /// Simulate a delivery that claimed the event at `claimed_at` and never finished.
    pub fn seed_unfinished(&self, event_id: &str, event_type: &str, claimed_at: DateTime<Utc>) {
        self.events.lock().unwrap().insert(
            event_id.to_string(),
            WebhookEventProfile {
                event_id: event_id.to_string(),
                event_type: event_type.to_string(),
                processed: false,
                error_message: None,
                attempts: 1,
                created_at: claimed_at,
                updated_at: claimed_at,
            },
        );
    }
}

#[async_trait]
impl WebhookEventRepo for InMemoryWebhookEventRepo {
    async fn try_claim(
        &self,
        event_id: &str,
        event_type: &str,
        stale_before: DateTime<Utc>,
    ) -> AppResult<ClaimOutcome> {
        let mut events = self.events.lock().unwrap();
        let now = Utc::now();
        match events.get_mut(event_id) {
            None => {
                events.insert(
                    event_id.to_string(),
                    WebhookEventProfile {
                        event_id: event_id.to_string(),
                        event_type: event_type.to_string(),
                        processed: false,
                        error_message: None,
                        attempts: 1,
                        created_at: now,
                        updated_at: now,
                    },
                );
                Ok(ClaimOutcome::Claimed)
            }
            Some(existing) if existing.processed => Ok(ClaimOutcome::AlreadyProcessed),
            Some(existing)
                if existing.error_message.is_some() || existing.updated_at < stale_before =>
            {
                existing.attempts += 1;
                existing.error_message = None;
                existing.updated_at = now;
                Ok(ClaimOutcome::Claimed)
            }
            Some(_) => Ok(ClaimOutcome::InFlight),
        }
    }

    async fn mark_processed(&self, event_id: &str) -> AppResult<()> {
        let mut events = self.events.lock().unwrap();
        let event = events.get_mut(event_id).ok_or(AppError::NotFound)?;
        event.processed = true;
        event.error_message = None;
        event.updated_at = Utc::now();
        Ok(())
    }

    async fn mark_failed(&self, event_id: &str, error_message: &str) -> AppResult<()> {
        let mut events = self.events.lock().unwrap();
        let event = events.get_mut(event_id).ok_or(AppError::NotFound)?;
        event.processed = false;
        event.error_message = Some(error_message.to_string());
        event.updated_at = Utc::now();
        Ok(())
    }
}

// ============================================================================
// FakeBillingProvider
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum ProviderCall {
    RetrieveSubscription(String),
    RetrievePrice(String),
    ReplaceItemPrice {
        subscription_id: String,
        item_id: String,
        price_id: String,
        billing: ItemChangeBilling,
    },
    ReleaseSchedule(String),
    CreateSchedule(String),
    SetSchedulePhases {
        schedule_id: String,
        phases: Vec<SchedulePhase>,
    },
}

/// Records every call and serves seeded subscriptions and prices.
#[derive(Default)]
pub struct FakeBillingProvider {
    subscriptions: Mutex<HashMap<String, SubscriptionObject>>,
    prices: Mutex<HashMap<String, Price>>,
    calls: Mutex<Vec<ProviderCall>>,
    idempotency_keys: Mutex<Vec<String>>,
    failing: Option<&'static str>,
    created_schedule: Option<&'static str>,
}

impl FakeBillingProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_subscription(self, subscription: SubscriptionObject) -> Self {
        self.subscriptions
            .lock()
            .unwrap()
            .insert(subscription.id.clone(), subscription);
        self
    }

    pub fn with_price(self, price: Price) -> Self {
        self.prices.lock().unwrap().insert(price.id.clone(), price);
        self
    }

    /// Make the named port method fail with a provider error.
    pub fn failing_on(mut self, method: &'static str) -> Self {
        self.failing = Some(method);
        self
    }

    /// Id returned by `create_schedule_from_subscription` (default `sub_sched_new`).
    pub fn creating_schedule(mut self, schedule_id: &'static str) -> Self {
        self.created_schedule = Some(schedule_id);
        self
    }

    pub fn calls(&self) -> Vec<ProviderCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Idempotency keys passed to mutating calls, in call order.
    pub fn idempotency_keys(&self) -> Vec<String> {
        self.idempotency_keys.lock().unwrap().clone()
    }

    fn record_mutation(
        &self,
        method: &'static str,
        call: ProviderCall,
        idempotency_key: &str,
    ) -> AppResult<()> {
        self.idempotency_keys
            .lock()
            .unwrap()
            .push(idempotency_key.to_string());
        self.record(method, call)
    }

    fn record(&self, method: &'static str, call: ProviderCall) -> AppResult<()> {
        self.calls.lock().unwrap().push(call);
        if self.failing == Some(method) {
            return Err(AppError::Provider(format!("simulated {method} failure")));
        }
        Ok(())
    }
}

#[async_trait]
impl BillingProviderPort for FakeBillingProvider {
    async fn retrieve_subscription(
        &self,
        subscription_id: &SubscriptionId,
    ) -> AppResult<SubscriptionObject> {
        self.record(
            "retrieve_subscription",
            ProviderCall::RetrieveSubscription(subscription_id.to_string()),
        )?;
        self.subscriptions
            .lock()
            .unwrap()
            .get(subscription_id.as_str())
            .cloned()
            .ok_or_else(|| AppError::Provider(format!("No such subscription: {subscription_id}")))
    }

    async fn retrieve_price(&self, price_id: &PriceId) -> AppResult<Price> {
        self.record(
            "retrieve_price",
            ProviderCall::RetrievePrice(price_id.to_string()),
        )?;
        self.prices
            .lock()
            .unwrap()
            .get(price_id.as_str())
            .cloned()
            .ok_or_else(|| AppError::Provider(format!("No such price: {price_id}")))
    }

    async fn replace_item_price(
        &self,
        subscription_id: &SubscriptionId,
        item_id: &str,
        new_price: &PriceId,
        billing: ItemChangeBilling,
        idempotency_key: &str,
    ) -> AppResult<()> {
        self.record_mutation(
            "replace_item_price",
            ProviderCall::ReplaceItemPrice {
                subscription_id: subscription_id.to_string(),
                item_id: item_id.to_string(),
                price_id: new_price.to_string(),
                billing,
            },
            idempotency_key,
        )
    }

    async fn release_schedule(
        &self,
        schedule_id: &ScheduleId,
        idempotency_key: &str,
    ) -> AppResult<()> {
        self.record_mutation(
            "release_schedule",
            ProviderCall::ReleaseSchedule(schedule_id.to_string()),
            idempotency_key,
        )
    }

    async fn create_schedule_from_subscription(
        &self,
        subscription_id: &SubscriptionId,
        idempotency_key: &str,
    ) -> AppResult<ScheduleId> {
        self.record_mutation(
            "create_schedule_from_subscription",
            ProviderCall::CreateSchedule(subscription_id.to_string()),
            idempotency_key,
        )?;
        Ok(ScheduleId::new(self.created_schedule.unwrap_or("sub_sched_new")))
    }

    async fn set_schedule_phases(
        &self,
        schedule_id: &ScheduleId,
        phases: &[SchedulePhase],
        idempotency_key: &str,
    ) -> AppResult<()> {
        self.record_mutation(
            "set_schedule_phases",
            ProviderCall::SetSchedulePhases {
                schedule_id: schedule_id.to_string(),
                phases: phases.to_vec(),
            },
            idempotency_key,
        )
    }
}
