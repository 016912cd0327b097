//! Test app state builder for HTTP-level testing.
//!
//! `TestAppStateBuilder` wires the real use cases over in-memory repositories
//! and a fake provider, and hands back the mocks so tests can inspect them.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::HeaderValue;
use secrecy::SecretString;

use crate::{
    adapters::http::app_state::AppState,
    application::use_cases::{
        account::{AccountProfile, AccountUseCases},
        billing_ledger::BillingLedgerUseCases,
        plan_change::PlanChangeUseCases,
        subscription_sync::SubscriptionSyncUseCases,
        usage_period::UsagePeriodUseCases,
        webhook_dispatch::WebhookDispatchUseCases,
    },
    domain::entities::plan_rules::PlanRuleTable,
    infra::config::AppConfig,
    test_utils::{
        FakeBillingProvider, InMemoryAccountRepo, InMemoryBillingRecordRepo,
        InMemoryUsagePeriodRepo, InMemoryWebhookEventRepo,
    },
};

pub const TEST_WEBHOOK_SECRET: &str = "whsec_test";

/// Handles to the in-memory backends behind a built `AppState`.
pub struct TestMocks {
    pub accounts: Arc<InMemoryAccountRepo>,
    pub usage: Arc<InMemoryUsagePeriodRepo>,
    pub records: Arc<InMemoryBillingRecordRepo>,
    pub events: Arc<InMemoryWebhookEventRepo>,
    pub provider: Arc<FakeBillingProvider>,
}

pub struct TestAppStateBuilder {
    accounts: Vec<AccountProfile>,
    provider: FakeBillingProvider,
}

impl Default for TestAppStateBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestAppStateBuilder {
    pub fn new() -> Self {
        Self {
            accounts: Vec::new(),
            provider: FakeBillingProvider::new(),
        }
    }

    pub fn with_account(mut self, account: AccountProfile) -> Self {
        self.accounts.push(account);
        self
    }

    pub fn with_provider(mut self, provider: FakeBillingProvider) -> Self {
        self.provider = provider;
        self
    }

    pub fn build(self) -> AppState {
        self.build_with_mocks().0
    }

    pub fn build_with_mocks(self) -> (AppState, TestMocks) {
        let mocks = TestMocks {
            accounts: Arc::new(InMemoryAccountRepo::with_accounts(self.accounts)),
            usage: Arc::new(InMemoryUsagePeriodRepo::new()),
            records: Arc::new(InMemoryBillingRecordRepo::new()),
            events: Arc::new(InMemoryWebhookEventRepo::new()),
            provider: Arc::new(self.provider),
        };

        let usage = Arc::new(UsagePeriodUseCases::new(mocks.usage.clone()));
        let ledger = Arc::new(BillingLedgerUseCases::new(mocks.records.clone()));
        let subscription_sync = Arc::new(SubscriptionSyncUseCases::new(
            mocks.accounts.clone(),
            usage,
            ledger,
        ));
        let plan_change = Arc::new(PlanChangeUseCases::new(
            mocks.accounts.clone(),
            mocks.provider.clone(),
        ));
        let webhook_dispatch = Arc::new(WebhookDispatchUseCases::new(
            mocks.events.clone(),
            subscription_sync,
            plan_change.clone(),
            chrono::Duration::seconds(120),
        ));
        let account_use_cases = Arc::new(AccountUseCases::new(
            mocks.accounts.clone(),
            mocks.usage.clone(),
            Arc::new(PlanRuleTable::standard()),
        ));

        let config = Arc::new(AppConfig {
            database_url: String::new(),
            bind_addr: "127.0.0.1:3001".parse::<SocketAddr>().unwrap(),
            cors_origin: HeaderValue::from_static("http://localhost:3000"),
            stripe_secret_key: SecretString::new("sk_test".into()),
            stripe_webhook_secret: SecretString::new(TEST_WEBHOOK_SECRET.into()),
            webhook_tolerance_secs: 300,
            webhook_stale_claim_secs: 120,
            log_file: "app.log".to_string(),
        });

        let app_state = AppState {
            config,
            webhook_dispatch,
            account_use_cases,
            plan_change_use_cases: plan_change,
        };
        (app_state, mocks)
    }
}
