use crate::{
    adapters::http::app_state::AppState,
    application::{
        ports::billing_provider::BillingProviderPort,
        use_cases::{
            account::{AccountRepo, AccountUseCases},
            billing_ledger::{BillingLedgerUseCases, BillingRecordRepo},
            plan_change::PlanChangeUseCases,
            subscription_sync::SubscriptionSyncUseCases,
            usage_period::{UsagePeriodRepo, UsagePeriodUseCases},
            webhook_dispatch::{WebhookDispatchUseCases, WebhookEventRepo},
        },
    },
    domain::entities::plan_rules::PlanRuleTable,
    infra::{
        config::AppConfig, postgres_persistence, stripe_billing_adapter::StripeBillingAdapter,
    },
};
use std::fs::File;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub async fn init_app_state() -> anyhow::Result<AppState> {
    let config = AppConfig::from_env()?;

    let postgres_arc = Arc::new(postgres_persistence(&config.database_url).await?);
    let account_repo = postgres_arc.clone() as Arc<dyn AccountRepo>;
    let usage_repo = postgres_arc.clone() as Arc<dyn UsagePeriodRepo>;
    let record_repo = postgres_arc.clone() as Arc<dyn BillingRecordRepo>;
    let event_repo = postgres_arc.clone() as Arc<dyn WebhookEventRepo>;

    let provider: Arc<dyn BillingProviderPort> =
        Arc::new(StripeBillingAdapter::new(&config.stripe_secret_key));

    let usage = Arc::new(UsagePeriodUseCases::new(usage_repo.clone()));
    let ledger = Arc::new(BillingLedgerUseCases::new(record_repo));

    let subscription_sync = Arc::new(SubscriptionSyncUseCases::new(
        account_repo.clone(),
        usage,
        ledger,
    ));
    let plan_change = Arc::new(PlanChangeUseCases::new(account_repo.clone(), provider));

    let webhook_dispatch = WebhookDispatchUseCases::new(
        event_repo,
        subscription_sync,
        plan_change.clone(),
        chrono::Duration::seconds(config.webhook_stale_claim_secs),
    );

    let account_use_cases = AccountUseCases::new(
        account_repo,
        usage_repo,
        Arc::new(PlanRuleTable::standard()),
    );

    Ok(AppState {
        config: Arc::new(config),
        webhook_dispatch: Arc::new(webhook_dispatch),
        account_use_cases: Arc::new(account_use_cases),
        plan_change_use_cases: plan_change,
    })
}

pub fn init_tracing(log_file: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "subscription_reconciler=debug,tower_http=debug".into());

    // Console (pretty logs)
    let console_layer = fmt::layer().with_target(false).with_level(true).pretty();

    // File (structured JSON logs)
    let json_layer = match File::create(log_file) {
        Ok(file) => Some(
            fmt::layer()
                .json()
                .with_writer(file)
                .with_current_span(true)
                .with_span_list(true),
        ),
        Err(e) => {
            eprintln!("cannot create log file {log_file}: {e}, logging to console only");
            None
        }
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(json_layer)
        .try_init()
        .ok();
}
