use std::sync::Arc;

use crate::{
    application::use_cases::{
        account::AccountUseCases, plan_change::PlanChangeUseCases,
        webhook_dispatch::WebhookDispatchUseCases,
    },
    infra::config::AppConfig,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub webhook_dispatch: Arc<WebhookDispatchUseCases>,
    pub account_use_cases: Arc<AccountUseCases>,
    pub plan_change_use_cases: Arc<PlanChangeUseCases>,
}
