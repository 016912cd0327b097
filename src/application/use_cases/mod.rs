pub mod account;
pub mod billing_ledger;
pub mod plan_change;
pub mod subscription_sync;
pub mod usage_period;
pub mod webhook_dispatch;
