pub mod billing_event;
pub mod billing_record_status;
pub mod plan_rules;
pub mod subscription_status;
