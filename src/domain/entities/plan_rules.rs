//! Entitlement tiers and the rule table that maps them to limits.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::subscription_status::SubscriptionStatus;

/// Limit value meaning "no cap".
pub const UNLIMITED: i32 = -1;

/// The entitlement tier actually in force for an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanTier {
    Trialing,
    Starter,
    Pro,
    Canceled,
}

impl PlanTier {
    /// Lowest paid tier, used when an active account has no recorded plan.
    pub const DEFAULT_PAID: PlanTier = PlanTier::Starter;

    pub fn as_str(&self) -> &'static str {
        match self {
            PlanTier::Trialing => "trialing",
            PlanTier::Starter => "starter",
            PlanTier::Pro => "pro",
            PlanTier::Canceled => "canceled",
        }
    }

    /// Parse a paid plan name as carried in price metadata.
    pub fn from_paid_plan(plan_type: &str) -> Option<Self> {
        match plan_type {
            "starter" => Some(PlanTier::Starter),
            "pro" => Some(PlanTier::Pro),
            _ => None,
        }
    }
}

impl fmt::Display for PlanTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanFeatures {
    pub export: bool,
    pub advanced_prompt: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanRule {
    pub article_limit: i32,
    pub decoration_limit: i32,
    pub features: PlanFeatures,
}

/// Immutable tier → rule lookup, built once at startup and shared behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanRuleTable {
    trialing: PlanRule,
    starter: PlanRule,
    pro: PlanRule,
    canceled: PlanRule,
}

impl PlanRuleTable {
    /// The production rule set.
    pub fn standard() -> Self {
        Self {
            trialing: PlanRule {
                article_limit: 10,
                decoration_limit: 20,
                features: PlanFeatures {
                    export: true,
                    advanced_prompt: false,
                },
            },
            starter: PlanRule {
                article_limit: 20,
                decoration_limit: 50,
                features: PlanFeatures {
                    export: true,
                    advanced_prompt: false,
                },
            },
            pro: PlanRule {
                article_limit: 150,
                decoration_limit: UNLIMITED,
                features: PlanFeatures {
                    export: true,
                    advanced_prompt: true,
                },
            },
            canceled: PlanRule {
                article_limit: 0,
                decoration_limit: 0,
                features: PlanFeatures {
                    export: true,
                    advanced_prompt: false,
                },
            },
        }
    }

    pub fn rule(&self, tier: PlanTier) -> &PlanRule {
        match tier {
            PlanTier::Trialing => &self.trialing,
            PlanTier::Starter => &self.starter,
            PlanTier::Pro => &self.pro,
            PlanTier::Canceled => &self.canceled,
        }
    }
}

impl Default for PlanRuleTable {
    fn default() -> Self {
        Self::standard()
    }
}

/// Derive the effective plan from subscription status and the last known plan type.
///
/// This is the only place entitlement is decided. Scheduled plan changes and
/// cancellation dates are deliberately not inputs.
pub fn resolve_effective_plan(
    status: Option<SubscriptionStatus>,
    plan_type: Option<&str>,
) -> PlanTier {
    match status {
        Some(SubscriptionStatus::Trialing) => PlanTier::Trialing,
        Some(s) if s.keeps_paid_plan() => match plan_type {
            None => PlanTier::DEFAULT_PAID,
            Some(plan) => PlanTier::from_paid_plan(plan).unwrap_or_else(|| {
                tracing::warn!(plan_type = plan, "Unknown plan type, resolving to canceled");
                PlanTier::Canceled
            }),
        },
        _ => PlanTier::Canceled,
    }
}
