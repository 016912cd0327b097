use serde::{Deserialize, Serialize};

/// Outcome recorded for an invoice.
///
/// `Paid` amounts are what was collected; `Failed` amounts are what was due and
/// left uncollected. The two must never be summed together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingRecordStatus {
    Paid,
    Failed,
}

impl BillingRecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingRecordStatus::Paid => "paid",
            BillingRecordStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "paid" => Some(BillingRecordStatus::Paid),
            "failed" => Some(BillingRecordStatus::Failed),
            _ => None,
        }
    }

    /// Whether the amount on a record with this status is money actually received.
    pub fn counts_as_revenue(&self) -> bool {
        matches!(self, BillingRecordStatus::Paid)
    }
}
