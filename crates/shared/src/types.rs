//! Domain enums
//!
//! These are stored as TEXT columns; row structs carry the raw string and
//! parse on access, so a bad value in the database surfaces as a handled
//! error instead of a decode panic.

use serde::{Deserialize, Serialize};

/// Billing recurrence unit for a subscription or bill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BillingCycle {
    Monthly,
    Yearly,
    Trial,
}

impl BillingCycle {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingCycle::Monthly => "MONTHLY",
            BillingCycle::Yearly => "YEARLY",
            BillingCycle::Trial => "TRIAL",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "MONTHLY" => Some(BillingCycle::Monthly),
            "YEARLY" => Some(BillingCycle::Yearly),
            "TRIAL" => Some(BillingCycle::Trial),
            _ => None,
        }
    }

    /// Cycle length in calendar months. Trial subscriptions have no paid
    /// period, so their cycle length is zero.
    pub fn months(&self) -> i32 {
        match self {
            BillingCycle::Monthly => 1,
            BillingCycle::Yearly => 12,
            BillingCycle::Trial => 0,
        }
    }
}

impl std::fmt::Display for BillingCycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Payment state of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Paid,
    Unpaid,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Paid => "PAID",
            PaymentStatus::Unpaid => "UNPAID",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PAID" => Some(PaymentStatus::Paid),
            "UNPAID" => Some(PaymentStatus::Unpaid),
            _ => None,
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle state of a bill. A bill moves UNPAID → PAID exactly once;
/// CANCELLED is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BillStatus {
    Unpaid,
    Paid,
    Cancelled,
}

impl BillStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillStatus::Unpaid => "UNPAID",
            BillStatus::Paid => "PAID",
            BillStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "UNPAID" => Some(BillStatus::Unpaid),
            "PAID" => Some(BillStatus::Paid),
            "CANCELLED" => Some(BillStatus::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for BillStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What a bill charges for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BillType {
    New,
    Upgrade,
    Extension,
    Renew,
}

impl BillType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillType::New => "NEW",
            BillType::Upgrade => "UPGRADE",
            BillType::Extension => "EXTENSION",
            BillType::Renew => "RENEW",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "NEW" => Some(BillType::New),
            "UPGRADE" => Some(BillType::Upgrade),
            "EXTENSION" => Some(BillType::Extension),
            "RENEW" => Some(BillType::Renew),
            _ => None,
        }
    }
}

impl std::fmt::Display for BillType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Whether the subscription's current rate basis is the original base
/// purchase or a prior upgrade. Once a subscription has been upgraded its
/// remaining value is always priced at upgrade rates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PricingOrigin {
    Base,
    Upgrade,
}

impl PricingOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            PricingOrigin::Base => "BASE",
            PricingOrigin::Upgrade => "UPGRADE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "BASE" => Some(PricingOrigin::Base),
            "UPGRADE" => Some(PricingOrigin::Upgrade),
            _ => None,
        }
    }
}

impl std::fmt::Display for PricingOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Review state of a church-initiated upgrade request. Advisory only:
/// approval never creates a bill by itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UpgradeRequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl UpgradeRequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpgradeRequestStatus::Pending => "PENDING",
            UpgradeRequestStatus::Approved => "APPROVED",
            UpgradeRequestStatus::Rejected => "REJECTED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(UpgradeRequestStatus::Pending),
            "APPROVED" => Some(UpgradeRequestStatus::Approved),
            "REJECTED" => Some(UpgradeRequestStatus::Rejected),
            _ => None,
        }
    }
}

impl std::fmt::Display for UpgradeRequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_billing_cycle_round_trip() {
        for cycle in [BillingCycle::Monthly, BillingCycle::Yearly, BillingCycle::Trial] {
            assert_eq!(BillingCycle::parse(cycle.as_str()), Some(cycle));
        }
        assert_eq!(BillingCycle::parse("weekly"), None);
    }

    #[test]
    fn test_cycle_months() {
        assert_eq!(BillingCycle::Monthly.months(), 1);
        assert_eq!(BillingCycle::Yearly.months(), 12);
        assert_eq!(BillingCycle::Trial.months(), 0);
    }

    #[test]
    fn test_bill_status_parse() {
        assert_eq!(BillStatus::parse("UNPAID"), Some(BillStatus::Unpaid));
        assert_eq!(BillStatus::parse("PAID"), Some(BillStatus::Paid));
        assert_eq!(BillStatus::parse("CANCELLED"), Some(BillStatus::Cancelled));
        assert_eq!(BillStatus::parse("paid"), None);
    }

    #[test]
    fn test_serde_uses_screaming_snake_case() {
        let json = serde_json::to_string(&BillingCycle::Monthly).unwrap();
        assert_eq!(json, "\"MONTHLY\"");
        let parsed: PricingOrigin = serde_json::from_str("\"UPGRADE\"").unwrap();
        assert_eq!(parsed, PricingOrigin::Upgrade);
    }
}
