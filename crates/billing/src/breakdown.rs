//! Frozen bill snapshots
//!
//! Every bill stores a `breakdown` JSON document capturing the exact inputs
//! its amount was computed from, plus an `apply` payload: the subscription
//! changes that take effect when the bill is paid. Once stored, the snapshot
//! is the sole authority: payment never recomputes from live package state,
//! because rates may have changed between bill creation and payment.
//!
//! The JSON shape is a durable contract; consumers read historical bills.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use eglise_shared::BillingCycle;

use crate::error::{BillingError, BillingResult};

/// One line of a bill's amount computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LineItem {
    #[serde(rename = "NEW")]
    New {
        members: i32,
        rate: Decimal,
        months: i32,
        calculation: String,
        total: Decimal,
    },
    #[serde(rename = "UPGRADE")]
    Upgrade {
        mode: String,
        months_used: i32,
        members: i32,
        remaining_months: i32,
        old_rate: Decimal,
        upgrade_rate: Decimal,
        old_remaining_value: Decimal,
        #[serde(skip_serializing_if = "Option::is_none")]
        new_remaining_value: Option<Decimal>,
        calculation: String,
        total: Decimal,
    },
}

/// Proration mode marker recorded on upgrade line items.
pub const MODE_MONTH_BASED: &str = "MONTH_BASED";

/// Deferred subscription mutation, written onto the subscription when the
/// bill transitions to PAID.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplyPayload {
    pub package_id: Uuid,
    pub billing_cycle: BillingCycle,
    pub duration_months: i32,
    pub custom_capacity: Option<i32>,
}

/// The full frozen snapshot stored on a bill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Breakdown {
    pub line_items: Vec<LineItem>,
    pub grand_total: Decimal,
    pub credit_generated: Decimal,
    pub apply: Option<ApplyPayload>,
}

impl Breakdown {
    /// Remaining months recorded on the first upgrade line item, used to
    /// re-anchor the subscription period when an UPGRADE bill is paid.
    pub fn remaining_months(&self) -> Option<i32> {
        self.line_items.iter().find_map(|item| match item {
            LineItem::Upgrade {
                remaining_months, ..
            } => Some(*remaining_months),
            LineItem::New { .. } => None,
        })
    }

    pub fn to_value(&self) -> BillingResult<serde_json::Value> {
        serde_json::to_value(self)
            .map_err(|e| BillingError::Internal(format!("breakdown serialization failed: {}", e)))
    }

    pub fn from_value(value: serde_json::Value) -> BillingResult<Self> {
        serde_json::from_value(value)
            .map_err(|e| BillingError::Internal(format!("stored breakdown is unreadable: {}", e)))
    }
}
