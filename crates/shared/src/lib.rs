// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! EGLISE Shared Types
//!
//! Domain enums and database helpers shared by the billing crate, the API
//! server and the background worker.

pub mod db;
pub mod types;

pub use db::{create_pool, run_migrations};
pub use types::{
    BillStatus, BillType, BillingCycle, PaymentStatus, PricingOrigin, UpgradeRequestStatus,
};
