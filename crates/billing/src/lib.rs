// Billing crate clippy configuration
#![allow(clippy::too_many_arguments)] // Breakdown construction takes the full pricing context
// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! EGLISE Billing Module
//!
//! The subscription billing and proration engine for the parish platform.
//!
//! ## Features
//!
//! - **Package Catalogue**: trial / standard / custom pricing tiers
//! - **Pricing**: flat NEW/RENEW bill amounts from rate × capacity × months
//! - **Proration**: month-granular mid-cycle upgrade charges and credits
//! - **Bill Lifecycle**: frozen breakdown snapshots, UNPAID → PAID with
//!   atomic application of the deferred subscription changes
//! - **Church State Machine**: activation, suspension, soft delete, restore
//! - **Audit Events**: append-only billing event trail
//! - **Invariants**: runnable consistency checks over the billing tables
//! - **Email Notifications**: bill issued, payment confirmed, expiry
//!   reminders (delivery delegated to an external service)

pub mod bills;
pub mod breakdown;
pub mod churches;
pub mod dates;
pub mod email;
pub mod error;
pub mod events;
pub mod invariants;
pub mod packages;
pub mod pricing;
pub mod proration;
pub mod subscriptions;
pub mod upgrade_requests;

#[cfg(test)]
mod edge_case_tests;

// Bills
pub use bills::{Bill, BillService, NewBill};

// Breakdown
pub use breakdown::{ApplyPayload, Breakdown, LineItem, MODE_MONTH_BASED};

// Churches
pub use churches::{classify_church_state, Church, ChurchService, ChurchState, NewChurch};

// Dates
pub use dates::{add_months, months_elapsed_inclusive};

// Email
pub use email::{BillingEmailService, EmailConfig};

// Error
pub use error::{BillingError, BillingResult};

// Events
pub use events::{BillingEvent, BillingEventLogger, BillingEventType};

// Invariants
pub use invariants::{
    InvariantCheckSummary, InvariantChecker, InvariantViolation, ViolationSeverity,
};

// Packages
pub use packages::{Package, PackageInput, PackageKind, PackageService};

// Pricing
pub use pricing::{
    calculate_new_bill, calculate_package_pricing, require_rate, resolve_package_capacity,
    resolve_rate, PricingPreview, RateKind,
};

// Proration
pub use proration::{calculate_upgrade, UpgradeQuote};

// Subscriptions
pub use subscriptions::{
    ChurchSubscription, ExpiringSubscription, MemberAdmission, NextAction, SubscribeOutcome,
    SubscriptionService,
};

// Upgrade requests
pub use upgrade_requests::{ReviewDecision, UpgradeRequest, UpgradeRequestService};

use sqlx::PgPool;

/// Main billing service that combines all billing functionality
pub struct BillingService {
    pub packages: PackageService,
    pub churches: ChurchService,
    pub subscriptions: SubscriptionService,
    pub bills: BillService,
    pub upgrade_requests: UpgradeRequestService,
    pub email: BillingEmailService,
    pub events: BillingEventLogger,
    pub invariants: InvariantChecker,
}

impl BillingService {
    /// Create a billing service with email settings from the environment
    pub fn from_env(pool: PgPool) -> Self {
        Self::new(pool, BillingEmailService::from_env())
    }

    /// Create a billing service with an explicit email service
    pub fn new(pool: PgPool, email: BillingEmailService) -> Self {
        Self {
            packages: PackageService::new(pool.clone()),
            churches: ChurchService::new(pool.clone(), email.clone()),
            subscriptions: SubscriptionService::new(pool.clone(), email.clone()),
            bills: BillService::new(pool.clone(), email.clone()),
            upgrade_requests: UpgradeRequestService::new(pool.clone()),
            events: BillingEventLogger::new(pool.clone()),
            invariants: InvariantChecker::new(pool),
            email,
        }
    }
}
