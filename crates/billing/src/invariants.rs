//! Billing Invariants Module
//!
//! Provides runnable consistency checks for the billing system.
//! These invariants can be run after any mutation to ensure the system is
//! in a valid state.
//!
//! ## Design Principles
//!
//! 1. **Executable**: Each invariant is a real SQL query that can be run
//! 2. **Explanatory**: Violations include enough context to debug
//! 3. **Non-destructive**: Checks only read, never write
//! 4. **Complete**: Covers all critical billing consistency requirements

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::BillingResult;

/// Result of running a single invariant check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvariantViolation {
    /// Which invariant was violated
    pub invariant: String,
    /// Church(es) affected
    pub church_ids: Vec<Uuid>,
    /// Human-readable description of the violation
    pub description: String,
    /// Additional context for debugging
    pub context: serde_json::Value,
    /// Severity level
    pub severity: ViolationSeverity,
}

/// Severity of an invariant violation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViolationSeverity {
    /// Critical - system may be charging incorrectly
    Critical,
    /// High - data inconsistency that needs attention
    High,
    /// Medium - potential issue, should investigate
    Medium,
    /// Low - minor inconsistency, informational
    Low,
}

impl std::fmt::Display for ViolationSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ViolationSeverity::Critical => write!(f, "CRITICAL"),
            ViolationSeverity::High => write!(f, "HIGH"),
            ViolationSeverity::Medium => write!(f, "MEDIUM"),
            ViolationSeverity::Low => write!(f, "LOW"),
        }
    }
}

/// Summary of all invariant checks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvariantCheckSummary {
    /// When the check was run
    pub checked_at: OffsetDateTime,
    /// Total number of checks run
    pub checks_run: usize,
    /// Number of checks that passed
    pub checks_passed: usize,
    /// Number of checks that failed
    pub checks_failed: usize,
    /// List of all violations found
    pub violations: Vec<InvariantViolation>,
    /// Overall health status
    pub healthy: bool,
}

/// Row type for multiple unpaid bills violation
#[derive(Debug, sqlx::FromRow)]
struct MultipleUnpaidBillsRow {
    church_id: Uuid,
    subscription_id: Uuid,
    unpaid_count: i64,
}

/// Row type for end date mismatch violation
#[derive(Debug, sqlx::FromRow)]
struct EndDateMismatchRow {
    church_id: Uuid,
    subscription_id: Uuid,
    start_date: Option<time::Date>,
    end_date: Option<time::Date>,
    duration_months: i32,
}

/// Row type for active-but-unpaid violation
#[derive(Debug, sqlx::FromRow)]
struct ActiveUnpaidRow {
    church_id: Uuid,
    church_name: String,
    payment_status: String,
}

/// Row type for deleted-but-active violation
#[derive(Debug, sqlx::FromRow)]
struct DeletedActiveRow {
    church_id: Uuid,
    church_name: String,
}

/// Row type for paid bill without timestamp violation
#[derive(Debug, sqlx::FromRow)]
struct PaidBillNoTimestampRow {
    bill_id: Uuid,
    church_id: Uuid,
    bill_number: Option<String>,
}

/// Row type for trial package with pricing violation
#[derive(Debug, sqlx::FromRow)]
struct TrialWithPricingRow {
    package_id: Uuid,
    package_name: String,
}

/// Service for running billing invariant checks
pub struct InvariantChecker {
    pool: PgPool,
}

impl InvariantChecker {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run all invariant checks and return summary
    pub async fn run_all_checks(&self) -> BillingResult<InvariantCheckSummary> {
        let now = OffsetDateTime::now_utc();
        let mut violations = Vec::new();

        violations.extend(self.check_single_unpaid_bill().await?);
        violations.extend(self.check_end_date_consistency().await?);
        violations.extend(self.check_active_requires_paid().await?);
        violations.extend(self.check_deleted_not_active().await?);
        violations.extend(self.check_paid_bill_has_timestamp().await?);
        violations.extend(self.check_trial_packages_unpriced().await?);

        let checks_run = 6;
        let checks_failed = violations
            .iter()
            .map(|v| &v.invariant)
            .collect::<std::collections::HashSet<_>>()
            .len();
        let checks_passed = checks_run - checks_failed;

        Ok(InvariantCheckSummary {
            checked_at: now,
            checks_run,
            checks_passed,
            checks_failed,
            healthy: violations.is_empty(),
            violations,
        })
    }

    /// Invariant 1: At most one UNPAID bill per subscription
    ///
    /// Multiple outstanding bills mean a guard was bypassed; paying them in
    /// the wrong order would apply stale subscription changes.
    async fn check_single_unpaid_bill(&self) -> BillingResult<Vec<InvariantViolation>> {
        let rows: Vec<MultipleUnpaidBillsRow> = sqlx::query_as(
            r#"
            SELECT church_id, subscription_id, COUNT(*) as unpaid_count
            FROM bills
            WHERE status = 'UNPAID'
            GROUP BY church_id, subscription_id
            HAVING COUNT(*) > 1
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "single_unpaid_bill".to_string(),
                church_ids: vec![row.church_id],
                description: format!(
                    "Subscription has {} outstanding UNPAID bills (expected at most 1)",
                    row.unpaid_count
                ),
                context: serde_json::json!({
                    "subscription_id": row.subscription_id,
                    "unpaid_count": row.unpaid_count,
                }),
                severity: ViolationSeverity::Critical,
            })
            .collect())
    }

    /// Invariant 2: end_date = start_date + duration_months
    ///
    /// The end date is always derivable; a mismatch means a write path
    /// skipped the recompute.
    async fn check_end_date_consistency(&self) -> BillingResult<Vec<InvariantViolation>> {
        let rows: Vec<EndDateMismatchRow> = sqlx::query_as(
            r#"
            SELECT church_id, id as subscription_id, start_date, end_date, duration_months
            FROM church_subscriptions
            WHERE start_date IS NOT NULL
              AND end_date IS DISTINCT FROM
                  (start_date + make_interval(months => duration_months))::date
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "end_date_consistency".to_string(),
                church_ids: vec![row.church_id],
                description: format!(
                    "Subscription end_date {:?} does not equal start_date {:?} + {} months",
                    row.end_date, row.start_date, row.duration_months
                ),
                context: serde_json::json!({
                    "subscription_id": row.subscription_id,
                    "start_date": row.start_date,
                    "end_date": row.end_date,
                    "duration_months": row.duration_months,
                }),
                severity: ViolationSeverity::High,
            })
            .collect())
    }

    /// Invariant 3: An active non-trial subscription is PAID
    ///
    /// An UNPAID subscription with live entitlements means a tenant is
    /// using the platform without paying.
    async fn check_active_requires_paid(&self) -> BillingResult<Vec<InvariantViolation>> {
        let rows: Vec<ActiveUnpaidRow> = sqlx::query_as(
            r#"
            SELECT s.church_id, c.name as church_name, s.payment_status
            FROM church_subscriptions s
            JOIN churches c ON c.id = s.church_id
            JOIN packages p ON p.id = s.package_id
            WHERE s.is_active
              AND NOT p.is_trial
              AND s.payment_status != 'PAID'
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "active_requires_paid".to_string(),
                church_ids: vec![row.church_id],
                description: format!(
                    "Church '{}' has an active subscription with payment status '{}'",
                    row.church_name, row.payment_status
                ),
                context: serde_json::json!({
                    "church_name": row.church_name,
                    "payment_status": row.payment_status,
                }),
                severity: ViolationSeverity::Critical,
            })
            .collect())
    }

    /// Invariant 4: A soft-deleted church is never active
    async fn check_deleted_not_active(&self) -> BillingResult<Vec<InvariantViolation>> {
        let rows: Vec<DeletedActiveRow> = sqlx::query_as(
            r#"
            SELECT id as church_id, name as church_name
            FROM churches
            WHERE is_deleted AND is_active
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "deleted_not_active".to_string(),
                church_ids: vec![row.church_id],
                description: format!(
                    "Church '{}' is soft-deleted but still active",
                    row.church_name
                ),
                context: serde_json::json!({
                    "church_name": row.church_name,
                }),
                severity: ViolationSeverity::High,
            })
            .collect())
    }

    /// Invariant 5: PAID bills carry a paid_at timestamp
    async fn check_paid_bill_has_timestamp(&self) -> BillingResult<Vec<InvariantViolation>> {
        let rows: Vec<PaidBillNoTimestampRow> = sqlx::query_as(
            r#"
            SELECT id as bill_id, church_id, bill_number
            FROM bills
            WHERE status = 'PAID' AND paid_at IS NULL
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "paid_bill_has_timestamp".to_string(),
                church_ids: vec![row.church_id],
                description: format!(
                    "Bill {} is PAID but has no paid_at timestamp",
                    row.bill_number.as_deref().unwrap_or("(unnumbered)")
                ),
                context: serde_json::json!({
                    "bill_id": row.bill_id,
                    "bill_number": row.bill_number,
                }),
                severity: ViolationSeverity::Medium,
            })
            .collect())
    }

    /// Invariant 6: Trial packages carry no pricing
    ///
    /// A priced trial would let `calculate_new_bill`'s zero-pricing rule
    /// and the rate resolver disagree about the package's value.
    async fn check_trial_packages_unpriced(&self) -> BillingResult<Vec<InvariantViolation>> {
        let rows: Vec<TrialWithPricingRow> = sqlx::query_as(
            r#"
            SELECT id as package_id, name as package_name
            FROM packages
            WHERE is_trial
              AND (rate_per_member_monthly IS NOT NULL
                   OR rate_per_member_yearly IS NOT NULL
                   OR upgrade_rate_monthly IS NOT NULL
                   OR upgrade_rate_yearly IS NOT NULL)
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "trial_packages_unpriced".to_string(),
                church_ids: vec![],
                description: format!(
                    "Trial package '{}' has pricing or upgrade rates configured",
                    row.package_name
                ),
                context: serde_json::json!({
                    "package_id": row.package_id,
                    "package_name": row.package_name,
                }),
                severity: ViolationSeverity::High,
            })
            .collect())
    }

    /// Run a single invariant check by name
    pub async fn run_check(&self, name: &str) -> BillingResult<Vec<InvariantViolation>> {
        match name {
            "single_unpaid_bill" => self.check_single_unpaid_bill().await,
            "end_date_consistency" => self.check_end_date_consistency().await,
            "active_requires_paid" => self.check_active_requires_paid().await,
            "deleted_not_active" => self.check_deleted_not_active().await,
            "paid_bill_has_timestamp" => self.check_paid_bill_has_timestamp().await,
            "trial_packages_unpriced" => self.check_trial_packages_unpriced().await,
            _ => Ok(vec![]),
        }
    }

    /// Get list of all available invariant checks
    pub fn available_checks() -> Vec<&'static str> {
        vec![
            "single_unpaid_bill",
            "end_date_consistency",
            "active_requires_paid",
            "deleted_not_active",
            "paid_bill_has_timestamp",
            "trial_packages_unpriced",
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_violation_severity_display() {
        assert_eq!(ViolationSeverity::Critical.to_string(), "CRITICAL");
        assert_eq!(ViolationSeverity::High.to_string(), "HIGH");
        assert_eq!(ViolationSeverity::Medium.to_string(), "MEDIUM");
        assert_eq!(ViolationSeverity::Low.to_string(), "LOW");
    }

    #[test]
    fn test_available_checks() {
        let checks = InvariantChecker::available_checks();
        assert_eq!(checks.len(), 6);
        assert!(checks.contains(&"single_unpaid_bill"));
        assert!(checks.contains(&"end_date_consistency"));
    }
}
