//! Package catalogue
//!
//! A package is a pricing tier: per-member base rates for new purchases,
//! optional per-member upgrade rates charged when the package is the target
//! of an upgrade, and a member capacity (fixed for standard tiers, supplied
//! per-subscription for custom "contact sales" tiers, and a separate
//! allowance for trials).

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};

/// Pricing-tier dispatch tag. Trial takes precedence over custom: the two
/// are mutually exclusive by validation, and every resolver checks trial
/// first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageKind {
    Trial,
    Custom,
    Standard,
}

/// A pricing tier as stored in the catalogue.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Package {
    pub id: Uuid,
    pub name: String,
    pub member_limit: Option<i32>,
    pub is_trial: bool,
    pub trial_member_limit: Option<i32>,
    pub rate_per_member_monthly: Option<Decimal>,
    pub rate_per_member_yearly: Option<Decimal>,
    pub upgrade_rate_monthly: Option<Decimal>,
    pub upgrade_rate_yearly: Option<Decimal>,
    pub is_custom: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Package {
    pub fn kind(&self) -> PackageKind {
        if self.is_trial {
            PackageKind::Trial
        } else if self.is_custom {
            PackageKind::Custom
        } else {
            PackageKind::Standard
        }
    }

    /// A package can be the target of an upgrade only when it is non-trial
    /// and carries at least one upgrade rate.
    pub fn can_upgrade(&self) -> bool {
        if self.is_trial {
            return false;
        }
        self.upgrade_rate_monthly.is_some() || self.upgrade_rate_yearly.is_some()
    }
}

/// Fields accepted when the operator creates or edits a package.
#[derive(Debug, Clone, Deserialize)]
pub struct PackageInput {
    pub name: String,
    pub member_limit: Option<i32>,
    #[serde(default)]
    pub is_trial: bool,
    pub trial_member_limit: Option<i32>,
    pub rate_per_member_monthly: Option<Decimal>,
    pub rate_per_member_yearly: Option<Decimal>,
    pub upgrade_rate_monthly: Option<Decimal>,
    pub upgrade_rate_yearly: Option<Decimal>,
    #[serde(default)]
    pub is_custom: bool,
}

impl PackageInput {
    /// Package invariants:
    /// - trial: no pricing or upgrade rates, positive trial member limit;
    /// - trial and custom are mutually exclusive;
    /// - non-trial: both base rates present;
    /// - standard: positive member limit (custom capacity comes from the
    ///   subscription instead).
    pub fn validate(&self) -> BillingResult<()> {
        if self.name.trim().is_empty() {
            return Err(BillingError::Validation("package name is required".into()));
        }

        if self.is_trial {
            if self.is_custom {
                return Err(BillingError::Validation(
                    "package cannot be both trial and custom".into(),
                ));
            }
            match self.trial_member_limit {
                Some(limit) if limit > 0 => {}
                _ => {
                    return Err(BillingError::Validation(
                        "trial package must have a positive trial_member_limit".into(),
                    ))
                }
            }
            let has_pricing = self.rate_per_member_monthly.is_some()
                || self.rate_per_member_yearly.is_some()
                || self.upgrade_rate_monthly.is_some()
                || self.upgrade_rate_yearly.is_some();
            if has_pricing {
                return Err(BillingError::Validation(
                    "trial package must not have pricing or upgrade rates".into(),
                ));
            }
            return Ok(());
        }

        if self.rate_per_member_monthly.is_none() || self.rate_per_member_yearly.is_none() {
            return Err(BillingError::Validation(
                "base rates are required for non-trial packages".into(),
            ));
        }

        if !self.is_custom {
            match self.member_limit {
                Some(limit) if limit > 0 => {}
                _ => {
                    return Err(BillingError::Validation(
                        "standard package must have a positive member_limit".into(),
                    ))
                }
            }
        }

        Ok(())
    }
}

const PACKAGE_COLUMNS: &str = "id, name, member_limit, is_trial, trial_member_limit, \
     rate_per_member_monthly, rate_per_member_yearly, \
     upgrade_rate_monthly, upgrade_rate_yearly, is_custom, created_at, updated_at";

/// Fetch a package on the caller's connection (usable inside transactions).
pub(crate) async fn fetch_package(
    conn: &mut sqlx::PgConnection,
    id: Uuid,
) -> BillingResult<Package> {
    let package: Option<Package> = sqlx::query_as(&format!(
        "SELECT {PACKAGE_COLUMNS} FROM packages WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(conn)
    .await?;
    package.ok_or_else(|| BillingError::NotFound("package".into()))
}

/// Operator-facing package catalogue service.
pub struct PackageService {
    pool: PgPool,
}

impl PackageService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, input: PackageInput) -> BillingResult<Package> {
        input.validate()?;

        let package: Package = sqlx::query_as(&format!(
            r#"
            INSERT INTO packages (
                name, member_limit, is_trial, trial_member_limit,
                rate_per_member_monthly, rate_per_member_yearly,
                upgrade_rate_monthly, upgrade_rate_yearly, is_custom
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {PACKAGE_COLUMNS}
            "#
        ))
        .bind(&input.name)
        .bind(input.member_limit)
        .bind(input.is_trial)
        .bind(input.trial_member_limit)
        .bind(input.rate_per_member_monthly)
        .bind(input.rate_per_member_yearly)
        .bind(input.upgrade_rate_monthly)
        .bind(input.upgrade_rate_yearly)
        .bind(input.is_custom)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(package_id = %package.id, name = %package.name, "Package created");
        Ok(package)
    }

    pub async fn update(&self, id: Uuid, input: PackageInput) -> BillingResult<Package> {
        input.validate()?;

        let package: Option<Package> = sqlx::query_as(&format!(
            r#"
            UPDATE packages
            SET name = $2,
                member_limit = $3,
                is_trial = $4,
                trial_member_limit = $5,
                rate_per_member_monthly = $6,
                rate_per_member_yearly = $7,
                upgrade_rate_monthly = $8,
                upgrade_rate_yearly = $9,
                is_custom = $10,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {PACKAGE_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&input.name)
        .bind(input.member_limit)
        .bind(input.is_trial)
        .bind(input.trial_member_limit)
        .bind(input.rate_per_member_monthly)
        .bind(input.rate_per_member_yearly)
        .bind(input.upgrade_rate_monthly)
        .bind(input.upgrade_rate_yearly)
        .bind(input.is_custom)
        .fetch_optional(&self.pool)
        .await?;

        let package = package.ok_or_else(|| BillingError::NotFound("package".into()))?;
        tracing::info!(package_id = %package.id, "Package updated");
        Ok(package)
    }

    pub async fn get(&self, id: Uuid) -> BillingResult<Package> {
        let package: Option<Package> = sqlx::query_as(&format!(
            "SELECT {PACKAGE_COLUMNS} FROM packages WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        package.ok_or_else(|| BillingError::NotFound("package".into()))
    }

    pub async fn list(&self) -> BillingResult<Vec<Package>> {
        let packages: Vec<Package> = sqlx::query_as(&format!(
            "SELECT {PACKAGE_COLUMNS} FROM packages ORDER BY is_trial DESC, member_limit NULLS LAST"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(packages)
    }

    /// Delete a package. Blocked while any subscription or upgrade request
    /// still references it; historical bills are unaffected because they
    /// carry their own frozen snapshot.
    pub async fn delete(&self, id: Uuid) -> BillingResult<()> {
        let (references,): (i64,) = sqlx::query_as(
            r#"
            SELECT (SELECT COUNT(*) FROM church_subscriptions WHERE package_id = $1)
                 + (SELECT COUNT(*) FROM upgrade_requests
                    WHERE current_package_id = $1 OR requested_package_id = $1)
            "#,
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;

        if references > 0 {
            return Err(BillingError::StateConflict(
                "package is still referenced by subscriptions or upgrade requests".into(),
            ));
        }

        let result = sqlx::query("DELETE FROM packages WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(BillingError::NotFound("package".into()));
        }

        tracing::info!(package_id = %id, "Package deleted");
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_fixtures {
    use super::*;
    use rust_decimal_macros::dec;

    pub fn base_input() -> PackageInput {
        PackageInput {
            name: "Standard 100".to_string(),
            member_limit: Some(100),
            is_trial: false,
            trial_member_limit: None,
            rate_per_member_monthly: Some(dec!(10.00)),
            rate_per_member_yearly: Some(dec!(5.00)),
            upgrade_rate_monthly: Some(dec!(12.00)),
            upgrade_rate_yearly: Some(dec!(8.00)),
            is_custom: false,
        }
    }

    pub fn package(input: &PackageInput) -> Package {
        let now = OffsetDateTime::UNIX_EPOCH;
        Package {
            id: Uuid::new_v4(),
            name: input.name.clone(),
            member_limit: input.member_limit,
            is_trial: input.is_trial,
            trial_member_limit: input.trial_member_limit,
            rate_per_member_monthly: input.rate_per_member_monthly,
            rate_per_member_yearly: input.rate_per_member_yearly,
            upgrade_rate_monthly: input.upgrade_rate_monthly,
            upgrade_rate_yearly: input.upgrade_rate_yearly,
            is_custom: input.is_custom,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn standard(limit: i32, monthly: Decimal, yearly: Decimal) -> Package {
        let mut input = base_input();
        input.member_limit = Some(limit);
        input.rate_per_member_monthly = Some(monthly);
        input.rate_per_member_yearly = Some(yearly);
        package(&input)
    }

    pub fn trial(limit: i32) -> Package {
        package(&PackageInput {
            name: "Trial".to_string(),
            member_limit: None,
            is_trial: true,
            trial_member_limit: Some(limit),
            rate_per_member_monthly: None,
            rate_per_member_yearly: None,
            upgrade_rate_monthly: None,
            upgrade_rate_yearly: None,
            is_custom: false,
        })
    }

    pub fn custom(monthly: Decimal, yearly: Decimal) -> Package {
        let mut input = base_input();
        input.name = "Custom".to_string();
        input.member_limit = None;
        input.is_custom = true;
        input.rate_per_member_monthly = Some(monthly);
        input.rate_per_member_yearly = Some(yearly);
        package(&input)
    }
}

#[cfg(test)]
mod tests {
    use super::test_fixtures::*;
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_kind_precedence_trial_before_custom() {
        let mut pkg = trial(5);
        // A corrupted row with both flags still dispatches as trial.
        pkg.is_custom = true;
        assert_eq!(pkg.kind(), PackageKind::Trial);
    }

    #[test]
    fn test_kind_for_each_shape() {
        assert_eq!(trial(5).kind(), PackageKind::Trial);
        assert_eq!(custom(dec!(10.00), dec!(5.00)).kind(), PackageKind::Custom);
        assert_eq!(
            standard(100, dec!(10.00), dec!(5.00)).kind(),
            PackageKind::Standard
        );
    }

    #[test]
    fn test_can_upgrade_requires_upgrade_rate() {
        let mut pkg = standard(100, dec!(10.00), dec!(5.00));
        assert!(pkg.can_upgrade());

        pkg.upgrade_rate_monthly = None;
        assert!(pkg.can_upgrade(), "one upgrade rate is enough");

        pkg.upgrade_rate_yearly = None;
        assert!(!pkg.can_upgrade());
    }

    #[test]
    fn test_trial_never_upgradable() {
        let mut pkg = trial(5);
        pkg.upgrade_rate_monthly = Some(dec!(1.00));
        assert!(!pkg.can_upgrade());
    }

    #[test]
    fn test_validate_trial_rejects_pricing() {
        let mut input = base_input();
        input.is_trial = true;
        input.trial_member_limit = Some(5);
        assert!(matches!(
            input.validate(),
            Err(BillingError::Validation(_))
        ));
    }

    #[test]
    fn test_validate_trial_requires_limit() {
        let input = PackageInput {
            name: "Trial".into(),
            member_limit: None,
            is_trial: true,
            trial_member_limit: None,
            rate_per_member_monthly: None,
            rate_per_member_yearly: None,
            upgrade_rate_monthly: None,
            upgrade_rate_yearly: None,
            is_custom: false,
        };
        assert!(input.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_trial_custom_combination() {
        let input = PackageInput {
            name: "Bad".into(),
            member_limit: None,
            is_trial: true,
            trial_member_limit: Some(5),
            rate_per_member_monthly: None,
            rate_per_member_yearly: None,
            upgrade_rate_monthly: None,
            upgrade_rate_yearly: None,
            is_custom: true,
        };
        assert!(input.validate().is_err());
    }

    #[test]
    fn test_validate_standard_requires_limit_and_rates() {
        let mut input = base_input();
        input.member_limit = None;
        assert!(input.validate().is_err());

        let mut input = base_input();
        input.rate_per_member_yearly = None;
        assert!(input.validate().is_err());

        assert!(base_input().validate().is_ok());
    }

    #[test]
    fn test_validate_custom_needs_no_member_limit() {
        let pkg = custom(dec!(10.00), dec!(5.00));
        let input = PackageInput {
            name: pkg.name,
            member_limit: None,
            is_trial: false,
            trial_member_limit: None,
            rate_per_member_monthly: pkg.rate_per_member_monthly,
            rate_per_member_yearly: pkg.rate_per_member_yearly,
            upgrade_rate_monthly: pkg.upgrade_rate_monthly,
            upgrade_rate_yearly: pkg.upgrade_rate_yearly,
            is_custom: true,
        };
        assert!(input.validate().is_ok());
    }
}
