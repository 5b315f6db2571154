//! Rate and capacity resolution, flat bill pricing
//!
//! Pure arithmetic: no storage access. Everything here returns explicit
//! errors instead of defaulting a missing rate to zero; a package without
//! the rate a computation needs is an operator configuration mistake, not a
//! free tier.

use rust_decimal::Decimal;
use serde::Serialize;

use eglise_shared::BillingCycle;

use crate::error::{BillingError, BillingResult};
use crate::packages::{Package, PackageKind};

/// Which rate column applies: the base purchase rate or the rate charged
/// when the package is the target of an upgrade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateKind {
    Base,
    Upgrade,
}

/// Resolve the per-member rate for a package and cycle. `None` means the
/// rate is not configured; callers that need it use [`require_rate`].
pub fn resolve_rate(package: &Package, cycle: BillingCycle, kind: RateKind) -> Option<Decimal> {
    match (cycle, kind) {
        (BillingCycle::Monthly, RateKind::Base) => package.rate_per_member_monthly,
        (BillingCycle::Monthly, RateKind::Upgrade) => package.upgrade_rate_monthly,
        (BillingCycle::Yearly, RateKind::Base) => package.rate_per_member_yearly,
        (BillingCycle::Yearly, RateKind::Upgrade) => package.upgrade_rate_yearly,
        (BillingCycle::Trial, _) => None,
    }
}

/// Resolve a rate that the computation cannot proceed without.
pub fn require_rate(
    package: &Package,
    cycle: BillingCycle,
    kind: RateKind,
) -> BillingResult<Decimal> {
    resolve_rate(package, cycle, kind).ok_or_else(|| {
        let which = match kind {
            RateKind::Base => "rate",
            RateKind::Upgrade => "upgrade rate",
        };
        BillingError::Configuration(format!(
            "{} {} not configured for package '{}'",
            cycle, which, package.name
        ))
    })
}

/// Resolve the billable member capacity of a package.
///
/// Custom packages must be accompanied by a positive capacity; for standard
/// packages the member limit applies and any supplied capacity is ignored
/// here (callers reject it at input validation). Trial packages resolve to
/// their trial allowance.
pub fn resolve_package_capacity(
    package: &Package,
    custom_capacity: Option<i32>,
) -> BillingResult<i32> {
    match package.kind() {
        PackageKind::Trial => package.trial_member_limit.ok_or_else(|| {
            BillingError::Configuration(format!(
                "trial package '{}' has no trial_member_limit",
                package.name
            ))
        }),
        PackageKind::Custom => match custom_capacity {
            Some(capacity) if capacity > 0 => Ok(capacity),
            _ => Err(BillingError::Validation(
                "custom_capacity required for custom package".into(),
            )),
        },
        PackageKind::Standard => package.member_limit.ok_or_else(|| {
            BillingError::Configuration(format!(
                "standard package '{}' has no member_limit",
                package.name
            ))
        }),
    }
}

/// Flat amount for a NEW or RENEW bill: base rate × capacity × cycle months.
/// Trial packages always price to zero.
pub fn calculate_new_bill(
    package: &Package,
    cycle: BillingCycle,
    capacity: i32,
) -> BillingResult<Decimal> {
    if package.is_trial {
        return Ok(Decimal::ZERO.round_dp(2));
    }

    if cycle == BillingCycle::Trial {
        return Err(BillingError::Validation(
            "billing_cycle must be MONTHLY or YEARLY for a paid package".into(),
        ));
    }

    let rate = require_rate(package, cycle, RateKind::Base)?;
    let months = cycle.months();

    Ok((rate * Decimal::from(capacity) * Decimal::from(months)).round_dp(2))
}

/// Display-only pricing summary for a package/cycle pair. Never used for
/// billing; returns `None` for trial packages.
#[derive(Debug, Clone, Serialize)]
pub struct PricingPreview {
    pub billing_cycle: BillingCycle,
    pub months: i32,
    pub rate: Decimal,
    pub capacity: Option<i32>,
    pub monthly: Decimal,
    pub total: Decimal,
}

pub fn calculate_package_pricing(
    package: &Package,
    cycle: BillingCycle,
) -> BillingResult<Option<PricingPreview>> {
    if package.is_trial || cycle == BillingCycle::Trial {
        return Ok(None);
    }

    let months = cycle.months();
    let rate = require_rate(package, cycle, RateKind::Base)?;
    let capacity = if package.is_custom {
        None
    } else {
        package.member_limit
    };

    let monthly = rate * Decimal::from(capacity.unwrap_or(1));

    Ok(Some(PricingPreview {
        billing_cycle: cycle,
        months,
        rate,
        capacity,
        monthly,
        total: (monthly * Decimal::from(months)).round_dp(2),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packages::test_fixtures;
    use rust_decimal_macros::dec;

    #[test]
    fn test_resolve_rate_picks_cycle_and_kind() {
        let pkg = test_fixtures::standard(100, dec!(10.00), dec!(5.00));
        assert_eq!(
            resolve_rate(&pkg, BillingCycle::Monthly, RateKind::Base),
            Some(dec!(10.00))
        );
        assert_eq!(
            resolve_rate(&pkg, BillingCycle::Yearly, RateKind::Base),
            Some(dec!(5.00))
        );
        assert_eq!(
            resolve_rate(&pkg, BillingCycle::Monthly, RateKind::Upgrade),
            Some(dec!(12.00))
        );
        assert_eq!(
            resolve_rate(&pkg, BillingCycle::Yearly, RateKind::Upgrade),
            Some(dec!(8.00))
        );
    }

    #[test]
    fn test_require_rate_missing_is_configuration_error() {
        let mut pkg = test_fixtures::standard(100, dec!(10.00), dec!(5.00));
        pkg.upgrade_rate_yearly = None;
        let err = require_rate(&pkg, BillingCycle::Yearly, RateKind::Upgrade).unwrap_err();
        assert!(matches!(err, BillingError::Configuration(_)));
    }

    #[test]
    fn test_capacity_standard_uses_member_limit() {
        let pkg = test_fixtures::standard(100, dec!(10.00), dec!(5.00));
        assert_eq!(resolve_package_capacity(&pkg, None).unwrap(), 100);
        // A stray capacity on a standard package is ignored at this layer.
        assert_eq!(resolve_package_capacity(&pkg, Some(7)).unwrap(), 100);
    }

    #[test]
    fn test_capacity_custom_requires_positive_value() {
        let pkg = test_fixtures::custom(dec!(10.00), dec!(5.00));
        assert_eq!(resolve_package_capacity(&pkg, Some(40)).unwrap(), 40);
        assert!(matches!(
            resolve_package_capacity(&pkg, None),
            Err(BillingError::Validation(_))
        ));
        assert!(matches!(
            resolve_package_capacity(&pkg, Some(0)),
            Err(BillingError::Validation(_))
        ));
    }

    #[test]
    fn test_capacity_trial_uses_trial_allowance() {
        let pkg = test_fixtures::trial(5);
        assert_eq!(resolve_package_capacity(&pkg, None).unwrap(), 5);
    }

    #[test]
    fn test_new_bill_monthly() {
        // rate=10.00, capacity=50, MONTHLY → 500.00
        let pkg = test_fixtures::standard(50, dec!(10.00), dec!(5.00));
        let amount = calculate_new_bill(&pkg, BillingCycle::Monthly, 50).unwrap();
        assert_eq!(amount, dec!(500.00));
    }

    #[test]
    fn test_new_bill_yearly() {
        // rate=5.00, capacity=20, YEARLY → 5 × 20 × 12 = 1200.00
        let pkg = test_fixtures::standard(20, dec!(10.00), dec!(5.00));
        let amount = calculate_new_bill(&pkg, BillingCycle::Yearly, 20).unwrap();
        assert_eq!(amount, dec!(1200.00));
    }

    #[test]
    fn test_new_bill_trial_is_zero() {
        let pkg = test_fixtures::trial(5);
        assert_eq!(
            calculate_new_bill(&pkg, BillingCycle::Monthly, 5).unwrap(),
            dec!(0.00)
        );
    }

    #[test]
    fn test_new_bill_missing_rate_fails() {
        let mut pkg = test_fixtures::standard(50, dec!(10.00), dec!(5.00));
        pkg.rate_per_member_yearly = None;
        assert!(matches!(
            calculate_new_bill(&pkg, BillingCycle::Yearly, 50),
            Err(BillingError::Configuration(_))
        ));
    }

    #[test]
    fn test_pricing_preview_skips_trial() {
        let pkg = test_fixtures::trial(5);
        assert!(calculate_package_pricing(&pkg, BillingCycle::Monthly)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_pricing_preview_yearly_totals() {
        let pkg = test_fixtures::standard(20, dec!(10.00), dec!(5.00));
        let preview = calculate_package_pricing(&pkg, BillingCycle::Yearly)
            .unwrap()
            .unwrap();
        assert_eq!(preview.months, 12);
        assert_eq!(preview.rate, dec!(5.00));
        assert_eq!(preview.capacity, Some(20));
        assert_eq!(preview.monthly, dec!(100.00));
        assert_eq!(preview.total, dec!(1200.00));
    }
}
