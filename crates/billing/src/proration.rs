//! Mid-cycle upgrade proration
//!
//! Month-based proration only: any started calendar month of the current
//! plan counts as fully consumed, and there is no day-level math anywhere.
//!
//! The old plan's unused value is priced at the base rate for a
//! first-purchase subscription and at the current package's upgrade rate
//! once the subscription has been upgraded before (`pricing_origin`). The
//! new plan is always priced at the target package's upgrade rate.
//!
//! Target-cycle asymmetry, kept exactly as the business defined it:
//! - MONTHLY target: the charge is one fresh month at upgrade pricing and
//!   the old plan's unused value is banked as credit;
//! - YEARLY target: the old value is netted directly into the charge
//!   (floored at zero) and no credit is banked.

use rust_decimal::Decimal;
use time::Date;

use eglise_shared::{BillingCycle, PricingOrigin};

use crate::breakdown::{LineItem, MODE_MONTH_BASED};
use crate::dates::months_elapsed_inclusive;
use crate::error::{BillingError, BillingResult};
use crate::packages::Package;
use crate::pricing::{require_rate, resolve_package_capacity, RateKind};
use crate::subscriptions::ChurchSubscription;

/// Result of an upgrade computation.
///
/// A zero quote (amount 0, credit 0, no breakdown) is a deliberate
/// null-object for subscriptions that cannot be prorated (trial, no start
/// date); callers short-circuit on it rather than treating it as an error.
#[derive(Debug, Clone, PartialEq)]
pub struct UpgradeQuote {
    pub amount: Decimal,
    pub credit: Decimal,
    pub breakdown: Option<LineItem>,
}

impl UpgradeQuote {
    pub fn zero() -> Self {
        Self {
            amount: Decimal::ZERO.round_dp(2),
            credit: Decimal::ZERO.round_dp(2),
            breakdown: None,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.breakdown.is_none()
    }
}

/// Compute the prorated charge and credit for upgrading `subscription` to
/// `target_package` on `target_cycle`.
///
/// `today` is injected so the calendar arithmetic is deterministic under
/// test; services pass the current UTC date.
pub fn calculate_upgrade(
    subscription: &ChurchSubscription,
    current_package: &Package,
    target_package: &Package,
    target_cycle: BillingCycle,
    target_capacity: Option<i32>,
    today: Date,
) -> BillingResult<UpgradeQuote> {
    if target_cycle == BillingCycle::Trial {
        return Err(BillingError::Validation(
            "target billing_cycle must be MONTHLY or YEARLY".into(),
        ));
    }

    let current_cycle = subscription.cycle()?;
    if current_package.is_trial || current_cycle == BillingCycle::Trial {
        return Ok(UpgradeQuote::zero());
    }

    let Some(start) = subscription.start_date else {
        return Ok(UpgradeQuote::zero());
    };

    let total_months = current_cycle.months();

    // Calendar-based consumption, clamped to [1, total]. A start date in
    // the future yields a negative intermediate and floors to 1; this
    // mirrors the historical behavior and is intentionally not rejected.
    let months_used = months_elapsed_inclusive(start, today).clamp(1, total_months);
    let remaining_months = (total_months - months_used).max(0);

    let old_rate_kind = match subscription.origin()? {
        PricingOrigin::Base => RateKind::Base,
        PricingOrigin::Upgrade => RateKind::Upgrade,
    };
    let old_rate = require_rate(current_package, current_cycle, old_rate_kind)?;
    let old_capacity = subscription.resolved_capacity(current_package)?;

    let old_remaining_value =
        (old_rate * Decimal::from(old_capacity) * Decimal::from(remaining_months)).round_dp(2);

    // The target's upgrade rate is mandatory: a package without one cannot
    // be an upgrade target.
    let upgrade_rate = require_rate(target_package, target_cycle, RateKind::Upgrade)?;
    let new_capacity = resolve_package_capacity(target_package, target_capacity)?;

    if target_cycle == BillingCycle::Monthly {
        // Switching to monthly resets the billing clock: one flat month at
        // upgrade pricing, unused old value banked for later use.
        let monthly_amount = (upgrade_rate * Decimal::from(new_capacity)).round_dp(2);

        return Ok(UpgradeQuote {
            amount: monthly_amount,
            credit: old_remaining_value,
            breakdown: Some(LineItem::Upgrade {
                mode: MODE_MONTH_BASED.to_string(),
                months_used,
                members: new_capacity,
                remaining_months,
                old_rate,
                upgrade_rate,
                old_remaining_value,
                new_remaining_value: None,
                calculation: format!(
                    "{} × {} members for 1 month",
                    upgrade_rate, new_capacity
                ),
                total: monthly_amount,
            }),
        });
    }

    let new_remaining_value =
        (upgrade_rate * Decimal::from(new_capacity) * Decimal::from(remaining_months)).round_dp(2);

    let amount_to_pay = (new_remaining_value - old_remaining_value)
        .round_dp(2)
        .max(Decimal::ZERO.round_dp(2));

    Ok(UpgradeQuote {
        amount: amount_to_pay,
        credit: Decimal::ZERO.round_dp(2),
        breakdown: Some(LineItem::Upgrade {
            mode: MODE_MONTH_BASED.to_string(),
            months_used,
            members: new_capacity,
            remaining_months,
            old_rate,
            upgrade_rate,
            old_remaining_value,
            new_remaining_value: Some(new_remaining_value),
            calculation: format!(
                "({} × {} × {}) − ({} × {} × {})",
                upgrade_rate, new_capacity, remaining_months, old_rate, old_capacity,
                remaining_months
            ),
            total: amount_to_pay,
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packages::test_fixtures;
    use crate::subscriptions::test_fixtures::yearly_subscription;
    use rust_decimal_macros::dec;
    use time::macros::date;

    fn upgrade_target(monthly: Decimal, yearly: Decimal) -> Package {
        let mut pkg = test_fixtures::standard(30, dec!(20.00), dec!(15.00));
        pkg.upgrade_rate_monthly = Some(monthly);
        pkg.upgrade_rate_yearly = Some(yearly);
        pkg
    }

    #[test]
    fn test_yearly_target_nets_old_value() {
        // Yearly sub at base 5.00 × 20, started Jan, today April:
        // months_used = 4, remaining = 8, old value = 800.00.
        // Target yearly upgrade 8.00 × 30 × 8 = 1920.00 → pay 1120.00.
        let current = test_fixtures::standard(20, dec!(10.00), dec!(5.00));
        let sub = yearly_subscription(&current, date!(2025 - 01 - 10));
        let target = upgrade_target(dec!(9.00), dec!(8.00));

        let quote = calculate_upgrade(
            &sub,
            &current,
            &target,
            BillingCycle::Yearly,
            None,
            date!(2025 - 04 - 02),
        )
        .unwrap();

        assert_eq!(quote.amount, dec!(1120.00));
        assert_eq!(quote.credit, dec!(0.00));
        match quote.breakdown.unwrap() {
            LineItem::Upgrade {
                months_used,
                remaining_months,
                old_remaining_value,
                new_remaining_value,
                ..
            } => {
                assert_eq!(months_used, 4);
                assert_eq!(remaining_months, 8);
                assert_eq!(old_remaining_value, dec!(800.00));
                assert_eq!(new_remaining_value, Some(dec!(1920.00)));
            }
            other => panic!("expected upgrade line item, got {:?}", other),
        }
    }

    #[test]
    fn test_monthly_target_banks_credit() {
        // Same subscription, monthly target 9.00 × 25: flat 225.00 and the
        // 800.00 of unused value becomes credit instead of a discount.
        let current = test_fixtures::standard(20, dec!(10.00), dec!(5.00));
        let sub = yearly_subscription(&current, date!(2025 - 01 - 10));
        let mut target = upgrade_target(dec!(9.00), dec!(8.00));
        target.member_limit = Some(25);

        let quote = calculate_upgrade(
            &sub,
            &current,
            &target,
            BillingCycle::Monthly,
            None,
            date!(2025 - 04 - 02),
        )
        .unwrap();

        assert_eq!(quote.amount, dec!(225.00));
        assert_eq!(quote.credit, dec!(800.00));
        match quote.breakdown.unwrap() {
            LineItem::Upgrade {
                new_remaining_value,
                total,
                ..
            } => {
                assert_eq!(new_remaining_value, None);
                assert_eq!(total, dec!(225.00));
            }
            other => panic!("expected upgrade line item, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_upgrade_rate_is_configuration_error() {
        let current = test_fixtures::standard(20, dec!(10.00), dec!(5.00));
        let sub = yearly_subscription(&current, date!(2025 - 01 - 10));
        let mut target = upgrade_target(dec!(9.00), dec!(8.00));
        target.upgrade_rate_yearly = None;

        let err = calculate_upgrade(
            &sub,
            &current,
            &target,
            BillingCycle::Yearly,
            None,
            date!(2025 - 04 - 02),
        )
        .unwrap_err();
        assert!(matches!(err, BillingError::Configuration(_)));
    }

    #[test]
    fn test_trial_subscription_yields_zero_quote() {
        let current = test_fixtures::trial(5);
        let mut sub = yearly_subscription(&current, date!(2025 - 01 - 10));
        sub.billing_cycle = "TRIAL".to_string();
        let target = upgrade_target(dec!(9.00), dec!(8.00));

        let quote = calculate_upgrade(
            &sub,
            &current,
            &target,
            BillingCycle::Yearly,
            None,
            date!(2025 - 04 - 02),
        )
        .unwrap();
        assert!(quote.is_zero());
        assert_eq!(quote.amount, dec!(0.00));
    }

    #[test]
    fn test_missing_start_date_yields_zero_quote() {
        let current = test_fixtures::standard(20, dec!(10.00), dec!(5.00));
        let mut sub = yearly_subscription(&current, date!(2025 - 01 - 10));
        sub.start_date = None;
        let target = upgrade_target(dec!(9.00), dec!(8.00));

        let quote = calculate_upgrade(
            &sub,
            &current,
            &target,
            BillingCycle::Yearly,
            None,
            date!(2025 - 04 - 02),
        )
        .unwrap();
        assert!(quote.is_zero());
    }

    #[test]
    fn test_future_start_date_clamps_to_one_month_used() {
        let current = test_fixtures::standard(20, dec!(10.00), dec!(5.00));
        let sub = yearly_subscription(&current, date!(2026 - 01 - 01));
        let target = upgrade_target(dec!(9.00), dec!(8.00));

        let quote = calculate_upgrade(
            &sub,
            &current,
            &target,
            BillingCycle::Yearly,
            None,
            date!(2025 - 06 - 15),
        )
        .unwrap();

        match quote.breakdown.unwrap() {
            LineItem::Upgrade {
                months_used,
                remaining_months,
                ..
            } => {
                assert_eq!(months_used, 1);
                assert_eq!(remaining_months, 11);
            }
            other => panic!("expected upgrade line item, got {:?}", other),
        }
    }

    #[test]
    fn test_long_expired_subscription_clamps_to_total_months() {
        let current = test_fixtures::standard(20, dec!(10.00), dec!(5.00));
        let sub = yearly_subscription(&current, date!(2020 - 01 - 01));
        let target = upgrade_target(dec!(9.00), dec!(8.00));

        let quote = calculate_upgrade(
            &sub,
            &current,
            &target,
            BillingCycle::Yearly,
            None,
            date!(2025 - 06 - 15),
        )
        .unwrap();

        // Nothing remains of the old plan and nothing remains to charge
        // for: the quote collapses to zero and the caller rejects it as
        // "no payable amount".
        assert_eq!(quote.amount, dec!(0.00));
        match quote.breakdown.unwrap() {
            LineItem::Upgrade {
                months_used,
                remaining_months,
                old_remaining_value,
                ..
            } => {
                assert_eq!(months_used, 12);
                assert_eq!(remaining_months, 0);
                assert_eq!(old_remaining_value, dec!(0.00));
            }
            other => panic!("expected upgrade line item, got {:?}", other),
        }
    }

    #[test]
    fn test_upgrade_origin_prices_old_plan_at_upgrade_rate() {
        let current = test_fixtures::standard(20, dec!(10.00), dec!(5.00));
        let mut sub = yearly_subscription(&current, date!(2025 - 01 - 10));
        sub.pricing_origin = "UPGRADE".to_string();
        let target = upgrade_target(dec!(9.00), dec!(10.00));

        let quote = calculate_upgrade(
            &sub,
            &current,
            &target,
            BillingCycle::Yearly,
            None,
            date!(2025 - 04 - 02),
        )
        .unwrap();

        // Old value now uses the current package's yearly *upgrade* rate
        // (8.00): 8 × 20 × 8 = 1280.00; new = 10 × 30 × 8 = 2400.00.
        assert_eq!(quote.amount, dec!(1120.00));
        match quote.breakdown.unwrap() {
            LineItem::Upgrade {
                old_rate,
                old_remaining_value,
                ..
            } => {
                assert_eq!(old_rate, dec!(8.00));
                assert_eq!(old_remaining_value, dec!(1280.00));
            }
            other => panic!("expected upgrade line item, got {:?}", other),
        }
    }

    #[test]
    fn test_custom_target_requires_capacity() {
        let current = test_fixtures::standard(20, dec!(10.00), dec!(5.00));
        let sub = yearly_subscription(&current, date!(2025 - 01 - 10));
        let mut target = test_fixtures::custom(dec!(20.00), dec!(15.00));
        target.upgrade_rate_yearly = Some(dec!(8.00));

        let err = calculate_upgrade(
            &sub,
            &current,
            &target,
            BillingCycle::Yearly,
            None,
            date!(2025 - 04 - 02),
        )
        .unwrap_err();
        assert!(matches!(err, BillingError::Validation(_)));

        let quote = calculate_upgrade(
            &sub,
            &current,
            &target,
            BillingCycle::Yearly,
            Some(40),
            date!(2025 - 04 - 02),
        )
        .unwrap();
        // 8 × 40 × 8 = 2560 − 800 = 1760.00
        assert_eq!(quote.amount, dec!(1760.00));
    }

    #[test]
    fn test_yearly_amount_floors_at_zero() {
        // Downgrade-shaped "upgrade": cheaper target than remaining value.
        let current = test_fixtures::standard(100, dec!(10.00), dec!(5.00));
        let sub = yearly_subscription(&current, date!(2025 - 01 - 10));
        let mut target = upgrade_target(dec!(1.00), dec!(1.00));
        target.member_limit = Some(10);

        let quote = calculate_upgrade(
            &sub,
            &current,
            &target,
            BillingCycle::Yearly,
            None,
            date!(2025 - 04 - 02),
        )
        .unwrap();
        assert_eq!(quote.amount, dec!(0.00));
        assert_eq!(quote.credit, dec!(0.00));
    }
}
