// Test file - these are expected patterns in test code
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

//! Edge Case Tests for the Billing Engine
//!
//! Tests critical boundary conditions in:
//! - Proration month clamping (BILL-P01 to BILL-P07)
//! - Pricing scenarios (BILL-N01 to BILL-N04)
//! - Breakdown snapshot contract (BILL-B01 to BILL-B03)

#[cfg(test)]
mod proration_clamp_tests {
    use crate::packages::test_fixtures;
    use crate::proration::calculate_upgrade;
    use crate::subscriptions::test_fixtures::yearly_subscription;
    use crate::LineItem;
    use eglise_shared::BillingCycle;
    use rust_decimal_macros::dec;
    use time::macros::date;

    fn target() -> crate::Package {
        let mut pkg = test_fixtures::standard(30, dec!(20.00), dec!(15.00));
        pkg.upgrade_rate_monthly = Some(dec!(9.00));
        pkg.upgrade_rate_yearly = Some(dec!(8.00));
        pkg
    }

    fn months_used_for(start: time::Date, today: time::Date) -> (i32, i32) {
        let current = test_fixtures::standard(20, dec!(10.00), dec!(5.00));
        let sub = yearly_subscription(&current, start);
        let quote =
            calculate_upgrade(&sub, &current, &target(), BillingCycle::Yearly, None, today)
                .unwrap();
        match quote.breakdown.unwrap() {
            LineItem::Upgrade {
                months_used,
                remaining_months,
                ..
            } => (months_used, remaining_months),
            other => panic!("expected upgrade line item, got {:?}", other),
        }
    }

    // =========================================================================
    // BILL-P01: Upgrade on the start date itself - one month consumed
    // =========================================================================
    #[test]
    fn test_upgrade_on_start_date_consumes_one_month() {
        let (used, remaining) = months_used_for(date!(2025 - 03 - 15), date!(2025 - 03 - 15));
        assert_eq!(used, 1);
        assert_eq!(remaining, 11);
    }

    // =========================================================================
    // BILL-P02: Last day of the start month - still one month consumed
    // =========================================================================
    #[test]
    fn test_same_calendar_month_is_single_month() {
        let (used, _) = months_used_for(date!(2025 - 03 - 01), date!(2025 - 03 - 31));
        assert_eq!(used, 1);
    }

    // =========================================================================
    // BILL-P03: First day of the next month - two months consumed
    // =========================================================================
    #[test]
    fn test_month_boundary_consumes_second_month() {
        let (used, remaining) = months_used_for(date!(2025 - 03 - 31), date!(2025 - 04 - 01));
        assert_eq!(used, 2);
        assert_eq!(remaining, 10);
    }

    // =========================================================================
    // BILL-P04: Start far in the past - clamped to the cycle length
    // =========================================================================
    #[test]
    fn test_months_used_clamped_to_cycle_length() {
        let (used, remaining) = months_used_for(date!(2019 - 01 - 01), date!(2025 - 06 - 15));
        assert_eq!(used, 12);
        assert_eq!(remaining, 0);
    }

    // =========================================================================
    // BILL-P05: Start in the future - negative intermediate floors to 1
    // =========================================================================
    #[test]
    fn test_future_start_floors_to_one() {
        let (used, remaining) = months_used_for(date!(2027 - 01 - 01), date!(2025 - 06 - 15));
        assert_eq!(used, 1);
        assert_eq!(remaining, 11);
    }

    // =========================================================================
    // BILL-P06: Year boundary crossing counts calendar months, not days
    // =========================================================================
    #[test]
    fn test_year_boundary_crossing() {
        // Nov 30 → Jan 2 touches Nov, Dec, Jan: three months.
        let (used, remaining) = months_used_for(date!(2024 - 11 - 30), date!(2025 - 01 - 02));
        assert_eq!(used, 3);
        assert_eq!(remaining, 9);
    }

    // =========================================================================
    // BILL-P07: Monthly current cycle - remaining is always zero
    // =========================================================================
    #[test]
    fn test_monthly_cycle_has_no_remaining_value() {
        let current = test_fixtures::standard(20, dec!(10.00), dec!(5.00));
        let mut sub = yearly_subscription(&current, date!(2025 - 06 - 01));
        sub.billing_cycle = "MONTHLY".to_string();
        sub.duration_months = 1;

        let quote = calculate_upgrade(
            &sub,
            &current,
            &target(),
            BillingCycle::Monthly,
            None,
            date!(2025 - 06 - 20),
        )
        .unwrap();

        // One flat month at upgrade pricing, nothing left to bank.
        assert_eq!(quote.amount, dec!(270.00)); // 9.00 × 30
        assert_eq!(quote.credit, dec!(0.00));
    }
}

#[cfg(test)]
mod pricing_scenario_tests {
    use crate::packages::test_fixtures;
    use crate::pricing::calculate_new_bill;
    use eglise_shared::BillingCycle;
    use rust_decimal_macros::dec;

    // =========================================================================
    // BILL-N01: MONTHLY rate=10.00 capacity=50 → 500.00
    // =========================================================================
    #[test]
    fn test_monthly_new_bill_amount() {
        let pkg = test_fixtures::standard(50, dec!(10.00), dec!(5.00));
        assert_eq!(
            calculate_new_bill(&pkg, BillingCycle::Monthly, 50).unwrap(),
            dec!(500.00)
        );
    }

    // =========================================================================
    // BILL-N02: YEARLY rate=5.00 capacity=20 → 1200.00
    // =========================================================================
    #[test]
    fn test_yearly_new_bill_amount() {
        let pkg = test_fixtures::standard(20, dec!(10.00), dec!(5.00));
        assert_eq!(
            calculate_new_bill(&pkg, BillingCycle::Yearly, 20).unwrap(),
            dec!(1200.00)
        );
    }

    // =========================================================================
    // BILL-N03: Trial packages always price to zero
    // =========================================================================
    #[test]
    fn test_trial_prices_to_zero_regardless_of_cycle() {
        let pkg = test_fixtures::trial(5);
        assert_eq!(
            calculate_new_bill(&pkg, BillingCycle::Monthly, 500).unwrap(),
            dec!(0.00)
        );
        assert_eq!(
            calculate_new_bill(&pkg, BillingCycle::Yearly, 500).unwrap(),
            dec!(0.00)
        );
    }

    // =========================================================================
    // BILL-N04: Fractional rates keep two-decimal precision
    // =========================================================================
    #[test]
    fn test_fractional_rate_precision() {
        let pkg = test_fixtures::standard(33, dec!(2.95), dec!(1.05));
        // 2.95 × 33 × 1 = 97.35
        assert_eq!(
            calculate_new_bill(&pkg, BillingCycle::Monthly, 33).unwrap(),
            dec!(97.35)
        );
        // 1.05 × 33 × 12 = 415.80
        assert_eq!(
            calculate_new_bill(&pkg, BillingCycle::Yearly, 33).unwrap(),
            dec!(415.80)
        );
    }
}

#[cfg(test)]
mod breakdown_contract_tests {
    use crate::packages::test_fixtures;
    use crate::proration::calculate_upgrade;
    use crate::subscriptions::test_fixtures::yearly_subscription;
    use crate::{ApplyPayload, Breakdown};
    use eglise_shared::BillingCycle;
    use rust_decimal_macros::dec;
    use time::macros::date;
    use uuid::Uuid;

    // =========================================================================
    // BILL-B01: Upgrade line item serializes with the contract keys
    // =========================================================================
    #[test]
    fn test_upgrade_breakdown_contract_keys() {
        let current = test_fixtures::standard(20, dec!(10.00), dec!(5.00));
        let sub = yearly_subscription(&current, date!(2025 - 01 - 10));
        let mut target = test_fixtures::standard(30, dec!(20.00), dec!(15.00));
        target.upgrade_rate_yearly = Some(dec!(8.00));

        let quote = calculate_upgrade(
            &sub,
            &current,
            &target,
            BillingCycle::Yearly,
            None,
            date!(2025 - 04 - 02),
        )
        .unwrap();

        let value = serde_json::to_value(quote.breakdown.unwrap()).unwrap();
        for key in [
            "type",
            "mode",
            "months_used",
            "members",
            "remaining_months",
            "old_rate",
            "upgrade_rate",
            "old_remaining_value",
            "new_remaining_value",
            "calculation",
            "total",
        ] {
            assert!(value.get(key).is_some(), "missing contract key '{}'", key);
        }
        assert_eq!(value["type"], "UPGRADE");
        assert_eq!(value["mode"], "MONTH_BASED");
    }

    // =========================================================================
    // BILL-B02: A historical snapshot round-trips unchanged
    // =========================================================================
    #[test]
    fn test_historical_snapshot_round_trip() {
        let raw = serde_json::json!({
            "line_items": [{
                "type": "NEW",
                "members": 50,
                "rate": "10.00",
                "months": 12,
                "calculation": "10.00 × 50 × 12",
                "total": "6000.00"
            }],
            "grand_total": "6000.00",
            "credit_generated": "0.00",
            "apply": {
                "package_id": Uuid::new_v4(),
                "billing_cycle": "YEARLY",
                "duration_months": 12,
                "custom_capacity": null
            }
        });

        let breakdown = Breakdown::from_value(raw).unwrap();
        assert_eq!(breakdown.grand_total, dec!(6000.00));
        let apply: &ApplyPayload = breakdown.apply.as_ref().unwrap();
        assert_eq!(apply.duration_months, 12);
        assert_eq!(apply.billing_cycle, BillingCycle::Yearly);
    }

    // =========================================================================
    // BILL-B03: Unreadable snapshots surface as internal errors
    // =========================================================================
    #[test]
    fn test_malformed_snapshot_is_internal_error() {
        let raw = serde_json::json!({ "line_items": "not-a-list" });
        let err = Breakdown::from_value(raw).unwrap_err();
        assert!(matches!(err, crate::BillingError::Internal(_)));
    }
}
