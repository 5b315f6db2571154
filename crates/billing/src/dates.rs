//! Calendar-month date arithmetic
//!
//! All proration and subscription-period math in this platform is
//! month-granular: any started calendar month counts as fully consumed, and
//! `end_date` is always `start_date` plus a whole number of months.

use time::{Date, Month};

/// Add `months` calendar months to a date, clamping the day-of-month to the
/// length of the target month (Jan 31 + 1 month = Feb 28/29).
pub fn add_months(date: Date, months: i32) -> Date {
    let zero_based = (date.year() * 12) + (date.month() as i32 - 1) + months;
    let year = zero_based.div_euclid(12);
    let month_index = zero_based.rem_euclid(12) as u8 + 1;

    // month_index is 1..=12 by construction
    let month = Month::try_from(month_index).unwrap_or(Month::January);
    let last_day = month.length(year);
    let day = date.day().min(last_day);

    Date::from_calendar_date(year, month, day).unwrap_or(date)
}

/// Calendar months elapsed from `start` to `today`, counting the current
/// partial month as consumed. Negative when `start` is in the future; the
/// caller clamps.
pub fn months_elapsed_inclusive(start: Date, today: Date) -> i32 {
    (today.year() - start.year()) * 12 + (today.month() as i32 - start.month() as i32) + 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn test_add_months_simple() {
        assert_eq!(add_months(date!(2025 - 01 - 15), 1), date!(2025 - 02 - 15));
        assert_eq!(add_months(date!(2025 - 01 - 15), 12), date!(2026 - 01 - 15));
        assert_eq!(add_months(date!(2025 - 06 - 01), 0), date!(2025 - 06 - 01));
    }

    #[test]
    fn test_add_months_clamps_to_month_length() {
        assert_eq!(add_months(date!(2025 - 01 - 31), 1), date!(2025 - 02 - 28));
        assert_eq!(add_months(date!(2024 - 01 - 31), 1), date!(2024 - 02 - 29));
        assert_eq!(add_months(date!(2025 - 03 - 31), 1), date!(2025 - 04 - 30));
    }

    #[test]
    fn test_add_months_across_year_boundary() {
        assert_eq!(add_months(date!(2025 - 11 - 20), 3), date!(2026 - 02 - 20));
        assert_eq!(add_months(date!(2025 - 12 - 31), 2), date!(2026 - 02 - 28));
    }

    #[test]
    fn test_add_months_negative() {
        assert_eq!(add_months(date!(2025 - 01 - 15), -1), date!(2024 - 12 - 15));
        assert_eq!(add_months(date!(2025 - 03 - 31), -1), date!(2025 - 02 - 28));
    }

    #[test]
    fn test_months_elapsed_same_month_counts_as_one() {
        assert_eq!(
            months_elapsed_inclusive(date!(2025 - 05 - 01), date!(2025 - 05 - 31)),
            1
        );
        assert_eq!(
            months_elapsed_inclusive(date!(2025 - 05 - 31), date!(2025 - 05 - 01)),
            1
        );
    }

    #[test]
    fn test_months_elapsed_partial_month_counts_as_consumed() {
        // Started Feb 20, today Mar 1: two calendar months touched.
        assert_eq!(
            months_elapsed_inclusive(date!(2025 - 02 - 20), date!(2025 - 03 - 01)),
            2
        );
    }

    #[test]
    fn test_months_elapsed_across_years() {
        assert_eq!(
            months_elapsed_inclusive(date!(2024 - 11 - 10), date!(2025 - 02 - 10)),
            4
        );
    }

    #[test]
    fn test_months_elapsed_future_start_is_negative_or_zero() {
        assert_eq!(
            months_elapsed_inclusive(date!(2025 - 08 - 01), date!(2025 - 06 - 15)),
            -1
        );
        // Next month: (0)*12 + 1 + 1 ... start one month ahead yields 0.
        assert_eq!(
            months_elapsed_inclusive(date!(2025 - 07 - 01), date!(2025 - 06 - 15)),
            0
        );
    }
}
