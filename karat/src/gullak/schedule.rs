//! Installment date arithmetic.
//!
//! Weekdays are numbered 0 (Sunday) to 6 (Saturday). Monthly plans pay on a day of the month that
//! is clamped to the last day of shorter months, without drifting: a plan on the 31st pays on
//! 30 April and then on 31 May.

use chrono::{Datelike, Days, Months, NaiveDate};

use crate::db::models::gullak::PaymentFrequency;

/// The installment date following `base`.
///
/// - daily: the next day
/// - weekly: the next `day_of_week` strictly after `base` (one week later when unset)
/// - monthly: `day_of_month` in the following month (the same day as `base` when unset), clamped to
///   that month's length
pub fn next_payment_date(
    frequency: PaymentFrequency,
    base: NaiveDate,
    day_of_week: Option<i16>,
    day_of_month: Option<i16>,
) -> NaiveDate {
    match frequency {
        PaymentFrequency::Daily => base + Days::new(1),
        PaymentFrequency::Weekly => next_weekday_after(base, day_of_week),
        PaymentFrequency::Monthly => {
            let day = day_of_month.map(|d| d.clamp(1, 31) as u32).unwrap_or(base.day());
            day_in_month(first_of_month(base) + Months::new(1), day)
        }
    }
}

/// First installment date for a plan created on `today`. Never `today` itself.
pub fn first_payment_date(
    frequency: PaymentFrequency,
    today: NaiveDate,
    day_of_week: Option<i16>,
    day_of_month: Option<i16>,
) -> NaiveDate {
    match frequency {
        PaymentFrequency::Monthly => {
            let day = day_of_month.map(|d| d.clamp(1, 31) as u32).unwrap_or(today.day());
            let this_month = day_in_month(first_of_month(today), day);
            if this_month > today {
                this_month
            } else {
                next_payment_date(frequency, today, day_of_week, day_of_month)
            }
        }
        _ => next_payment_date(frequency, today, day_of_week, day_of_month),
    }
}

/// Advance a schedule past `today`. Used after a contribution so that an account that fell
/// behind is charged once and then resumes its regular cadence.
pub fn next_payment_after(
    frequency: PaymentFrequency,
    scheduled: NaiveDate,
    today: NaiveDate,
    day_of_week: Option<i16>,
    day_of_month: Option<i16>,
) -> NaiveDate {
    let mut next = next_payment_date(frequency, scheduled, day_of_week, day_of_month);
    while next <= today {
        next = next_payment_date(frequency, next, day_of_week, day_of_month);
    }
    next
}

fn next_weekday_after(base: NaiveDate, day_of_week: Option<i16>) -> NaiveDate {
    let Some(target) = day_of_week else {
        return base + Days::new(7);
    };

    let current = base.weekday().num_days_from_sunday() as i64;
    let target = i64::from(target.rem_euclid(7));
    let delta = match (target - current).rem_euclid(7) {
        0 => 7,
        d => d,
    };
    base + Days::new(delta as u64)
}

fn first_of_month(date: NaiveDate) -> NaiveDate {
    date - Days::new(u64::from(date.day0()))
}

/// `day` within the month starting at `first`, clamped to the month's last day.
fn day_in_month(first: NaiveDate, day: u32) -> NaiveDate {
    let last_day = (first + Months::new(1) - Days::new(1)).day();
    first + Days::new(u64::from(day.min(last_day) - 1))
}
