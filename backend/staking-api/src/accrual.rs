//! Yield arithmetic.
//!
//! Interest is simple (non-compounding) and linear: a monthly percentage
//! spread over 30-day months and paid per whole elapsed day. Everything
//! here is pure so it can be exercised without a database.
//!
//! ## Rebasing
//!
//! An investment accrues from its *base* instant: the start date, or the
//! last time earned interest was folded into `accumulated` (a rebase).
//! Rebasing happens before every principal or rate change, so a day is
//! always rated with the principal and rate that applied on that day.
//! A rebase only moves the base by whole days: the started day is rated
//! once, at the next rebase or valuation.
//!
//! ## Deferred upgrades
//!
//! A package change does not take effect immediately. The new rate is
//! parked as a [`PendingRate`] that activates on the next activation date
//! (the 15th or the 30th, the last day of February). Until then the old
//! rate applies; afterwards the period is split at the last whole-day
//! boundary (counted from the base) at or before the activation instant.

use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, Utc};

use crate::packages::DAYS_PER_MONTH;

const SECONDS_PER_DAY: i64 = 86_400;

/// Mid-month activation day.
pub const MID_MONTH_ACTIVATION_DAY: u32 = 15;

/// End-of-month activation day outside February.
pub const END_OF_MONTH_ACTIVATION_DAY: u32 = 30;

/// A rate change waiting for its activation date.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingRate {
    pub rate: f64,
    pub activates_at: DateTime<Utc>,
}

/// Everything needed to value an investment at an instant.
#[derive(Debug, Clone, PartialEq)]
pub struct Accrual {
    pub amount: f64,
    pub rate: f64,
    pub accumulated: f64,
    pub base: DateTime<Utc>,
    pub maturity: Option<DateTime<Utc>>,
    pub pending: Option<PendingRate>,
}

/// Whole days from `from` to `to`, floored; zero when `to` precedes `from`.
pub fn days_between(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    let secs = (to - from).num_seconds();
    if secs <= 0 {
        0
    } else {
        secs / SECONDS_PER_DAY
    }
}

/// `from` moved forward by the whole days elapsed until `to`.
pub fn whole_days_after(from: DateTime<Utc>, to: DateTime<Utc>) -> DateTime<Utc> {
    from + Duration::days(days_between(from, to))
}

/// Days left until `end`, rounded up; zero once `end` has passed.
pub fn days_remaining(end: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let secs = (end - now).num_seconds();
    if secs <= 0 {
        0
    } else {
        (secs + SECONDS_PER_DAY - 1) / SECONDS_PER_DAY
    }
}

/// Interest earned by `amount` at `monthly_rate` percent over `days`.
pub fn daily_interest(amount: f64, monthly_rate: f64, days: i64) -> f64 {
    amount * (monthly_rate / DAYS_PER_MONTH) * days as f64 / 100.0
}

/// Full-term profit quoted when an investment is created.
pub fn expected_profit(amount: f64, monthly_rate: f64, months: u32) -> f64 {
    amount * monthly_rate * f64::from(months) / 100.0
}

pub fn add_months(at: DateTime<Utc>, months: u32) -> Option<DateTime<Utc>> {
    at.checked_add_months(Months::new(months))
}

fn last_activation_day(year: i32, month: u32) -> u32 {
    if month == 2 {
        if NaiveDate::from_ymd_opt(year, 2, 29).is_some() {
            29
        } else {
            28
        }
    } else {
        END_OF_MONTH_ACTIVATION_DAY
    }
}

/// First activation instant strictly governed by the calendar rule:
/// before the 15th → the 15th; before the month's last activation day →
/// that day; otherwise the 15th of the next month. Always midnight UTC.
pub fn next_activation_date(at: DateTime<Utc>) -> DateTime<Utc> {
    let (year, month, day) = (at.year(), at.month(), at.day());
    let last = last_activation_day(year, month);

    let (y, m, d) = if day < MID_MONTH_ACTIVATION_DAY {
        (year, month, MID_MONTH_ACTIVATION_DAY)
    } else if day < last {
        (year, month, last)
    } else if month == 12 {
        (year + 1, 1, MID_MONTH_ACTIVATION_DAY)
    } else {
        (year, month + 1, MID_MONTH_ACTIVATION_DAY)
    };

    NaiveDate::from_ymd_opt(y, m, d)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .unwrap_or(at)
}

/// Days from `at` until the next activation date, rounded up.
pub fn days_until_activation(at: DateTime<Utc>) -> i64 {
    days_remaining(next_activation_date(at), at)
}

impl Accrual {
    fn cap(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        match self.maturity {
            Some(end) if at > end => end,
            _ => at,
        }
    }

    /// Instant where the old rate stops, if a pending rate is active at `at`.
    fn split_point(&self, at: DateTime<Utc>) -> Option<(DateTime<Utc>, f64)> {
        self.pending
            .filter(|p| at >= p.activates_at)
            .map(|p| (whole_days_after(self.base, p.activates_at), p.rate))
    }

    /// Total interest earned as of `at` (capped at maturity), including
    /// everything already folded into `accumulated`.
    pub fn accrued(&self, at: DateTime<Utc>) -> f64 {
        let at = self.cap(at);
        let earned = match self.split_point(at) {
            Some((split, new_rate)) => {
                daily_interest(self.amount, self.rate, days_between(self.base, split))
                    + daily_interest(self.amount, new_rate, days_between(split, at))
            }
            None => daily_interest(self.amount, self.rate, days_between(self.base, at)),
        };
        (self.accumulated + earned).max(0.0)
    }

    /// Interest earned under the current rate only, from the base up to the
    /// pending activation date. Used when a pending rate is activated.
    pub fn accrued_before_activation(&self) -> Option<f64> {
        let pending = self.pending?;
        let split = whole_days_after(self.base, self.cap(pending.activates_at));
        Some(self.accumulated + daily_interest(self.amount, self.rate, days_between(self.base, split)))
    }

    /// Latest instant, not after `at`, up to which every day has been
    /// rated. Rebasing there keeps the started day for later.
    pub fn rated_until(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        let at = self.cap(at);
        let anchor = self.split_point(at).map_or(self.base, |(split, _)| split);
        whole_days_after(anchor, at)
    }

    /// Interest that will have been earned at maturity.
    pub fn projected(&self) -> f64 {
        match self.maturity {
            Some(end) => self.accrued(end),
            None => self.accumulated,
        }
    }

    /// Rate that will apply from `at` on.
    pub fn rate_at(&self, at: DateTime<Utc>) -> f64 {
        match self.pending {
            Some(p) if at >= p.activates_at => p.rate,
            _ => self.rate,
        }
    }
}

/// Profit that can still be withdrawn or reinvested.
pub fn available_profit(accrued: f64, withdrawn: f64) -> f64 {
    (accrued - withdrawn).max(0.0)
}

/// Round to cents for presentation.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
