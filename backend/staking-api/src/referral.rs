//! Referral commission rules.
//!
//! A referrer earns a percentage of every investment made by the users they
//! invited (level 1) and a flat percentage on investments made by those
//! users' own invitees (level 2). Earnings stay locked until the referred
//! investment has run for [`REQUIRED_DAYS`] and only while it is active.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::accrual::days_between;
use crate::models::{instant, EarningWithSource, InvestmentStatus};

/// Days a referred investment must have been running before its
/// commission can be withdrawn.
pub const REQUIRED_DAYS: i64 = 31;

/// Flat level-2 commission in percent.
pub const LEVEL_TWO_PERCENT: f64 = 3.0;

/// Level-1 percent for the `position`-th referral (1-based, by join order).
pub fn level_one_percent(position: i64) -> f64 {
    match position {
        i64::MIN..=1 => 3.0,
        2..=3 => 4.0,
        4..=5 => 5.0,
        6..=9 => 6.0,
        _ => 7.0,
    }
}

pub fn commission(amount: f64, percent: f64) -> f64 {
    amount * percent / 100.0
}

/// Why an earning cannot be withdrawn yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Lock {
    Withdrawn,
    InvestmentInactive,
    Maturing { days_left: i64 },
}

pub fn lock_of(earning: &EarningWithSource, now: DateTime<Utc>) -> Option<Lock> {
    if earning.withdrawn {
        return Some(Lock::Withdrawn);
    }
    if earning.investment_status != InvestmentStatus::Active {
        return Some(Lock::InvestmentInactive);
    }
    let Some(start) = earning.investment_start.map(instant) else {
        return Some(Lock::InvestmentInactive);
    };
    let days = days_between(start, now);
    if days < REQUIRED_DAYS {
        return Some(Lock::Maturing {
            days_left: REQUIRED_DAYS - days,
        });
    }
    None
}

pub fn is_available(earning: &EarningWithSource, now: DateTime<Utc>) -> bool {
    lock_of(earning, now).is_none()
}

/// Totals shown on the referral dashboard.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Summary {
    pub total_earned: f64,
    pub available: f64,
    pub locked: f64,
    pub withdrawn: f64,
    pub available_count: usize,
}

pub fn summarize(earnings: &[EarningWithSource], now: DateTime<Utc>) -> Summary {
    earnings.iter().fold(Summary::default(), |mut s, e| {
        s.total_earned += e.amount;
        match lock_of(e, now) {
            None => {
                s.available += e.amount;
                s.available_count += 1;
            }
            Some(Lock::Withdrawn) => s.withdrawn += e.amount,
            Some(_) => s.locked += e.amount,
        }
        s
    })
}
