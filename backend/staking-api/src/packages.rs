//! Investment packages and duration terms.
//!
//! A package is chosen by the invested amount and fixes the base monthly
//! rate. The term (3, 6 or 12 months) adds a rate bonus and, for larger
//! deposits, a one-off cash bonus that unlocks halfway through the term.

use serde::{Deserialize, Serialize};

/// Smallest amount accepted for any package.
pub const MIN_INVESTMENT: f64 = 100.0;

/// Deposits at or above this amount earn the small cash bonus.
pub const CASH_BONUS_SMALL_THRESHOLD: f64 = 500.0;

/// Deposits at or above this amount earn the large cash bonus.
pub const CASH_BONUS_LARGE_THRESHOLD: f64 = 1000.0;

/// Days an investment can be withdrawn early (principal only).
pub const EARLY_WITHDRAWAL_WINDOW_DAYS: i64 = 30;

/// Interest is accrued per day on a 30-day month.
pub const DAYS_PER_MONTH: f64 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
pub enum Package {
    Starter,
    Advanced,
    Pro,
    Elite,
}

impl Package {
    pub const ALL: [Package; 4] = [
        Package::Starter,
        Package::Advanced,
        Package::Pro,
        Package::Elite,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Starter => "Starter",
            Self::Advanced => "Advanced",
            Self::Pro => "Pro",
            Self::Elite => "Elite",
        }
    }

    /// Base monthly rate in percent.
    pub fn monthly_rate(self) -> f64 {
        match self {
            Self::Starter => 14.0,
            Self::Advanced => 17.0,
            Self::Pro => 20.0,
            Self::Elite => 22.0,
        }
    }

    pub fn min_amount(self) -> f64 {
        match self {
            Self::Starter => 100.0,
            Self::Advanced => 1000.0,
            Self::Pro => 3000.0,
            Self::Elite => 6000.0,
        }
    }

    pub fn max_amount(self) -> f64 {
        match self {
            Self::Starter => 999.0,
            Self::Advanced => 2999.0,
            Self::Pro => 5999.0,
            Self::Elite => 100_000.0,
        }
    }

    /// Package whose band contains `amount`, if any.
    pub fn for_amount(amount: f64) -> Option<Package> {
        Self::ALL
            .into_iter()
            .find(|p| amount >= p.min_amount() && amount <= p.max_amount())
    }

    /// Tier reached by a running total. Unlike [`Package::for_amount`] only
    /// the lower bounds matter, so totals grown by reinvestment never fall
    /// out of the catalogue.
    pub fn tier_for_total(amount: f64) -> Package {
        Self::ALL
            .into_iter()
            .rev()
            .find(|p| amount >= p.min_amount())
            .unwrap_or(Package::Starter)
    }

    pub fn from_name(name: &str) -> Option<Package> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(name))
    }

    pub fn rank(self) -> u8 {
        match self {
            Self::Starter => 0,
            Self::Advanced => 1,
            Self::Pro => 2,
            Self::Elite => 3,
        }
    }
}

impl std::fmt::Display for Package {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DurationTerm {
    Quarter,
    HalfYear,
    Year,
}

impl DurationTerm {
    pub fn from_months(months: i64) -> Option<DurationTerm> {
        match months {
            3 => Some(Self::Quarter),
            6 => Some(Self::HalfYear),
            12 => Some(Self::Year),
            _ => None,
        }
    }

    pub fn months(self) -> u32 {
        match self {
            Self::Quarter => 3,
            Self::HalfYear => 6,
            Self::Year => 12,
        }
    }

    /// Percentage points added to the package's monthly rate.
    pub fn rate_bonus(self) -> f64 {
        match self {
            Self::Quarter => 0.0,
            Self::HalfYear => 1.5,
            Self::Year => 3.0,
        }
    }

    pub fn cash_bonus(self, amount: f64) -> f64 {
        if self == Self::Quarter || amount < CASH_BONUS_SMALL_THRESHOLD {
            0.0
        } else if amount >= CASH_BONUS_LARGE_THRESHOLD {
            500.0
        } else {
            200.0
        }
    }

    pub fn label(self) -> String {
        match self {
            Self::Quarter => "3 months".to_string(),
            term => format!(
                "{} months: +{}% monthly rate, cash bonus $200/$500",
                term.months(),
                term.rate_bonus()
            ),
        }
    }
}

/// Monthly rate actually paid: package base plus the term bonus.
pub fn effective_rate(package: Package, term: DurationTerm) -> f64 {
    package.monthly_rate() + term.rate_bonus()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amount_bands() {
        assert_eq!(Package::for_amount(99.99), None);
        assert_eq!(Package::for_amount(100.0), Some(Package::Starter));
        assert_eq!(Package::for_amount(999.0), Some(Package::Starter));
        assert_eq!(Package::for_amount(1000.0), Some(Package::Advanced));
        assert_eq!(Package::for_amount(3000.0), Some(Package::Pro));
        assert_eq!(Package::for_amount(5999.0), Some(Package::Pro));
        assert_eq!(Package::for_amount(6000.0), Some(Package::Elite));
        assert_eq!(Package::for_amount(100_001.0), None);
        // Gaps between integer bands are not covered.
        assert_eq!(Package::for_amount(999.5), None);
    }

    #[test]
    fn tiers_use_lower_bounds_only() {
        assert_eq!(Package::tier_for_total(50.0), Package::Starter);
        assert_eq!(Package::tier_for_total(999.5), Package::Starter);
        assert_eq!(Package::tier_for_total(1000.0), Package::Advanced);
        assert_eq!(Package::tier_for_total(5999.99), Package::Pro);
        assert_eq!(Package::tier_for_total(250_000.0), Package::Elite);
    }

    #[test]
    fn names_parse_case_insensitively() {
        assert_eq!(Package::from_name("elite"), Some(Package::Elite));
        assert_eq!(Package::from_name(" PRO "), Some(Package::Pro));
        assert_eq!(Package::from_name("gold"), None);
    }

    #[test]
    fn duration_terms() {
        assert_eq!(DurationTerm::from_months(6), Some(DurationTerm::HalfYear));
        assert_eq!(DurationTerm::from_months(9), None);
        assert_eq!(effective_rate(Package::Pro, DurationTerm::Year), 23.0);
        assert_eq!(effective_rate(Package::Starter, DurationTerm::Quarter), 14.0);
    }

    #[test]
    fn cash_bonus_thresholds() {
        assert_eq!(DurationTerm::Quarter.cash_bonus(5000.0), 0.0);
        assert_eq!(DurationTerm::HalfYear.cash_bonus(499.0), 0.0);
        assert_eq!(DurationTerm::HalfYear.cash_bonus(500.0), 200.0);
        assert_eq!(DurationTerm::Year.cash_bonus(999.0), 200.0);
        assert_eq!(DurationTerm::Year.cash_bonus(1000.0), 500.0);
    }
}
