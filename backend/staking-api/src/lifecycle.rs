//! Investment lifecycle transitions.
//!
//! Every function here mutates an [`Investment`] in memory and takes the
//! current instant explicitly; persistence is the caller's job. Handlers
//! call [`refresh`] first so that due upgrades and maturity are applied
//! before any other rule is evaluated.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::accrual::{self, Accrual, PendingRate};
use crate::models::{instant, Investment, InvestmentStatus, StakingPlan};
use crate::packages::{
    effective_rate, DurationTerm, Package, EARLY_WITHDRAWAL_WINDOW_DAYS, MIN_INVESTMENT,
};

#[derive(Debug, Error, PartialEq)]
pub enum LifecycleError {
    #[error("Duration must be 3, 6, or 12 months")]
    InvalidDuration,

    #[error("Amount must be greater than 0")]
    NonPositiveAmount,

    #[error("This investment plan is not active")]
    PlanInactive,

    #[error("Amount must be at least {min} {currency}")]
    BelowPlanMinimum { min: f64, currency: String },

    #[error("Amount must not exceed {max} {currency}")]
    AbovePlanMaximum { max: f64, currency: String },

    #[error("Amount does not match any package (minimum ${})", MIN_INVESTMENT)]
    NoPackage,

    #[error("Investment is not awaiting payment")]
    NotPending,

    #[error("Investment is not active")]
    NotActive,

    #[error("Investment has not matured yet")]
    NotMatured,

    #[error("Withdrawal already requested for this investment")]
    WithdrawalAlreadyRequested,

    #[error(
        "Early withdrawal is only available within the first {} days (invested {days} days)",
        EARLY_WITHDRAWAL_WINDOW_DAYS
    )]
    EarlyWindowClosed { days: i64 },

    #[error("Insufficient profit. Available: ${available:.2}, Requested: ${requested:.2}")]
    InsufficientProfit { available: f64, requested: f64 },

    #[error("No bonus available for this investment")]
    NoBonus,

    #[error("Bonus already withdrawn")]
    BonusAlreadyWithdrawn,

    #[error("Bonus unlocks on {unlocks_at}")]
    BonusLocked { unlocks_at: DateTime<Utc> },

    #[error("Cannot upgrade twice in one day or on the day the investment started")]
    SameDayUpgrade,

    #[error("An upgrade is already scheduled for {activation}")]
    UpgradeScheduled { activation: DateTime<Utc> },

    #[error("Invalid package '{0}'. Available packages: starter, advanced, pro, elite")]
    UnknownPackage(String),

    #[error("Cannot move from {from} down to {to}")]
    Downgrade { from: Package, to: Package },

    #[error("Total amount must be between ${min} and ${max} for the {package} package")]
    OutsidePackageBand { package: Package, min: f64, max: f64 },

    #[error("Date out of range")]
    DateOverflow,
}

pub type Result<T> = std::result::Result<T, LifecycleError>;

/// Terms offered for a new investment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Quote {
    pub package: Package,
    pub months: u32,
    pub base_rate: f64,
    pub duration_bonus: f64,
    pub effective_rate: f64,
    pub cash_bonus: f64,
    pub expected_profit: f64,
    pub total_return: f64,
    pub duration_label: String,
}

/// Outcome of adding principal to a running investment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrincipalChange {
    pub old_amount: f64,
    pub new_amount: f64,
    pub old_package: Package,
    pub new_package: Package,
    pub old_rate: f64,
    pub new_rate: f64,
    pub upgraded: bool,
    pub activation_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Refresh {
    pub upgrade_activated: bool,
    pub matured: bool,
}

impl Refresh {
    pub fn changed(&self) -> bool {
        self.upgrade_activated || self.matured
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EarlyWithdrawalQuote {
    pub days_invested: i64,
    /// Interest earned so far; forfeited by the early exit.
    pub forfeited_interest: f64,
    pub withdrawn_profits: f64,
    pub payout: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FullWithdrawalQuote {
    pub principal: f64,
    pub profit: f64,
    pub bonus: f64,
    pub payout: f64,
}

/// Live figures shown to the investor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Figures {
    pub days_passed: i64,
    pub days_remaining: i64,
    /// Monthly rate in force at the valuation instant.
    pub current_rate: f64,
    pub current_return: f64,
    pub available_profit: f64,
    pub projected_profit: f64,
    pub projected_total: f64,
    pub bonus_unlocked: bool,
    pub is_completed: bool,
    pub is_simulated: bool,
}

fn ts(at: DateTime<Utc>) -> i64 {
    at.timestamp()
}

fn validate_amount(amount: f64) -> Result<()> {
    if amount.is_finite() && amount > 0.0 {
        Ok(())
    } else {
        Err(LifecycleError::NonPositiveAmount)
    }
}

/// Instant the investment is valued at: its pinned clock if any.
pub fn effective_now(inv: &Investment, now: DateTime<Utc>) -> DateTime<Utc> {
    inv.simulated_now.map(instant).unwrap_or(now)
}

/// Price a new investment against a plan.
pub fn quote(amount: f64, plan: &StakingPlan, months: i64) -> Result<Quote> {
    validate_amount(amount)?;
    let term = DurationTerm::from_months(months).ok_or(LifecycleError::InvalidDuration)?;

    if !plan.is_active {
        return Err(LifecycleError::PlanInactive);
    }
    if amount < plan.min_amount {
        return Err(LifecycleError::BelowPlanMinimum {
            min: plan.min_amount,
            currency: plan.currency.clone(),
        });
    }
    if let Some(max) = plan.max_amount {
        if amount > max {
            return Err(LifecycleError::AbovePlanMaximum {
                max,
                currency: plan.currency.clone(),
            });
        }
    }

    let package = Package::for_amount(amount).ok_or(LifecycleError::NoPackage)?;
    let rate = effective_rate(package, term);
    let cash_bonus = term.cash_bonus(amount);
    let expected_profit = accrual::expected_profit(amount, rate, term.months());

    Ok(Quote {
        package,
        months: term.months(),
        base_rate: package.monthly_rate(),
        duration_bonus: term.rate_bonus(),
        effective_rate: rate,
        cash_bonus,
        expected_profit,
        total_return: amount + expected_profit + cash_bonus,
        duration_label: term.label(),
    })
}

/// Accrual view of an active (or finished) investment; `None` before payment.
pub fn accrual_of(inv: &Investment) -> Option<Accrual> {
    let start = inv.start_date?;
    let pending = match (inv.pending_rate, inv.upgrade_activation_at) {
        (Some(rate), Some(at)) => Some(PendingRate {
            rate,
            activates_at: instant(at),
        }),
        _ => None,
    };
    Some(Accrual {
        amount: inv.amount,
        rate: inv.effective_rate,
        accumulated: inv.accumulated_interest,
        base: instant(inv.last_rebase_at.unwrap_or(start)),
        maturity: inv.end_date.map(instant),
        pending,
    })
}

/// Total interest earned as of `now`.
pub fn accrued(inv: &Investment, now: DateTime<Utc>) -> f64 {
    accrual_of(inv).map(|a| a.accrued(now)).unwrap_or(0.0)
}

pub fn available_profit(inv: &Investment, now: DateTime<Utc>) -> f64 {
    accrual::available_profit(accrued(inv, now), inv.withdrawn_profits)
}

fn recompute_projection(inv: &mut Investment) {
    if let Some(a) = accrual_of(inv) {
        inv.expected_profit = a.projected();
        inv.total_return = inv.amount + inv.expected_profit + inv.cash_bonus;
    }
}

/// Payment confirmed: start the term.
pub fn activate(inv: &mut Investment, now: DateTime<Utc>) -> Result<()> {
    if inv.status != InvestmentStatus::Pending {
        return Err(LifecycleError::NotPending);
    }
    let months = u32::try_from(inv.duration_months).map_err(|_| LifecycleError::InvalidDuration)?;
    let end = accrual::add_months(now, months).ok_or(LifecycleError::DateOverflow)?;

    inv.status = InvestmentStatus::Active;
    inv.start_date = Some(ts(now));
    inv.end_date = Some(ts(end));
    inv.last_rebase_at = None;
    inv.accumulated_interest = 0.0;
    inv.withdrawn_profits = 0.0;
    if inv.cash_bonus > 0.0 {
        let unlock = accrual::add_months(now, months / 2).ok_or(LifecycleError::DateOverflow)?;
        inv.bonus_unlocked_at = Some(ts(unlock));
    }
    inv.updated_at = ts(now);
    Ok(())
}

/// Cancel an unpaid investment.
pub fn cancel(inv: &mut Investment, now: DateTime<Utc>) -> Result<()> {
    if inv.status != InvestmentStatus::Pending {
        return Err(LifecycleError::NotPending);
    }
    inv.status = InvestmentStatus::Cancelled;
    inv.completed_at = Some(ts(now));
    inv.updated_at = ts(now);
    Ok(())
}

fn clear_pending(inv: &mut Investment) {
    inv.pending_rate = None;
    inv.pending_package = None;
    inv.upgrade_activation_at = None;
    inv.upgrade_requested_at = None;
}

/// Apply a due pending upgrade and maturity. Returns what changed.
pub fn refresh(inv: &mut Investment, now: DateTime<Utc>) -> Refresh {
    let mut outcome = Refresh::default();
    if inv.status != InvestmentStatus::Active {
        return outcome;
    }
    let now = effective_now(inv, now);

    if let Some(a) = accrual_of(inv) {
        let due = a.pending.filter(|p| {
            now >= p.activates_at && a.maturity.map_or(true, |end| p.activates_at <= end)
        });
        if let Some(pending) = due {
            let split = accrual::whole_days_after(a.base, pending.activates_at);
            inv.accumulated_interest = a.accrued_before_activation().unwrap_or(a.accumulated);
            inv.last_rebase_at = Some(ts(split));
            inv.effective_rate = pending.rate;
            if let Some(package) = inv.pending_package {
                inv.package = package;
                inv.base_rate = package.monthly_rate();
            }
            clear_pending(inv);
            inv.updated_at = ts(now);
            outcome.upgrade_activated = true;
        }
    }

    if let Some(end) = inv.end_date.map(instant) {
        if now >= end {
            if let Some(a) = accrual_of(inv) {
                inv.accumulated_interest = a.accrued(end);
                inv.last_rebase_at = Some(ts(end));
            }
            // An upgrade still waiting at maturity never applies.
            clear_pending(inv);
            inv.status = InvestmentStatus::Completed;
            inv.completed_at = Some(ts(end));
            inv.updated_at = ts(now);
            outcome.matured = true;
        }
    }

    if outcome.changed() {
        recompute_projection(inv);
    }
    outcome
}

/// Fold accrued interest into `accumulated_interest` and rebase to the
/// last whole-day boundary before `now`.
pub fn crystallise(inv: &mut Investment, now: DateTime<Utc>) {
    if let Some(a) = accrual_of(inv) {
        let until = a.rated_until(now);
        inv.accumulated_interest = a.accrued(until);
        inv.last_rebase_at = Some(ts(until));
    }
}

fn base_instant(inv: &Investment) -> Option<DateTime<Utc>> {
    inv.last_rebase_at.or(inv.start_date).map(instant)
}

/// Add principal; a move to a higher package is deferred to the next
/// activation date. `target` forces the package (explicit upgrades);
/// otherwise the tier is derived from the new total.
pub fn apply_principal_increase(
    inv: &mut Investment,
    extra: f64,
    target: Option<Package>,
    now: DateTime<Utc>,
) -> Result<PrincipalChange> {
    validate_amount(extra)?;
    if inv.status != InvestmentStatus::Active {
        return Err(LifecycleError::NotActive);
    }
    if inv.withdrawal_requested {
        return Err(LifecycleError::WithdrawalAlreadyRequested);
    }
    let now = effective_now(inv, now);
    let old_amount = inv.amount;
    let old_package = inv.package;
    let old_rate = inv.effective_rate;
    let scheduled = inv.pending_package.unwrap_or(inv.package);

    crystallise(inv, now);
    inv.amount += extra;

    let tier = target.unwrap_or_else(|| Package::tier_for_total(inv.amount));
    let mut change = PrincipalChange {
        old_amount,
        new_amount: inv.amount,
        old_package,
        new_package: scheduled,
        old_rate,
        new_rate: inv.pending_rate.unwrap_or(old_rate),
        upgraded: false,
        activation_at: inv.upgrade_activation_at.map(instant),
    };

    if tier.rank() > scheduled.rank() {
        let rate = tier.monthly_rate() + inv.duration_bonus;
        let activation = inv
            .upgrade_activation_at
            .map(instant)
            .unwrap_or_else(|| accrual::next_activation_date(now));
        inv.pending_rate = Some(rate);
        inv.pending_package = Some(tier);
        inv.upgrade_activation_at = Some(ts(activation));
        inv.upgrade_requested_at = Some(ts(now));
        change.new_package = tier;
        change.new_rate = rate;
        change.upgraded = true;
        change.activation_at = Some(activation);
    }

    inv.updated_at = ts(now);
    recompute_projection(inv);
    Ok(change)
}

/// Validate an explicit upgrade request before payment is collected.
pub fn validate_upgrade(
    inv: &Investment,
    extra: f64,
    package_name: &str,
    now: DateTime<Utc>,
) -> Result<Package> {
    validate_amount(extra)?;
    if inv.status != InvestmentStatus::Active {
        return Err(LifecycleError::NotActive);
    }
    if inv.withdrawal_requested {
        return Err(LifecycleError::WithdrawalAlreadyRequested);
    }
    let now = effective_now(inv, now);
    if let Some(activation) = inv.upgrade_activation_at {
        return Err(LifecycleError::UpgradeScheduled {
            activation: instant(activation),
        });
    }
    let base = base_instant(inv).ok_or(LifecycleError::NotActive)?;
    if base.date_naive() == now.date_naive() || accrual::days_between(base, now) == 0 {
        return Err(LifecycleError::SameDayUpgrade);
    }

    let package = Package::from_name(package_name)
        .ok_or_else(|| LifecycleError::UnknownPackage(package_name.to_string()))?;
    if package.rank() < inv.package.rank() {
        return Err(LifecycleError::Downgrade {
            from: inv.package,
            to: package,
        });
    }
    let total = inv.amount + extra;
    if total < package.min_amount() || total > package.max_amount() {
        return Err(LifecycleError::OutsidePackageBand {
            package,
            min: package.min_amount(),
            max: package.max_amount(),
        });
    }
    Ok(package)
}

/// Reserve part of the accrued profit for payout.
pub fn withdraw_profit(inv: &mut Investment, amount: f64, now: DateTime<Utc>) -> Result<f64> {
    validate_amount(amount)?;
    if !matches!(
        inv.status,
        InvestmentStatus::Active | InvestmentStatus::Completed
    ) {
        return Err(LifecycleError::NotActive);
    }
    if inv.withdrawal_requested {
        return Err(LifecycleError::WithdrawalAlreadyRequested);
    }
    let now = effective_now(inv, now);
    let available = available_profit(inv, now);
    if amount > available {
        return Err(LifecycleError::InsufficientProfit {
            available,
            requested: amount,
        });
    }
    inv.withdrawn_profits += amount;
    inv.updated_at = ts(now);
    Ok(available - amount)
}

/// Give back a reservation made by [`withdraw_profit`] (rejected request).
pub fn release_profit(inv: &mut Investment, amount: f64) {
    inv.withdrawn_profits = (inv.withdrawn_profits - amount).max(0.0);
}

/// Move available profit into principal.
pub fn reinvest_profit(
    inv: &mut Investment,
    amount: f64,
    now: DateTime<Utc>,
) -> Result<(PrincipalChange, f64)> {
    validate_amount(amount)?;
    if inv.status != InvestmentStatus::Active {
        return Err(LifecycleError::NotActive);
    }
    let clock = effective_now(inv, now);
    let available = available_profit(inv, clock);
    if amount > available {
        return Err(LifecycleError::InsufficientProfit {
            available,
            requested: amount,
        });
    }
    let change = apply_principal_increase(inv, amount, None, now)?;
    inv.withdrawn_profits += amount;
    Ok((change, available))
}

/// Claim the cash bonus once it has unlocked.
pub fn claim_bonus(inv: &mut Investment, now: DateTime<Utc>) -> Result<f64> {
    if !matches!(
        inv.status,
        InvestmentStatus::Active | InvestmentStatus::Completed
    ) {
        return Err(LifecycleError::NotActive);
    }
    if inv.cash_bonus <= 0.0 {
        return Err(LifecycleError::NoBonus);
    }
    if inv.bonus_withdrawn {
        return Err(LifecycleError::BonusAlreadyWithdrawn);
    }
    if inv.withdrawal_requested {
        return Err(LifecycleError::WithdrawalAlreadyRequested);
    }
    let now = effective_now(inv, now);
    if let Some(unlock) = inv.bonus_unlocked_at.map(instant) {
        if now < unlock {
            return Err(LifecycleError::BonusLocked { unlocks_at: unlock });
        }
    }
    inv.bonus_withdrawn = true;
    inv.updated_at = ts(now);
    Ok(inv.cash_bonus)
}

pub fn early_withdrawal_quote(inv: &Investment, now: DateTime<Utc>) -> Result<EarlyWithdrawalQuote> {
    if inv.status != InvestmentStatus::Active {
        return Err(LifecycleError::NotActive);
    }
    let now = effective_now(inv, now);
    let start = inv.start_date.map(instant).ok_or(LifecycleError::NotActive)?;
    let days = accrual::days_between(start, now);
    if days > EARLY_WITHDRAWAL_WINDOW_DAYS {
        return Err(LifecycleError::EarlyWindowClosed { days });
    }
    Ok(EarlyWithdrawalQuote {
        days_invested: days,
        forfeited_interest: accrued(inv, now),
        withdrawn_profits: inv.withdrawn_profits,
        payout: (inv.amount - inv.withdrawn_profits).max(0.0),
    })
}

pub fn full_withdrawal_quote(inv: &Investment, now: DateTime<Utc>) -> Result<FullWithdrawalQuote> {
    if inv.withdrawal_requested {
        return Err(LifecycleError::WithdrawalAlreadyRequested);
    }
    let now = effective_now(inv, now);
    let matured = match inv.status {
        InvestmentStatus::Completed => true,
        InvestmentStatus::Active => inv.end_date.map(instant).is_some_and(|end| now >= end),
        _ => return Err(LifecycleError::NotActive),
    };
    if !matured {
        return Err(LifecycleError::NotMatured);
    }

    let profit = available_profit(inv, now);
    let bonus_unlocked = inv
        .bonus_unlocked_at
        .map(instant)
        .is_some_and(|unlock| now >= unlock);
    let bonus = if inv.cash_bonus > 0.0 && !inv.bonus_withdrawn && bonus_unlocked {
        inv.cash_bonus
    } else {
        0.0
    };

    Ok(FullWithdrawalQuote {
        principal: inv.amount,
        profit,
        bonus,
        payout: inv.amount + profit + bonus,
    })
}

pub fn figures(inv: &Investment, now: DateTime<Utc>) -> Figures {
    let now = effective_now(inv, now);
    let start = inv.start_date.map(instant);
    let end = inv.end_date.map(instant);
    let capped = match end {
        Some(end) if now > end => end,
        _ => now,
    };

    let current_return = accrued(inv, now);
    let current_rate = accrual_of(inv)
        .map(|a| a.rate_at(capped))
        .unwrap_or(inv.effective_rate);
    let projected_profit = accrual_of(inv)
        .map(|a| a.projected())
        .unwrap_or(inv.expected_profit);
    let bonus_unlocked = inv
        .bonus_unlocked_at
        .map(instant)
        .is_some_and(|unlock| now >= unlock);

    Figures {
        days_passed: start.map(|s| accrual::days_between(s, capped)).unwrap_or(0),
        days_remaining: end.map(|e| accrual::days_remaining(e, now)).unwrap_or(0),
        current_rate,
        current_return: accrual::round2(current_return),
        available_profit: accrual::round2(accrual::available_profit(
            current_return,
            inv.withdrawn_profits,
        )),
        projected_profit: accrual::round2(projected_profit),
        projected_total: accrual::round2(inv.amount + projected_profit + inv.cash_bonus),
        bonus_unlocked,
        is_completed: inv.status == InvestmentStatus::Completed
            || (inv.status == InvestmentStatus::Active && end.is_some_and(|e| now >= e)),
        is_simulated: inv.simulated_now.is_some(),
    }
}
