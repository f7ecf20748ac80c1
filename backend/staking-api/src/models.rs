//! Persistent records and their status enums.
//!
//! Timestamps are unix seconds (UTC). Monetary columns are USDT as `REAL`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::packages::Package;

/// Lifecycle status of an investment.
///
/// ```text
/// Pending ──► Active ──► Completed ──► Withdrawn
///    │           └───────────────────►┘ (early withdrawal)
///    └──► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvestmentStatus {
    /// Created, waiting for the deposit transaction.
    Pending,
    /// Paid and accruing.
    Active,
    /// Term finished; principal and profit can be withdrawn.
    Completed,
    /// Cancelled before payment.
    Cancelled,
    /// Paid out (full or early withdrawal approved).
    Withdrawn,
}

/// Status of an upgrade or withdrawal request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WithdrawalKind {
    /// Principal plus profit after maturity.
    Full,
    /// Principal only, within the early-withdrawal window.
    Early,
    /// Part of the accrued profit.
    Profit,
    /// The cash bonus.
    Bonus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UpgradeKind {
    PackageChange,
    AmountIncrease,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReinvestSource {
    Profit,
    Referral,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub referral_code: String,
    pub referred_by: Option<i64>,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct StakingPlan {
    pub id: i64,
    pub name: String,
    pub min_amount: f64,
    pub max_amount: Option<f64>,
    pub currency: String,
    pub is_active: bool,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Investment {
    pub id: i64,
    pub user_id: i64,
    pub plan_id: i64,
    pub package: Package,
    pub amount: f64,
    pub currency: String,
    /// Package base monthly rate (percent).
    pub base_rate: f64,
    pub duration_months: i64,
    /// Rate points added by the term.
    pub duration_bonus: f64,
    /// Monthly rate currently paid.
    pub effective_rate: f64,
    pub cash_bonus: f64,
    pub bonus_unlocked_at: Option<i64>,
    pub bonus_withdrawn: bool,
    pub expected_profit: f64,
    pub total_return: f64,
    pub user_wallet: String,
    pub admin_wallet: String,
    pub network: String,
    pub status: InvestmentStatus,
    pub tx_hash: Option<String>,
    pub start_date: Option<i64>,
    pub end_date: Option<i64>,
    /// Last instant earned interest was folded into `accumulated_interest`.
    pub last_rebase_at: Option<i64>,
    pub accumulated_interest: f64,
    pub withdrawn_profits: f64,
    pub pending_rate: Option<f64>,
    pub pending_package: Option<Package>,
    pub upgrade_activation_at: Option<i64>,
    pub upgrade_requested_at: Option<i64>,
    pub withdrawal_requested: bool,
    /// Pinned clock used instead of wall time when set.
    pub simulated_now: Option<i64>,
    pub language: String,
    pub created_at: i64,
    pub updated_at: i64,
    pub completed_at: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Upgrade {
    pub id: i64,
    pub investment_id: i64,
    pub user_id: i64,
    pub kind: UpgradeKind,
    pub old_package: Package,
    pub new_package: Package,
    pub old_rate: f64,
    pub new_rate: f64,
    pub additional_amount: f64,
    pub admin_wallet: String,
    pub sender_wallet: Option<String>,
    pub tx_hash: Option<String>,
    pub activation_at: Option<i64>,
    pub status: RequestStatus,
    pub requested_at: i64,
    pub processed_at: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Reinvest {
    pub id: i64,
    pub investment_id: i64,
    pub user_id: i64,
    pub source: ReinvestSource,
    pub amount: f64,
    pub available_before: f64,
    pub old_package: Package,
    pub new_package: Package,
    pub old_rate: f64,
    pub new_rate: f64,
    pub old_amount: f64,
    pub new_amount: f64,
    pub upgraded: bool,
    pub activation_at: Option<i64>,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Withdrawal {
    pub id: i64,
    pub investment_id: i64,
    pub user_id: i64,
    pub kind: WithdrawalKind,
    pub amount: f64,
    pub forfeited_interest: f64,
    pub days_invested: i64,
    pub trc20_address: Option<String>,
    pub status: RequestStatus,
    pub requested_at: i64,
    pub processed_at: Option<i64>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ReferralEarning {
    pub id: i64,
    pub referrer_id: i64,
    pub referred_user_id: i64,
    pub investment_id: i64,
    pub level: i64,
    /// Commission percent (3 to 7).
    pub percentage: f64,
    pub amount: f64,
    pub withdrawn: bool,
    pub withdrawn_at: Option<i64>,
    pub created_at: i64,
}

/// A referral earning joined with the state of the investment that earned it.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EarningWithSource {
    pub id: i64,
    pub referred_user_id: i64,
    pub investment_id: i64,
    pub level: i64,
    pub percentage: f64,
    pub amount: f64,
    pub withdrawn: bool,
    pub investment_status: InvestmentStatus,
    pub investment_start: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ReferralWithdrawal {
    pub id: i64,
    pub user_id: i64,
    pub amount: f64,
    pub earning_count: i64,
    pub trc20_address: String,
    pub status: RequestStatus,
    pub requested_at: i64,
    pub processed_at: Option<i64>,
}

/// Convert a stored unix timestamp back into a UTC instant.
pub fn instant(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}
