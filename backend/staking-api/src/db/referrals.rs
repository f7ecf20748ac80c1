//! Referral earnings and referral withdrawal requests.

use sqlx::{Executor, Sqlite};

use crate::errors::Result;
use crate::models::{EarningWithSource, InvestmentStatus, ReferralWithdrawal, RequestStatus};

/// Record a commission. Re-recording the same (referrer, investment,
/// level) is ignored; returns whether a row was written.
#[allow(clippy::too_many_arguments)]
pub async fn insert_earning<'e, E>(
    exec: E,
    referrer_id: i64,
    referred_user_id: i64,
    investment_id: i64,
    level: i64,
    percentage: f64,
    amount: f64,
    now: i64,
) -> Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let affected = sqlx::query(
        r#"
        INSERT OR IGNORE INTO referral_earnings
            (referrer_id, referred_user_id, investment_id, level, percentage, amount, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
    )
    .bind(referrer_id)
    .bind(referred_user_id)
    .bind(investment_id)
    .bind(level)
    .bind(percentage)
    .bind(amount)
    .bind(now)
    .execute(exec)
    .await?
    .rows_affected();
    Ok(affected == 1)
}

/// Every earning of a referrer with the state of its source investment.
pub async fn earnings_for<'e, E>(exec: E, referrer_id: i64) -> Result<Vec<EarningWithSource>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query_as::<_, EarningWithSource>(
        r#"
        SELECT e.id, e.referred_user_id, e.investment_id, e.level, e.percentage,
               e.amount, e.withdrawn,
               i.status     AS investment_status,
               i.start_date AS investment_start
        FROM   referral_earnings e
        JOIN   investments i ON i.id = e.investment_id
        WHERE  e.referrer_id = ?1
        ORDER  BY e.created_at DESC, e.id DESC
        "#,
    )
    .bind(referrer_id)
    .fetch_all(exec)
    .await?;
    Ok(rows)
}

/// Flag an earning as paid out. Returns false if it already was.
pub async fn mark_withdrawn<'e, E>(exec: E, earning_id: i64, now: i64) -> Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let affected = sqlx::query(
        "UPDATE referral_earnings SET withdrawn = 1, withdrawn_at = ?2 WHERE id = ?1 AND withdrawn = 0",
    )
    .bind(earning_id)
    .bind(now)
    .execute(exec)
    .await?
    .rows_affected();
    Ok(affected == 1)
}

/// Unlock the earnings claimed by a rejected referral withdrawal.
pub async fn release_withdrawal_items<'e, E>(exec: E, withdrawal_id: i64) -> Result<u64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let affected = sqlx::query(
        r#"
        UPDATE referral_earnings SET withdrawn = 0, withdrawn_at = NULL
        WHERE  id IN (SELECT earning_id FROM referral_withdrawal_items WHERE withdrawal_id = ?1)
        "#,
    )
    .bind(withdrawal_id)
    .execute(exec)
    .await?
    .rows_affected();
    Ok(affected)
}

pub async fn insert_withdrawal<'e, E>(
    exec: E,
    user_id: i64,
    amount: f64,
    earning_count: i64,
    trc20_address: &str,
    now: i64,
) -> Result<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let id = sqlx::query(
        r#"
        INSERT INTO referral_withdrawals
            (user_id, amount, earning_count, trc20_address, status, requested_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
    )
    .bind(user_id)
    .bind(amount)
    .bind(earning_count)
    .bind(trc20_address)
    .bind(RequestStatus::Pending)
    .bind(now)
    .execute(exec)
    .await?
    .last_insert_rowid();
    Ok(id)
}

pub async fn insert_withdrawal_item<'e, E>(exec: E, withdrawal_id: i64, earning_id: i64) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query("INSERT INTO referral_withdrawal_items (withdrawal_id, earning_id) VALUES (?1, ?2)")
        .bind(withdrawal_id)
        .bind(earning_id)
        .execute(exec)
        .await?;
    Ok(())
}

pub async fn find_withdrawal<'e, E>(exec: E, id: i64) -> Result<Option<ReferralWithdrawal>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query_as::<_, ReferralWithdrawal>(
        "SELECT * FROM referral_withdrawals WHERE id = ?1",
    )
    .bind(id)
    .fetch_optional(exec)
    .await?;
    Ok(row)
}

/// Resolve a pending referral withdrawal. Returns false if it was not pending.
pub async fn resolve_withdrawal<'e, E>(
    exec: E,
    id: i64,
    status: RequestStatus,
    now: i64,
) -> Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let affected = sqlx::query(
        "UPDATE referral_withdrawals SET status = ?2, processed_at = ?3 WHERE id = ?1 AND status = ?4",
    )
    .bind(id)
    .bind(status)
    .bind(now)
    .bind(RequestStatus::Pending)
    .execute(exec)
    .await?
    .rows_affected();
    Ok(affected == 1)
}

/// Sum of level-1 and level-2 commissions earned from active investments.
pub async fn active_totals<'e, E>(exec: E, referrer_id: i64) -> Result<(f64, f64)>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row: (f64, f64) = sqlx::query_as(
        r#"
        SELECT
            CAST(COALESCE(SUM(CASE WHEN e.level = 1 THEN e.amount END), 0) AS REAL),
            CAST(COALESCE(SUM(CASE WHEN e.level = 2 THEN e.amount END), 0) AS REAL)
        FROM   referral_earnings e
        JOIN   investments i ON i.id = e.investment_id
        WHERE  e.referrer_id = ?1 AND i.status = ?2
        "#,
    )
    .bind(referrer_id)
    .bind(InvestmentStatus::Active)
    .fetch_one(exec)
    .await?;
    Ok(row)
}
