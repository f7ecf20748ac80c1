//! Upgrade requests, reinvest history, withdrawal requests and the audit log.

use serde_json::Value;
use sqlx::{Executor, Sqlite};

use crate::errors::Result;
use crate::models::{Reinvest, RequestStatus, Upgrade, Withdrawal, WithdrawalKind};

// ─────────────────────────────────────────────────────────
// Upgrades
// ─────────────────────────────────────────────────────────

pub async fn insert_upgrade<'e, E>(exec: E, up: &Upgrade) -> Result<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let id = sqlx::query(
        r#"
        INSERT INTO upgrades
            (investment_id, user_id, kind, old_package, new_package, old_rate, new_rate,
             additional_amount, admin_wallet, sender_wallet, status, requested_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
        "#,
    )
    .bind(up.investment_id)
    .bind(up.user_id)
    .bind(up.kind)
    .bind(up.old_package)
    .bind(up.new_package)
    .bind(up.old_rate)
    .bind(up.new_rate)
    .bind(up.additional_amount)
    .bind(&up.admin_wallet)
    .bind(&up.sender_wallet)
    .bind(up.status)
    .bind(up.requested_at)
    .execute(exec)
    .await?
    .last_insert_rowid();
    Ok(id)
}

pub async fn find_upgrade_owned<'e, E>(exec: E, id: i64, user_id: i64) -> Result<Option<Upgrade>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let up = sqlx::query_as::<_, Upgrade>("SELECT * FROM upgrades WHERE id = ?1 AND user_id = ?2")
        .bind(id)
        .bind(user_id)
        .fetch_optional(exec)
        .await?;
    Ok(up)
}

pub async fn list_upgrades<'e, E>(exec: E, user_id: i64) -> Result<Vec<Upgrade>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query_as::<_, Upgrade>(
        "SELECT * FROM upgrades WHERE user_id = ?1 ORDER BY requested_at DESC, id DESC",
    )
    .bind(user_id)
    .fetch_all(exec)
    .await?;
    Ok(rows)
}

pub async fn pending_upgrade_exists<'e, E>(exec: E, investment_id: i64) -> Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let (n,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM upgrades WHERE investment_id = ?1 AND status = 'PENDING'",
    )
    .bind(investment_id)
    .fetch_one(exec)
    .await?;
    Ok(n > 0)
}

/// Mark an upgrade as paid and record when its rate takes effect.
pub async fn complete_upgrade<'e, E>(
    exec: E,
    id: i64,
    tx_hash: &str,
    new_rate: f64,
    activation_at: Option<i64>,
    now: i64,
) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        UPDATE upgrades
        SET    status = ?2, tx_hash = ?3, new_rate = ?4, activation_at = ?5, processed_at = ?6
        WHERE  id = ?1
        "#,
    )
    .bind(id)
    .bind(RequestStatus::Completed)
    .bind(tx_hash)
    .bind(new_rate)
    .bind(activation_at)
    .bind(now)
    .execute(exec)
    .await?;
    Ok(())
}

// ─────────────────────────────────────────────────────────
// Reinvests
// ─────────────────────────────────────────────────────────

pub async fn insert_reinvest<'e, E>(exec: E, r: &Reinvest) -> Result<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let id = sqlx::query(
        r#"
        INSERT INTO reinvests
            (investment_id, user_id, source, amount, available_before, old_package,
             new_package, old_rate, new_rate, old_amount, new_amount, upgraded,
             activation_at, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
        "#,
    )
    .bind(r.investment_id)
    .bind(r.user_id)
    .bind(r.source)
    .bind(r.amount)
    .bind(r.available_before)
    .bind(r.old_package)
    .bind(r.new_package)
    .bind(r.old_rate)
    .bind(r.new_rate)
    .bind(r.old_amount)
    .bind(r.new_amount)
    .bind(r.upgraded)
    .bind(r.activation_at)
    .bind(r.created_at)
    .execute(exec)
    .await?
    .last_insert_rowid();
    Ok(id)
}

pub async fn list_reinvests<'e, E>(exec: E, investment_id: i64) -> Result<Vec<Reinvest>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query_as::<_, Reinvest>(
        "SELECT * FROM reinvests WHERE investment_id = ?1 ORDER BY created_at DESC, id DESC",
    )
    .bind(investment_id)
    .fetch_all(exec)
    .await?;
    Ok(rows)
}

// ─────────────────────────────────────────────────────────
// Withdrawals
// ─────────────────────────────────────────────────────────

pub async fn insert_withdrawal<'e, E>(exec: E, w: &Withdrawal) -> Result<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let id = sqlx::query(
        r#"
        INSERT INTO withdrawals
            (investment_id, user_id, kind, amount, forfeited_interest, days_invested,
             trc20_address, status, requested_at, note)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        "#,
    )
    .bind(w.investment_id)
    .bind(w.user_id)
    .bind(w.kind)
    .bind(w.amount)
    .bind(w.forfeited_interest)
    .bind(w.days_invested)
    .bind(&w.trc20_address)
    .bind(w.status)
    .bind(w.requested_at)
    .bind(&w.note)
    .execute(exec)
    .await?
    .last_insert_rowid();
    Ok(id)
}

pub async fn find_withdrawal<'e, E>(exec: E, id: i64) -> Result<Option<Withdrawal>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let w = sqlx::query_as::<_, Withdrawal>("SELECT * FROM withdrawals WHERE id = ?1")
        .bind(id)
        .fetch_optional(exec)
        .await?;
    Ok(w)
}

pub async fn list_withdrawals<'e, E>(exec: E, user_id: i64) -> Result<Vec<Withdrawal>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query_as::<_, Withdrawal>(
        "SELECT * FROM withdrawals WHERE user_id = ?1 ORDER BY requested_at DESC, id DESC",
    )
    .bind(user_id)
    .fetch_all(exec)
    .await?;
    Ok(rows)
}

/// Whether a principal exit (full or early) is already waiting for review.
pub async fn pending_exit_exists<'e, E>(exec: E, investment_id: i64) -> Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    pending_of_kinds(exec, investment_id, WithdrawalKind::Full, WithdrawalKind::Early).await
}

/// Whether a profit or bonus payout is still waiting for an administrator.
pub async fn pending_payout_exists<'e, E>(exec: E, investment_id: i64) -> Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    pending_of_kinds(exec, investment_id, WithdrawalKind::Profit, WithdrawalKind::Bonus).await
}

async fn pending_of_kinds<'e, E>(
    exec: E,
    investment_id: i64,
    first: WithdrawalKind,
    second: WithdrawalKind,
) -> Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let (n,): (i64,) = sqlx::query_as(
        r#"
        SELECT COUNT(*) FROM withdrawals
        WHERE  investment_id = ?1 AND status = ?2 AND kind IN (?3, ?4)
        "#,
    )
    .bind(investment_id)
    .bind(RequestStatus::Pending)
    .bind(first)
    .bind(second)
    .fetch_one(exec)
    .await?;
    Ok(n > 0)
}

/// Resolve a pending withdrawal. Returns false if it was not pending.
pub async fn resolve_withdrawal<'e, E>(
    exec: E,
    id: i64,
    status: RequestStatus,
    note: Option<&str>,
    now: i64,
) -> Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let affected = sqlx::query(
        r#"
        UPDATE withdrawals
        SET    status = ?2, note = COALESCE(?3, note), processed_at = ?4
        WHERE  id = ?1 AND status = ?5
        "#,
    )
    .bind(id)
    .bind(status)
    .bind(note)
    .bind(now)
    .bind(RequestStatus::Pending)
    .execute(exec)
    .await?
    .rows_affected();
    Ok(affected == 1)
}

// ─────────────────────────────────────────────────────────
// Audit log
// ─────────────────────────────────────────────────────────

pub async fn audit<'e, E>(
    exec: E,
    user_id: Option<i64>,
    investment_id: Option<i64>,
    action: &str,
    details: &Value,
    now: i64,
) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO audit_log (user_id, investment_id, action, details, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
    )
    .bind(user_id)
    .bind(investment_id)
    .bind(action)
    .bind(details.to_string())
    .bind(now)
    .execute(exec)
    .await?;
    Ok(())
}
