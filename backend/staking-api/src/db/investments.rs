//! Investment rows.

use serde::Serialize;
use sqlx::{Executor, Sqlite};

use crate::errors::Result;
use crate::models::{Investment, InvestmentStatus};

/// Insert a freshly quoted investment; returns its id.
pub async fn insert<'e, E>(exec: E, inv: &Investment) -> Result<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let id = sqlx::query(
        r#"
        INSERT INTO investments
            (user_id, plan_id, package, amount, currency, base_rate, duration_months,
             duration_bonus, effective_rate, cash_bonus, expected_profit, total_return,
             user_wallet, admin_wallet, network, status, language, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)
        "#,
    )
    .bind(inv.user_id)
    .bind(inv.plan_id)
    .bind(inv.package)
    .bind(inv.amount)
    .bind(&inv.currency)
    .bind(inv.base_rate)
    .bind(inv.duration_months)
    .bind(inv.duration_bonus)
    .bind(inv.effective_rate)
    .bind(inv.cash_bonus)
    .bind(inv.expected_profit)
    .bind(inv.total_return)
    .bind(&inv.user_wallet)
    .bind(&inv.admin_wallet)
    .bind(&inv.network)
    .bind(inv.status)
    .bind(&inv.language)
    .bind(inv.created_at)
    .bind(inv.updated_at)
    .execute(exec)
    .await?
    .last_insert_rowid();
    Ok(id)
}

/// Write back every mutable column.
pub async fn save<'e, E>(exec: E, inv: &Investment) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        UPDATE investments SET
            package = ?2, amount = ?3, base_rate = ?4, effective_rate = ?5,
            bonus_unlocked_at = ?6, bonus_withdrawn = ?7, expected_profit = ?8,
            total_return = ?9, status = ?10, tx_hash = ?11, start_date = ?12,
            end_date = ?13, last_rebase_at = ?14, accumulated_interest = ?15,
            withdrawn_profits = ?16, pending_rate = ?17, pending_package = ?18,
            upgrade_activation_at = ?19, upgrade_requested_at = ?20,
            withdrawal_requested = ?21, simulated_now = ?22, updated_at = ?23,
            completed_at = ?24
        WHERE id = ?1
        "#,
    )
    .bind(inv.id)
    .bind(inv.package)
    .bind(inv.amount)
    .bind(inv.base_rate)
    .bind(inv.effective_rate)
    .bind(inv.bonus_unlocked_at)
    .bind(inv.bonus_withdrawn)
    .bind(inv.expected_profit)
    .bind(inv.total_return)
    .bind(inv.status)
    .bind(&inv.tx_hash)
    .bind(inv.start_date)
    .bind(inv.end_date)
    .bind(inv.last_rebase_at)
    .bind(inv.accumulated_interest)
    .bind(inv.withdrawn_profits)
    .bind(inv.pending_rate)
    .bind(inv.pending_package)
    .bind(inv.upgrade_activation_at)
    .bind(inv.upgrade_requested_at)
    .bind(inv.withdrawal_requested)
    .bind(inv.simulated_now)
    .bind(inv.updated_at)
    .bind(inv.completed_at)
    .execute(exec)
    .await?;
    Ok(())
}

pub async fn find<'e, E>(exec: E, id: i64) -> Result<Option<Investment>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let inv = sqlx::query_as::<_, Investment>("SELECT * FROM investments WHERE id = ?1")
        .bind(id)
        .fetch_optional(exec)
        .await?;
    Ok(inv)
}

/// Fetch an investment only if it belongs to `user_id`.
pub async fn find_owned<'e, E>(exec: E, id: i64, user_id: i64) -> Result<Option<Investment>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let inv = sqlx::query_as::<_, Investment>(
        "SELECT * FROM investments WHERE id = ?1 AND user_id = ?2",
    )
    .bind(id)
    .bind(user_id)
    .fetch_optional(exec)
    .await?;
    Ok(inv)
}

pub async fn list_for_user<'e, E>(exec: E, user_id: i64) -> Result<Vec<Investment>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query_as::<_, Investment>(
        "SELECT * FROM investments WHERE user_id = ?1 ORDER BY created_at DESC, id DESC",
    )
    .bind(user_id)
    .fetch_all(exec)
    .await?;
    Ok(rows)
}

/// Active investments whose maturity or pending upgrade is due at `now`
/// (or at their own pinned clock).
pub async fn due_for_refresh<'e, E>(exec: E, now: i64) -> Result<Vec<Investment>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query_as::<_, Investment>(
        r#"
        SELECT * FROM investments
        WHERE  status = ?1
          AND (end_date <= COALESCE(simulated_now, ?2)
               OR upgrade_activation_at <= COALESCE(simulated_now, ?2))
        ORDER  BY id ASC
        "#,
    )
    .bind(InvestmentStatus::Active)
    .bind(now)
    .fetch_all(exec)
    .await?;
    Ok(rows)
}

/// Whether a transaction hash was already used for a deposit or upgrade.
pub async fn tx_hash_in_use<'e, E>(exec: E, tx_hash: &str) -> Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let (n,): (i64,) = sqlx::query_as(
        r#"
        SELECT (SELECT COUNT(*) FROM investments WHERE tx_hash = ?1)
             + (SELECT COUNT(*) FROM upgrades    WHERE tx_hash = ?1)
        "#,
    )
    .bind(tx_hash)
    .fetch_one(exec)
    .await?;
    Ok(n > 0)
}

/// Move every date of an active investment back by `secs` (admin testing aid).
pub async fn shift_dates<'e, E>(exec: E, id: i64, secs: i64, now: i64) -> Result<u64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let affected = sqlx::query(
        r#"
        UPDATE investments SET
            start_date            = start_date - ?2,
            end_date              = end_date - ?2,
            last_rebase_at        = last_rebase_at - ?2,
            bonus_unlocked_at     = bonus_unlocked_at - ?2,
            upgrade_activation_at = upgrade_activation_at - ?2,
            upgrade_requested_at  = upgrade_requested_at - ?2,
            updated_at            = ?3
        WHERE id = ?1 AND status = ?4
        "#,
    )
    .bind(id)
    .bind(secs)
    .bind(now)
    .bind(InvestmentStatus::Active)
    .execute(exec)
    .await?
    .rows_affected();
    Ok(affected)
}

#[derive(Debug, Clone, Default, Serialize, sqlx::FromRow)]
pub struct PlatformStats {
    pub users: i64,
    pub pending_investments: i64,
    pub active_investments: i64,
    pub completed_investments: i64,
    pub active_principal: f64,
    pub pending_withdrawals: i64,
    pub pending_withdrawal_amount: f64,
    pub pending_referral_withdrawals: i64,
    pub referral_commissions: f64,
}

pub async fn platform_stats<'e, E>(exec: E) -> Result<PlatformStats>
where
    E: Executor<'e, Database = Sqlite>,
{
    let stats = sqlx::query_as::<_, PlatformStats>(
        r#"
        SELECT
            (SELECT COUNT(*) FROM users)                                        AS users,
            (SELECT COUNT(*) FROM investments WHERE status = 'PENDING')         AS pending_investments,
            (SELECT COUNT(*) FROM investments WHERE status = 'ACTIVE')          AS active_investments,
            (SELECT COUNT(*) FROM investments WHERE status = 'COMPLETED')       AS completed_investments,
            (SELECT CAST(COALESCE(SUM(amount), 0) AS REAL)
               FROM investments WHERE status = 'ACTIVE')                        AS active_principal,
            (SELECT COUNT(*) FROM withdrawals WHERE status = 'PENDING')         AS pending_withdrawals,
            (SELECT CAST(COALESCE(SUM(amount), 0) AS REAL)
               FROM withdrawals WHERE status = 'PENDING')                       AS pending_withdrawal_amount,
            (SELECT COUNT(*) FROM referral_withdrawals WHERE status = 'PENDING') AS pending_referral_withdrawals,
            (SELECT CAST(COALESCE(SUM(amount), 0) AS REAL)
               FROM referral_earnings)                                          AS referral_commissions
        "#,
    )
    .fetch_one(exec)
    .await?;
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{memory_pool, users};
    use crate::lifecycle::{self, tests::at};

    #[tokio::test]
    async fn insert_save_and_reload() {
        let pool = memory_pool().await;
        let uid = users::insert_user(&pool, "i@x.io", "I", None, 0).await.unwrap();

        let mut inv = lifecycle::tests::pending_investment(1500.0, 6);
        inv.user_id = uid;
        inv.id = insert(&pool, &inv).await.unwrap();

        lifecycle::activate(&mut inv, at(2025, 1, 1)).unwrap();
        inv.tx_hash = Some("ab".repeat(32));
        save(&pool, &inv).await.unwrap();

        let stored = find_owned(&pool, inv.id, uid).await.unwrap().unwrap();
        assert_eq!(stored.status, InvestmentStatus::Active);
        assert_eq!(stored.start_date, Some(at(2025, 1, 1).timestamp()));
        assert_eq!(stored.bonus_unlocked_at, inv.bonus_unlocked_at);
        assert!(find_owned(&pool, inv.id, uid + 1).await.unwrap().is_none());
        assert!(tx_hash_in_use(&pool, &"ab".repeat(32)).await.unwrap());

        let stats = platform_stats(&pool).await.unwrap();
        assert_eq!(stats.active_investments, 1);
        assert_eq!(stats.active_principal, 1500.0);
    }

    #[tokio::test]
    async fn due_rows_respect_pinned_clock() {
        let pool = memory_pool().await;
        let uid = users::insert_user(&pool, "d@x.io", "D", None, 0).await.unwrap();

        let mut inv = lifecycle::tests::pending_investment(500.0, 3);
        inv.user_id = uid;
        inv.id = insert(&pool, &inv).await.unwrap();
        lifecycle::activate(&mut inv, at(2025, 1, 1)).unwrap();
        save(&pool, &inv).await.unwrap();

        let early = at(2025, 2, 1).timestamp();
        assert!(due_for_refresh(&pool, early).await.unwrap().is_empty());

        inv.simulated_now = Some(at(2025, 5, 1).timestamp());
        save(&pool, &inv).await.unwrap();
        assert_eq!(due_for_refresh(&pool, early).await.unwrap().len(), 1);

        shift_dates(&pool, inv.id, 86_400, early).await.unwrap();
        let shifted = find(&pool, inv.id).await.unwrap().unwrap();
        assert_eq!(shifted.start_date, Some(at(2024, 12, 31).timestamp()));

        // Only active investments can be moved.
        let mut done = shifted;
        done.status = InvestmentStatus::Completed;
        save(&pool, &done).await.unwrap();
        assert_eq!(shift_dates(&pool, inv.id, 86_400, early).await.unwrap(), 0);
    }
}
