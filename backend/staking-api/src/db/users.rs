//! Users, sessions and staking plans.

use sqlx::{Executor, Sqlite};

use crate::errors::Result;
use crate::models::{StakingPlan, User};

// ─────────────────────────────────────────────────────────
// Users
// ─────────────────────────────────────────────────────────

pub async fn insert_user<'e, E>(
    exec: E,
    email: &str,
    referral_code: &str,
    referred_by: Option<i64>,
    now: i64,
) -> Result<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let id = sqlx::query(
        "INSERT INTO users (email, referral_code, referred_by, created_at) VALUES (?1, ?2, ?3, ?4)",
    )
    .bind(email)
    .bind(referral_code)
    .bind(referred_by)
    .bind(now)
    .execute(exec)
    .await?
    .last_insert_rowid();
    Ok(id)
}

pub async fn find_user<'e, E>(exec: E, id: i64) -> Result<Option<User>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?1")
        .bind(id)
        .fetch_optional(exec)
        .await?;
    Ok(user)
}

pub async fn find_by_email<'e, E>(exec: E, email: &str) -> Result<Option<User>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?1 COLLATE NOCASE")
        .bind(email)
        .fetch_optional(exec)
        .await?;
    Ok(user)
}

pub async fn find_by_referral_code<'e, E>(exec: E, code: &str) -> Result<Option<User>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE referral_code = ?1")
        .bind(code)
        .fetch_optional(exec)
        .await?;
    Ok(user)
}

/// 1-based join position of `user_id` among `referrer_id`'s referrals.
pub async fn referral_position<'e, E>(exec: E, referrer_id: i64, user_id: i64) -> Result<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let (n,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM users WHERE referred_by = ?1 AND id <= ?2")
            .bind(referrer_id)
            .bind(user_id)
            .fetch_one(exec)
            .await?;
    Ok(n)
}

pub async fn count_referrals<'e, E>(exec: E, referrer_id: i64) -> Result<(i64, i64)>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row: (i64, i64) = sqlx::query_as(
        r#"
        SELECT
            (SELECT COUNT(*) FROM users WHERE referred_by = ?1),
            (SELECT COUNT(*) FROM users u
               JOIN users mid ON u.referred_by = mid.id
              WHERE mid.referred_by = ?1)
        "#,
    )
    .bind(referrer_id)
    .fetch_one(exec)
    .await?;
    Ok(row)
}

// ─────────────────────────────────────────────────────────
// Sessions
// ─────────────────────────────────────────────────────────

pub async fn insert_session<'e, E>(
    exec: E,
    token: &str,
    user_id: i64,
    now: i64,
    expires_at: i64,
) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        "INSERT INTO sessions (token, user_id, created_at, expires_at) VALUES (?1, ?2, ?3, ?4)",
    )
    .bind(token)
    .bind(user_id)
    .bind(now)
    .bind(expires_at)
    .execute(exec)
    .await?;
    Ok(())
}

/// User owning an unexpired session token.
pub async fn user_for_token<'e, E>(exec: E, token: &str, now: i64) -> Result<Option<User>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let user = sqlx::query_as::<_, User>(
        r#"
        SELECT u.*
        FROM   sessions s
        JOIN   users u ON u.id = s.user_id
        WHERE  s.token = ?1 AND s.expires_at > ?2
        "#,
    )
    .bind(token)
    .bind(now)
    .fetch_optional(exec)
    .await?;
    Ok(user)
}

// ─────────────────────────────────────────────────────────
// Plans
// ─────────────────────────────────────────────────────────

pub async fn find_plan<'e, E>(exec: E, id: i64) -> Result<Option<StakingPlan>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let plan = sqlx::query_as::<_, StakingPlan>("SELECT * FROM staking_plans WHERE id = ?1")
        .bind(id)
        .fetch_optional(exec)
        .await?;
    Ok(plan)
}

pub async fn list_plans<'e, E>(exec: E) -> Result<Vec<StakingPlan>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let plans = sqlx::query_as::<_, StakingPlan>("SELECT * FROM staking_plans ORDER BY id ASC")
        .fetch_all(exec)
        .await?;
    Ok(plans)
}
