//! Referral dashboard, withdrawal and reinvestment of commissions.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::SqliteConnection;
use tracing::info;

use super::auth::AuthUser;
use super::reinvest::{change_message, history_row};
use super::{load_fresh, ok, ok_with, ApiState, InvestmentView};
use crate::accrual::round2;
use crate::db;
use crate::errors::{ApiError, Result};
use crate::lifecycle;
use crate::models::{EarningWithSource, Investment, ReinvestSource, User};
use crate::notify::Event;
use crate::referral::{self, Lock, Summary};
use crate::validation;

#[derive(Debug, Deserialize)]
pub struct WithdrawRequest {
    pub trc20_address: String,
}

#[derive(Debug, Deserialize)]
pub struct ReinvestRequest {
    pub investment_id: i64,
}

#[derive(Debug, Serialize)]
pub struct Stats {
    pub referral_code: String,
    pub level1_count: i64,
    pub level2_count: i64,
    /// Level-1 percent the next referral will earn.
    pub next_referral_percent: f64,
    pub level2_percent: f64,
    pub level1_active_total: f64,
    pub level2_active_total: f64,
    pub required_days: i64,
    #[serde(flatten)]
    pub summary: Summary,
}

#[derive(Debug, Serialize)]
pub struct EarningView {
    #[serde(flatten)]
    pub earning: EarningWithSource,
    pub available: bool,
    pub lock: Option<Lock>,
}

#[derive(Debug, Serialize)]
pub struct Available {
    pub total: f64,
    pub count: usize,
    pub earnings: Vec<EarningWithSource>,
}

#[derive(Debug, Serialize)]
pub struct WithdrawalCreated {
    pub withdrawal_id: i64,
    pub amount: f64,
    pub earning_count: usize,
}

/// Record level-1 and level-2 commissions for a newly paid investment.
/// Returns how many were written.
pub(crate) async fn record_commissions(
    conn: &mut SqliteConnection,
    investor: &User,
    inv: &Investment,
    now: DateTime<Utc>,
) -> Result<usize> {
    let Some(referrer_id) = investor.referred_by else {
        return Ok(0);
    };
    let mut written = 0;

    let position = db::users::referral_position(&mut *conn, referrer_id, investor.id).await?;
    let percent = referral::level_one_percent(position);
    if db::referrals::insert_earning(
        &mut *conn,
        referrer_id,
        investor.id,
        inv.id,
        1,
        percent,
        referral::commission(inv.amount, percent),
        now.timestamp(),
    )
    .await?
    {
        written += 1;
    }

    let referrer = db::users::find_user(&mut *conn, referrer_id).await?;
    if let Some(grand_id) = referrer.and_then(|r| r.referred_by) {
        if db::referrals::insert_earning(
            &mut *conn,
            grand_id,
            investor.id,
            inv.id,
            2,
            referral::LEVEL_TWO_PERCENT,
            referral::commission(inv.amount, referral::LEVEL_TWO_PERCENT),
            now.timestamp(),
        )
        .await?
        {
            written += 1;
        }
    }
    Ok(written)
}

fn available_of(earnings: Vec<EarningWithSource>, now: DateTime<Utc>) -> Available {
    let earnings: Vec<_> = earnings
        .into_iter()
        .filter(|e| referral::is_available(e, now))
        .collect();
    Available {
        total: round2(earnings.iter().map(|e| e.amount).sum()),
        count: earnings.len(),
        earnings,
    }
}

/// Lock every currently available earning; fails when there is none.
async fn claim_available(
    conn: &mut SqliteConnection,
    user_id: i64,
    now: DateTime<Utc>,
) -> Result<Available> {
    let earnings = db::referrals::earnings_for(&mut *conn, user_id).await?;
    let available = available_of(earnings, now);
    if available.count == 0 {
        return Err(ApiError::bad_request(
            "No referral earnings available yet",
        ));
    }
    for e in &available.earnings {
        if !db::referrals::mark_withdrawn(&mut *conn, e.id, now.timestamp()).await? {
            return Err(ApiError::conflict("Referral earnings changed, try again"));
        }
    }
    Ok(available)
}

/// `GET /referrals/stats`
pub async fn stats(
    State(state): State<Arc<ApiState>>,
    AuthUser(user): AuthUser,
) -> Result<impl IntoResponse> {
    let now = state.clock.now();
    let (level1_count, level2_count) = db::users::count_referrals(&state.pool, user.id).await?;
    let (level1_active_total, level2_active_total) =
        db::referrals::active_totals(&state.pool, user.id).await?;
    let earnings = db::referrals::earnings_for(&state.pool, user.id).await?;

    Ok(ok(Stats {
        referral_code: user.referral_code.clone(),
        level1_count,
        level2_count,
        next_referral_percent: referral::level_one_percent(level1_count + 1),
        level2_percent: referral::LEVEL_TWO_PERCENT,
        level1_active_total: round2(level1_active_total),
        level2_active_total: round2(level2_active_total),
        required_days: referral::REQUIRED_DAYS,
        summary: referral::summarize(&earnings, now),
    }))
}

/// `GET /referrals/earnings`
pub async fn earnings(
    State(state): State<Arc<ApiState>>,
    AuthUser(user): AuthUser,
) -> Result<impl IntoResponse> {
    let now = state.clock.now();
    let views: Vec<_> = db::referrals::earnings_for(&state.pool, user.id)
        .await?
        .into_iter()
        .map(|earning| {
            let lock = referral::lock_of(&earning, now);
            EarningView {
                earning,
                available: lock.is_none(),
                lock,
            }
        })
        .collect();
    Ok(ok(views))
}

/// `GET /referrals/available`
pub async fn available(
    State(state): State<Arc<ApiState>>,
    AuthUser(user): AuthUser,
) -> Result<impl IntoResponse> {
    let earnings = db::referrals::earnings_for(&state.pool, user.id).await?;
    Ok(ok(available_of(earnings, state.clock.now())))
}

/// `POST /referrals/withdraw`
pub async fn withdraw(
    State(state): State<Arc<ApiState>>,
    AuthUser(user): AuthUser,
    axum::Json(body): axum::Json<WithdrawRequest>,
) -> Result<impl IntoResponse> {
    let address = validation::require_trc20(&body.trc20_address)?.to_string();
    let now = state.clock.now();

    let mut tx = state.pool.begin().await?;
    let claimed = claim_available(&mut tx, user.id, now).await?;
    let count = claimed.count;
    let withdrawal_id = db::referrals::insert_withdrawal(
        &mut *tx,
        user.id,
        claimed.total,
        count as i64,
        &address,
        now.timestamp(),
    )
    .await?;
    for e in &claimed.earnings {
        db::referrals::insert_withdrawal_item(&mut *tx, withdrawal_id, e.id).await?;
    }
    db::activity::audit(
        &mut *tx,
        Some(user.id),
        None,
        "referral_withdrawal_requested",
        &json!({ "withdrawal_id": withdrawal_id, "amount": claimed.total, "count": count }),
        now.timestamp(),
    )
    .await?;
    tx.commit().await?;

    info!("Referral withdrawal {withdrawal_id} requested by user {} ({})", user.id, claimed.total);
    state.notifier.send(Event::ReferralWithdrawalRequested {
        withdrawal_id,
        user_email: user.email.clone(),
        amount: claimed.total,
        earning_count: count as i64,
        trc20_address: address,
    });

    Ok((
        StatusCode::CREATED,
        ok_with(
            "Referral withdrawal requested",
            WithdrawalCreated {
                withdrawal_id,
                amount: claimed.total,
                earning_count: count,
            },
        ),
    ))
}

#[derive(Debug, Serialize)]
pub struct Reinvested {
    pub amount: f64,
    pub earning_count: usize,
    pub change: lifecycle::PrincipalChange,
    pub investment: InvestmentView,
}

/// `POST /referrals/reinvest`
pub async fn reinvest(
    State(state): State<Arc<ApiState>>,
    AuthUser(user): AuthUser,
    axum::Json(body): axum::Json<ReinvestRequest>,
) -> Result<impl IntoResponse> {
    let now = state.clock.now();

    let mut tx = state.pool.begin().await?;
    let mut inv = load_fresh(&mut tx, body.investment_id, user.id, now).await?;
    let claimed = claim_available(&mut tx, user.id, now).await?;
    let change = lifecycle::apply_principal_increase(&mut inv, claimed.total, None, now)?;
    db::investments::save(&mut *tx, &inv).await?;

    let mut row = history_row(
        &inv,
        ReinvestSource::Referral,
        claimed.total,
        claimed.total,
        &change,
        now.timestamp(),
    );
    row.id = db::activity::insert_reinvest(&mut *tx, &row).await?;
    db::activity::audit(
        &mut *tx,
        Some(user.id),
        Some(inv.id),
        "referral_reinvested",
        &json!({ "reinvest_id": row.id, "amount": claimed.total, "count": claimed.count }),
        now.timestamp(),
    )
    .await?;
    tx.commit().await?;

    Ok(ok_with(
        change_message(&change),
        Reinvested {
            amount: claimed.total,
            earning_count: claimed.count,
            change,
            investment: InvestmentView::new(inv, now),
        },
    ))
}
