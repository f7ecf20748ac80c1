//! Withdrawal requests: early exit, partial (profit or bonus) and full.
//!
//! Every request starts `PENDING` and is paid out by an administrator.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::SqliteConnection;
use tracing::info;

use super::auth::AuthUser;
use super::{load_fresh, ok, ok_with, ApiState, InvestmentView};
use crate::accrual::round2;
use crate::db;
use crate::errors::{ApiError, Result};
use crate::lifecycle;
use crate::models::{RequestStatus, Withdrawal, WithdrawalKind};
use crate::notify::Event;
use crate::validation;

#[derive(Debug, Default, Deserialize)]
pub struct EarlyWithdrawRequest {
    pub trc20_address: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartialKind {
    #[default]
    Profit,
    Bonus,
}

#[derive(Debug, Deserialize)]
pub struct PartialWithdrawRequest {
    /// Profit to withdraw; everything available when omitted.
    pub amount: Option<f64>,
    pub trc20_address: String,
    #[serde(default)]
    pub kind: PartialKind,
}

#[derive(Debug, Deserialize)]
pub struct WithdrawRequest {
    pub trc20_address: String,
}

#[derive(Debug, Serialize)]
pub struct WithdrawalCreated {
    pub withdrawal: Withdrawal,
    pub investment: InvestmentView,
}

fn pending_request(
    investment_id: i64,
    user_id: i64,
    kind: WithdrawalKind,
    amount: f64,
    trc20_address: Option<String>,
    now: i64,
) -> Withdrawal {
    Withdrawal {
        id: 0,
        investment_id,
        user_id,
        kind,
        amount,
        forfeited_interest: 0.0,
        days_invested: 0,
        trc20_address,
        status: RequestStatus::Pending,
        requested_at: now,
        processed_at: None,
        note: None,
    }
}

/// An exit is quoted from what is left after reservations, so it must wait
/// until pending profit and bonus payouts are resolved.
async fn ensure_no_pending_payout(conn: &mut SqliteConnection, investment_id: i64) -> Result<()> {
    if db::activity::pending_payout_exists(&mut *conn, investment_id).await? {
        return Err(ApiError::conflict(
            "A profit or bonus withdrawal for this investment is still pending",
        ));
    }
    Ok(())
}

/// `POST /investments/:id/early-withdraw`
pub async fn early_withdraw(
    State(state): State<Arc<ApiState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
    body: Option<axum::Json<EarlyWithdrawRequest>>,
) -> Result<impl IntoResponse> {
    let body = body.map(|b| b.0).unwrap_or_default();
    let address = match body.trc20_address.as_deref().map(str::trim) {
        Some(a) if !a.is_empty() => Some(validation::require_trc20(a)?.to_string()),
        _ => None,
    };
    let now = state.clock.now();

    let mut tx = state.pool.begin().await?;
    let mut inv = load_fresh(&mut tx, id, user.id, now).await?;
    if inv.withdrawal_requested || db::activity::pending_exit_exists(&mut *tx, inv.id).await? {
        return Err(ApiError::conflict(
            "Withdrawal already requested for this investment",
        ));
    }
    ensure_no_pending_payout(&mut tx, inv.id).await?;
    let quote = lifecycle::early_withdrawal_quote(&inv, now)?;

    let mut withdrawal = pending_request(
        inv.id,
        user.id,
        WithdrawalKind::Early,
        round2(quote.payout),
        address,
        now.timestamp(),
    );
    withdrawal.forfeited_interest = round2(quote.forfeited_interest);
    withdrawal.days_invested = quote.days_invested;
    withdrawal.id = db::activity::insert_withdrawal(&mut *tx, &withdrawal).await?;

    inv.withdrawal_requested = true;
    inv.updated_at = now.timestamp();
    db::investments::save(&mut *tx, &inv).await?;
    db::activity::audit(
        &mut *tx,
        Some(user.id),
        Some(inv.id),
        "early_withdrawal_requested",
        &json!({ "withdrawal_id": withdrawal.id, "quote": &quote }),
        now.timestamp(),
    )
    .await?;
    tx.commit().await?;

    info!(
        "Early withdrawal {} requested for investment {} ({} USDT)",
        withdrawal.id, inv.id, withdrawal.amount
    );
    state.notifier.send(Event::EarlyWithdrawalRequested {
        withdrawal_id: withdrawal.id,
        investment_id: inv.id,
        user_email: user.email.clone(),
        amount: withdrawal.amount,
        forfeited_interest: withdrawal.forfeited_interest,
        days_invested: withdrawal.days_invested,
    });

    Ok((
        StatusCode::CREATED,
        ok_with(
            "Early withdrawal requested. Earned interest is forfeited.",
            WithdrawalCreated {
                withdrawal,
                investment: InvestmentView::new(inv, now),
            },
        ),
    ))
}

/// `POST /investments/:id/partial-withdraw`
pub async fn partial_withdraw(
    State(state): State<Arc<ApiState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
    axum::Json(body): axum::Json<PartialWithdrawRequest>,
) -> Result<impl IntoResponse> {
    let address = validation::require_trc20(&body.trc20_address)?.to_string();
    let now = state.clock.now();

    let mut tx = state.pool.begin().await?;
    let mut inv = load_fresh(&mut tx, id, user.id, now).await?;

    let (kind, amount) = match body.kind {
        PartialKind::Profit => {
            let clock = lifecycle::effective_now(&inv, now);
            let amount = match body.amount {
                Some(a) => a,
                // Whole cents only, never more than is available.
                None => (lifecycle::available_profit(&inv, clock) * 100.0).floor() / 100.0,
            };
            lifecycle::withdraw_profit(&mut inv, amount, now)?;
            (WithdrawalKind::Profit, amount)
        }
        PartialKind::Bonus => (WithdrawalKind::Bonus, lifecycle::claim_bonus(&mut inv, now)?),
    };

    let mut withdrawal = pending_request(
        inv.id,
        user.id,
        kind,
        amount,
        Some(address.clone()),
        now.timestamp(),
    );
    withdrawal.id = db::activity::insert_withdrawal(&mut *tx, &withdrawal).await?;
    db::investments::save(&mut *tx, &inv).await?;
    db::activity::audit(
        &mut *tx,
        Some(user.id),
        Some(inv.id),
        "partial_withdrawal_requested",
        &json!({ "withdrawal_id": withdrawal.id, "kind": kind, "amount": amount }),
        now.timestamp(),
    )
    .await?;
    tx.commit().await?;

    state.notifier.send(Event::WithdrawalRequested {
        withdrawal_id: withdrawal.id,
        investment_id: inv.id,
        user_email: user.email.clone(),
        kind: format!("{kind:?}").to_lowercase(),
        amount: withdrawal.amount,
        trc20_address: Some(address),
    });

    Ok((
        StatusCode::CREATED,
        ok_with(
            "Withdrawal requested",
            WithdrawalCreated {
                withdrawal,
                investment: InvestmentView::new(inv, now),
            },
        ),
    ))
}

/// `POST /investments/:id/withdraw`
pub async fn withdraw(
    State(state): State<Arc<ApiState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
    axum::Json(body): axum::Json<WithdrawRequest>,
) -> Result<impl IntoResponse> {
    let address = validation::require_trc20(&body.trc20_address)?.to_string();
    let now = state.clock.now();

    let mut tx = state.pool.begin().await?;
    let mut inv = load_fresh(&mut tx, id, user.id, now).await?;
    if db::activity::pending_exit_exists(&mut *tx, inv.id).await? {
        return Err(ApiError::conflict(
            "Withdrawal already requested for this investment",
        ));
    }
    ensure_no_pending_payout(&mut tx, inv.id).await?;
    let quote = lifecycle::full_withdrawal_quote(&inv, now)?;

    let mut withdrawal = pending_request(
        inv.id,
        user.id,
        WithdrawalKind::Full,
        round2(quote.payout),
        Some(address.clone()),
        now.timestamp(),
    );
    withdrawal.note = Some(format!(
        "principal {:.2}, profit {:.2}, bonus {:.2}",
        quote.principal, quote.profit, quote.bonus
    ));
    withdrawal.id = db::activity::insert_withdrawal(&mut *tx, &withdrawal).await?;

    inv.withdrawal_requested = true;
    inv.updated_at = now.timestamp();
    db::investments::save(&mut *tx, &inv).await?;
    db::activity::audit(
        &mut *tx,
        Some(user.id),
        Some(inv.id),
        "withdrawal_requested",
        &json!({ "withdrawal_id": withdrawal.id, "quote": &quote }),
        now.timestamp(),
    )
    .await?;
    tx.commit().await?;

    state.notifier.send(Event::WithdrawalRequested {
        withdrawal_id: withdrawal.id,
        investment_id: inv.id,
        user_email: user.email.clone(),
        kind: "full".to_string(),
        amount: withdrawal.amount,
        trc20_address: Some(address),
    });

    Ok((
        StatusCode::CREATED,
        ok_with(
            "Withdrawal requested",
            WithdrawalCreated {
                withdrawal,
                investment: InvestmentView::new(inv, now),
            },
        ),
    ))
}

/// `GET /withdrawals`
pub async fn list(
    State(state): State<Arc<ApiState>>,
    AuthUser(user): AuthUser,
) -> Result<impl IntoResponse> {
    let rows = db::activity::list_withdrawals(&state.pool, user.id).await?;
    Ok(ok(rows))
}
