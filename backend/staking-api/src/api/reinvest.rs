//! Moving accrued profit back into principal.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use super::auth::AuthUser;
use super::{load_fresh, ok, ok_with, ApiState, InvestmentView};
use crate::db;
use crate::errors::{ApiError, Result};
use crate::lifecycle::{self, PrincipalChange};
use crate::models::{Investment, Reinvest, ReinvestSource};

#[derive(Debug, Deserialize)]
pub struct ReinvestRequest {
    pub amount: f64,
}

#[derive(Debug, Serialize)]
pub struct Reinvested {
    pub reinvest: Reinvest,
    pub investment: InvestmentView,
}

/// History row for a principal increase funded from `source`.
pub(crate) fn history_row(
    inv: &Investment,
    source: ReinvestSource,
    amount: f64,
    available_before: f64,
    change: &PrincipalChange,
    now: i64,
) -> Reinvest {
    Reinvest {
        id: 0,
        investment_id: inv.id,
        user_id: inv.user_id,
        source,
        amount,
        available_before,
        old_package: change.old_package,
        new_package: change.new_package,
        old_rate: change.old_rate,
        new_rate: change.new_rate,
        old_amount: change.old_amount,
        new_amount: change.new_amount,
        upgraded: change.upgraded,
        activation_at: change.activation_at.map(|at| at.timestamp()),
        created_at: now,
    }
}

pub(crate) fn change_message(change: &PrincipalChange) -> String {
    match change.activation_at {
        Some(at) if change.upgraded => format!(
            "Reinvested. Your investment moves to {} at {}% from {}.",
            change.new_package,
            change.new_rate,
            at.format("%Y-%m-%d")
        ),
        _ => "Reinvested into your investment.".to_string(),
    }
}

/// `POST /investments/:id/reinvest`
pub async fn reinvest(
    State(state): State<Arc<ApiState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
    axum::Json(body): axum::Json<ReinvestRequest>,
) -> Result<impl IntoResponse> {
    let now = state.clock.now();

    let mut tx = state.pool.begin().await?;
    let mut inv = load_fresh(&mut tx, id, user.id, now).await?;
    let (change, available) = lifecycle::reinvest_profit(&mut inv, body.amount, now)?;
    db::investments::save(&mut *tx, &inv).await?;

    let mut row = history_row(
        &inv,
        ReinvestSource::Profit,
        body.amount,
        available,
        &change,
        now.timestamp(),
    );
    row.id = db::activity::insert_reinvest(&mut *tx, &row).await?;
    db::activity::audit(
        &mut *tx,
        Some(user.id),
        Some(inv.id),
        "profit_reinvested",
        &json!({ "reinvest_id": row.id, "change": &change }),
        now.timestamp(),
    )
    .await?;
    tx.commit().await?;

    info!(
        "Investment {} reinvested {} (upgrade scheduled: {})",
        inv.id, body.amount, change.upgraded
    );
    Ok(ok_with(
        change_message(&change),
        Reinvested {
            reinvest: row,
            investment: InvestmentView::new(inv, now),
        },
    ))
}

/// `GET /investments/:id/reinvest/history`
pub async fn history(
    State(state): State<Arc<ApiState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse> {
    if db::investments::find_owned(&state.pool, id, user.id)
        .await?
        .is_none()
    {
        return Err(ApiError::not_found("Investment not found"));
    }
    let rows = db::activity::list_reinvests(&state.pool, id).await?;
    Ok(ok(rows))
}
