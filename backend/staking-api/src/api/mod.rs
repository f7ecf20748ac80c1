//! Axum REST API: state, router and shared response shapes.

pub mod admin;
pub mod auth;
pub mod investments;
pub mod referrals;
pub mod reinvest;
pub mod withdrawals;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use axum::{
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::clock::Clock;
use crate::config::Config;
use crate::db;
use crate::errors::{ApiError, Result};
use crate::lifecycle::{self, Figures};
use crate::models::{instant, Investment};
use crate::notify::Notifier;
use crate::packages::Package;

#[derive(Clone)]
pub struct ApiState {
    pub pool: SqlitePool,
    pub config: Config,
    pub clock: Clock,
    pub notifier: Notifier,
}

pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/plans", get(investments::plans))
        .route(
            "/investments",
            post(investments::create).get(investments::list),
        )
        .route("/investments/upgrades", get(investments::list_upgrades))
        .route(
            "/investments/upgrades/:id/confirm",
            post(investments::confirm_upgrade),
        )
        .route(
            "/investments/simulate-date",
            post(investments::simulate_date),
        )
        .route(
            "/investments/:id",
            get(investments::get_one).delete(investments::cancel),
        )
        .route("/investments/:id/confirm", post(investments::confirm))
        .route("/investments/:id/upgrade", post(investments::request_upgrade))
        .route(
            "/investments/:id/early-withdraw",
            post(withdrawals::early_withdraw),
        )
        .route(
            "/investments/:id/partial-withdraw",
            post(withdrawals::partial_withdraw),
        )
        .route("/investments/:id/withdraw", post(withdrawals::withdraw))
        .route("/investments/:id/reinvest", post(reinvest::reinvest))
        .route(
            "/investments/:id/reinvest/history",
            get(reinvest::history),
        )
        .route("/withdrawals", get(withdrawals::list))
        .route("/referrals/stats", get(referrals::stats))
        .route("/referrals/earnings", get(referrals::earnings))
        .route("/referrals/available", get(referrals::available))
        .route("/referrals/withdraw", post(referrals::withdraw))
        .route("/referrals/reinvest", post(referrals::reinvest))
        .route("/admin/users", post(admin::create_user))
        .route("/admin/users/:id/sessions", post(admin::create_session))
        .route("/admin/stats", get(admin::stats))
        .route(
            "/admin/withdrawals/:id/approve",
            post(admin::approve_withdrawal),
        )
        .route(
            "/admin/withdrawals/:id/reject",
            post(admin::reject_withdrawal),
        )
        .route(
            "/admin/referral-withdrawals/:id/approve",
            post(admin::approve_referral_withdrawal),
        )
        .route(
            "/admin/referral-withdrawals/:id/reject",
            post(admin::reject_referral_withdrawal),
        )
        .route(
            "/admin/investments/:id/shift-days",
            post(admin::shift_days),
        )
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ─────────────────────────────────────────────────────────
// Response shapes
// ─────────────────────────────────────────────────────────

/// Success envelope shared by every endpoint.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub data: T,
}

pub fn ok<T: Serialize>(data: T) -> Json<Envelope<T>> {
    Json(Envelope {
        success: true,
        message: None,
        data,
    })
}

pub fn ok_with<T: Serialize>(message: impl Into<String>, data: T) -> Json<Envelope<T>> {
    Json(Envelope {
        success: true,
        message: Some(message.into()),
        data,
    })
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Serialize)]
pub struct PendingUpgradeView {
    pub package: Option<Package>,
    pub rate: f64,
    pub activates_at: DateTime<Utc>,
    pub days_until_activation: i64,
}

/// An investment with its live figures.
#[derive(Debug, Serialize)]
pub struct InvestmentView {
    #[serde(flatten)]
    pub investment: Investment,
    #[serde(flatten)]
    pub figures: Figures,
    pub pending_upgrade: Option<PendingUpgradeView>,
}

impl InvestmentView {
    pub fn new(investment: Investment, now: DateTime<Utc>) -> Self {
        let clock = lifecycle::effective_now(&investment, now);
        let figures = lifecycle::figures(&investment, now);
        let pending_upgrade = match (investment.pending_rate, investment.upgrade_activation_at) {
            (Some(rate), Some(at)) => {
                let activates_at = instant(at);
                Some(PendingUpgradeView {
                    package: investment.pending_package,
                    rate,
                    activates_at,
                    days_until_activation: crate::accrual::days_remaining(activates_at, clock),
                })
            }
            _ => None,
        };
        InvestmentView {
            investment,
            figures,
            pending_upgrade,
        }
    }
}

// ─────────────────────────────────────────────────────────
// Shared helpers
// ─────────────────────────────────────────────────────────

/// `GET /health`
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Load an investment owned by `user_id`, applying any due upgrade or
/// maturity and persisting the change.
pub(crate) async fn load_fresh(
    conn: &mut SqliteConnection,
    id: i64,
    user_id: i64,
    now: DateTime<Utc>,
) -> Result<Investment> {
    let mut inv = db::investments::find_owned(&mut *conn, id, user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Investment not found"))?;
    if lifecycle::refresh(&mut inv, now).changed() {
        db::investments::save(&mut *conn, &inv).await?;
    }
    Ok(inv)
}
