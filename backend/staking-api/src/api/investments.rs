//! Investment creation, payment confirmation, cancellation and upgrades.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use super::auth::AuthUser;
use super::{load_fresh, ok, ok_with, referrals, ApiState, InvestmentView};
use crate::db;
use crate::errors::{ApiError, Result};
use crate::lifecycle::{self, Quote};
use crate::accrual;
use crate::models::{
    Investment, InvestmentStatus, RequestStatus, StakingPlan, Upgrade, UpgradeKind,
};
use crate::notify::Event;
use crate::validation::{self, PaymentInstructions};

const DEFAULT_LANGUAGE: &str = "en";

#[derive(Debug, Deserialize)]
pub struct CreateInvestment {
    pub plan_id: i64,
    pub amount: f64,
    pub duration_months: i64,
    pub wallet_address: String,
    pub language: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmPayment {
    pub tx_hash: String,
}

#[derive(Debug, Deserialize)]
pub struct UpgradeRequest {
    pub additional_amount: f64,
    pub new_package: String,
    pub sender_wallet: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SimulateDate {
    pub investment_id: i64,
    pub simulated_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct Catalogue {
    pub plans: Vec<StakingPlan>,
    /// When an upgrade requested now would take effect.
    pub next_activation_at: DateTime<Utc>,
    pub days_until_activation: i64,
}

#[derive(Debug, Serialize)]
pub struct Created {
    pub investment: InvestmentView,
    pub quote: Quote,
    pub payment: PaymentInstructions,
}

#[derive(Debug, Serialize)]
pub struct UpgradeCreated {
    pub upgrade: Upgrade,
    pub payment: PaymentInstructions,
}

#[derive(Debug, Serialize)]
pub struct UpgradeConfirmed {
    pub upgrade_id: i64,
    pub change: lifecycle::PrincipalChange,
    pub investment: InvestmentView,
}

/// `GET /plans`
pub async fn plans(State(state): State<Arc<ApiState>>) -> Result<impl IntoResponse> {
    let now = state.clock.now();
    let plans = db::users::list_plans(&state.pool).await?;
    Ok(ok(Catalogue {
        plans,
        next_activation_at: accrual::next_activation_date(now),
        days_until_activation: accrual::days_until_activation(now),
    }))
}

/// `POST /investments`
pub async fn create(
    State(state): State<Arc<ApiState>>,
    AuthUser(user): AuthUser,
    axum::Json(body): axum::Json<CreateInvestment>,
) -> Result<impl IntoResponse> {
    let plan = db::users::find_plan(&state.pool, body.plan_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Staking plan not found"))?;
    let quote = lifecycle::quote(body.amount, &plan, body.duration_months)?;
    let wallet = body.wallet_address.trim().to_string();
    let route = validation::deposit_route(&state.config, &wallet)?;

    let now = state.clock.now().timestamp();
    let mut inv = Investment {
        id: 0,
        user_id: user.id,
        plan_id: plan.id,
        package: quote.package,
        amount: body.amount,
        currency: plan.currency.clone(),
        base_rate: quote.base_rate,
        duration_months: body.duration_months,
        duration_bonus: quote.duration_bonus,
        effective_rate: quote.effective_rate,
        cash_bonus: quote.cash_bonus,
        bonus_unlocked_at: None,
        bonus_withdrawn: false,
        expected_profit: quote.expected_profit,
        total_return: quote.total_return,
        user_wallet: wallet,
        admin_wallet: route.admin_wallet.clone(),
        network: route.network.as_str().to_string(),
        status: InvestmentStatus::Pending,
        tx_hash: None,
        start_date: None,
        end_date: None,
        last_rebase_at: None,
        accumulated_interest: 0.0,
        withdrawn_profits: 0.0,
        pending_rate: None,
        pending_package: None,
        upgrade_activation_at: None,
        upgrade_requested_at: None,
        withdrawal_requested: false,
        simulated_now: None,
        language: body
            .language
            .filter(|l| !l.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
        created_at: now,
        updated_at: now,
        completed_at: None,
    };

    let mut tx = state.pool.begin().await?;
    inv.id = db::investments::insert(&mut *tx, &inv).await?;
    db::activity::audit(
        &mut *tx,
        Some(user.id),
        Some(inv.id),
        "investment_created",
        &json!({ "amount": inv.amount, "package": inv.package, "months": inv.duration_months }),
        now,
    )
    .await?;
    tx.commit().await?;

    info!("Investment {} created for user {} ({} {})", inv.id, user.id, inv.amount, inv.currency);

    let payment = PaymentInstructions::new(&route, inv.amount);
    Ok((
        StatusCode::CREATED,
        ok_with(
            "Investment created. Send the payment and confirm it with the transaction hash.",
            Created {
                investment: InvestmentView::new(inv, state.clock.now()),
                quote,
                payment,
            },
        ),
    ))
}

/// `GET /investments`
pub async fn list(
    State(state): State<Arc<ApiState>>,
    AuthUser(user): AuthUser,
) -> Result<impl IntoResponse> {
    let now = state.clock.now();
    let mut tx = state.pool.begin().await?;
    let rows = db::investments::list_for_user(&mut *tx, user.id).await?;
    let mut views = Vec::with_capacity(rows.len());
    for mut inv in rows {
        if lifecycle::refresh(&mut inv, now).changed() {
            db::investments::save(&mut *tx, &inv).await?;
        }
        views.push(InvestmentView::new(inv, now));
    }
    tx.commit().await?;
    Ok(ok(views))
}

/// `GET /investments/:id`
pub async fn get_one(
    State(state): State<Arc<ApiState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse> {
    let now = state.clock.now();
    let mut tx = state.pool.begin().await?;
    let inv = load_fresh(&mut tx, id, user.id, now).await?;
    tx.commit().await?;
    Ok(ok(InvestmentView::new(inv, now)))
}

/// `POST /investments/:id/confirm`
pub async fn confirm(
    State(state): State<Arc<ApiState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
    axum::Json(body): axum::Json<ConfirmPayment>,
) -> Result<impl IntoResponse> {
    let tx_hash = validation::require_tx_hash(&body.tx_hash)?;
    let now = state.clock.now();

    let mut tx = state.pool.begin().await?;
    let mut inv = db::investments::find_owned(&mut *tx, id, user.id)
        .await?
        .ok_or_else(|| ApiError::not_found("Investment not found"))?;
    if db::investments::tx_hash_in_use(&mut *tx, &tx_hash).await? {
        return Err(ApiError::conflict("Transaction hash already used"));
    }

    lifecycle::activate(&mut inv, now)?;
    inv.tx_hash = Some(tx_hash.clone());
    db::investments::save(&mut *tx, &inv).await?;
    let commissions = referrals::record_commissions(&mut tx, &user, &inv, now).await?;
    db::activity::audit(
        &mut *tx,
        Some(user.id),
        Some(inv.id),
        "investment_confirmed",
        &json!({ "tx_hash": tx_hash, "commissions": commissions }),
        now.timestamp(),
    )
    .await?;
    tx.commit().await?;

    info!("Investment {} confirmed ({} referral commission(s))", inv.id, commissions);
    state.notifier.send(Event::InvestmentConfirmed {
        investment_id: inv.id,
        user_email: user.email.clone(),
        package: inv.package.to_string(),
        amount: inv.amount,
        tx_hash,
        network: inv.network.clone(),
    });

    Ok(ok_with(
        "Payment confirmed. Your investment is now active.",
        InvestmentView::new(inv, now),
    ))
}

/// `DELETE /investments/:id`
pub async fn cancel(
    State(state): State<Arc<ApiState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse> {
    let now = state.clock.now();
    let mut tx = state.pool.begin().await?;
    let mut inv = db::investments::find_owned(&mut *tx, id, user.id)
        .await?
        .ok_or_else(|| ApiError::not_found("Investment not found"))?;
    lifecycle::cancel(&mut inv, now)?;
    db::investments::save(&mut *tx, &inv).await?;
    db::activity::audit(
        &mut *tx,
        Some(user.id),
        Some(inv.id),
        "investment_cancelled",
        &json!({}),
        now.timestamp(),
    )
    .await?;
    tx.commit().await?;
    Ok(ok_with("Investment cancelled", InvestmentView::new(inv, now)))
}

/// `POST /investments/:id/upgrade`
pub async fn request_upgrade(
    State(state): State<Arc<ApiState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
    axum::Json(body): axum::Json<UpgradeRequest>,
) -> Result<impl IntoResponse> {
    let now = state.clock.now();
    let sender_wallet = match body.sender_wallet.as_deref().map(str::trim) {
        Some(w) if !w.is_empty() => {
            if validation::Network::of_wallet(w).is_none() {
                return Err(ApiError::bad_request("Invalid sender wallet address"));
            }
            Some(w.to_string())
        }
        _ => None,
    };

    let mut tx = state.pool.begin().await?;
    let inv = load_fresh(&mut tx, id, user.id, now).await?;
    if db::activity::pending_upgrade_exists(&mut *tx, inv.id).await? {
        return Err(ApiError::conflict(
            "An upgrade request for this investment is already awaiting payment",
        ));
    }
    let package = lifecycle::validate_upgrade(&inv, body.additional_amount, &body.new_package, now)?;
    let route = validation::deposit_route(&state.config, &inv.user_wallet)?;

    let mut upgrade = Upgrade {
        id: 0,
        investment_id: inv.id,
        user_id: user.id,
        kind: if package == inv.package {
            UpgradeKind::AmountIncrease
        } else {
            UpgradeKind::PackageChange
        },
        old_package: inv.package,
        new_package: package,
        old_rate: inv.effective_rate,
        new_rate: package.monthly_rate() + inv.duration_bonus,
        additional_amount: body.additional_amount,
        admin_wallet: route.admin_wallet.clone(),
        sender_wallet,
        tx_hash: None,
        activation_at: None,
        status: RequestStatus::Pending,
        requested_at: now.timestamp(),
        processed_at: None,
    };
    upgrade.id = db::activity::insert_upgrade(&mut *tx, &upgrade).await?;
    db::activity::audit(
        &mut *tx,
        Some(user.id),
        Some(inv.id),
        "upgrade_requested",
        &json!({ "upgrade_id": upgrade.id, "package": package, "amount": body.additional_amount }),
        now.timestamp(),
    )
    .await?;
    tx.commit().await?;

    let payment = PaymentInstructions::new(&route, body.additional_amount);
    Ok((
        StatusCode::CREATED,
        ok_with(
            "Upgrade requested. Send the additional amount and confirm it with the transaction hash.",
            UpgradeCreated { upgrade, payment },
        ),
    ))
}

/// `POST /investments/upgrades/:id/confirm`
pub async fn confirm_upgrade(
    State(state): State<Arc<ApiState>>,
    AuthUser(user): AuthUser,
    Path(upgrade_id): Path<i64>,
    axum::Json(body): axum::Json<ConfirmPayment>,
) -> Result<impl IntoResponse> {
    let tx_hash = validation::require_tx_hash(&body.tx_hash)?;
    let now = state.clock.now();

    let mut tx = state.pool.begin().await?;
    let upgrade = db::activity::find_upgrade_owned(&mut *tx, upgrade_id, user.id)
        .await?
        .ok_or_else(|| ApiError::not_found("Upgrade request not found"))?;
    if upgrade.status != RequestStatus::Pending {
        return Err(ApiError::bad_request("Upgrade request was already processed"));
    }
    if db::investments::tx_hash_in_use(&mut *tx, &tx_hash).await? {
        return Err(ApiError::conflict("Transaction hash already used"));
    }

    let mut inv = load_fresh(&mut tx, upgrade.investment_id, user.id, now).await?;
    let change = lifecycle::apply_principal_increase(
        &mut inv,
        upgrade.additional_amount,
        Some(upgrade.new_package),
        now,
    )?;
    db::investments::save(&mut *tx, &inv).await?;
    db::activity::complete_upgrade(
        &mut *tx,
        upgrade.id,
        &tx_hash,
        change.new_rate,
        change.activation_at.map(|at| at.timestamp()),
        now.timestamp(),
    )
    .await?;
    db::activity::audit(
        &mut *tx,
        Some(user.id),
        Some(inv.id),
        "upgrade_confirmed",
        &json!({ "upgrade_id": upgrade.id, "change": &change }),
        now.timestamp(),
    )
    .await?;
    tx.commit().await?;

    let message = match change.activation_at {
        Some(at) if change.upgraded => format!(
            "Upgrade confirmed. The {} rate of {}% applies from {}.",
            change.new_package,
            change.new_rate,
            at.format("%Y-%m-%d")
        ),
        _ => "Additional amount added to your investment.".to_string(),
    };
    Ok(ok_with(
        message,
        UpgradeConfirmed {
            upgrade_id: upgrade.id,
            change,
            investment: InvestmentView::new(inv, now),
        },
    ))
}

/// `GET /investments/upgrades`
pub async fn list_upgrades(
    State(state): State<Arc<ApiState>>,
    AuthUser(user): AuthUser,
) -> Result<impl IntoResponse> {
    let rows = db::activity::list_upgrades(&state.pool, user.id).await?;
    Ok(ok(rows))
}

/// `POST /investments/simulate-date`
pub async fn simulate_date(
    State(state): State<Arc<ApiState>>,
    AuthUser(user): AuthUser,
    axum::Json(body): axum::Json<SimulateDate>,
) -> Result<impl IntoResponse> {
    if !state.config.allow_simulation {
        return Err(ApiError::Forbidden("Date simulation is disabled".to_string()));
    }
    let now = state.clock.now();

    let mut tx = state.pool.begin().await?;
    let mut inv = db::investments::find_owned(&mut *tx, body.investment_id, user.id)
        .await?
        .ok_or_else(|| ApiError::not_found("Investment not found"))?;
    inv.simulated_now = body.simulated_date.map(|d| d.timestamp());
    inv.updated_at = now.timestamp();
    lifecycle::refresh(&mut inv, now);
    db::investments::save(&mut *tx, &inv).await?;
    db::activity::audit(
        &mut *tx,
        Some(user.id),
        Some(inv.id),
        "simulated_date_set",
        &json!({ "simulated_date": body.simulated_date }),
        now.timestamp(),
    )
    .await?;
    tx.commit().await?;

    let message = match body.simulated_date {
        Some(d) => format!("Simulated date set to {}", d.format("%Y-%m-%d")),
        None => "Simulated date cleared".to_string(),
    };
    Ok(ok_with(message, InvestmentView::new(inv, now)))
}
