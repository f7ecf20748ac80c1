//! Operator endpoints, guarded by the `x-admin-key` header.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::SqliteConnection;
use tracing::{info, warn};

use super::auth::{new_referral_code, new_session_token, AdminKey};
use super::{ok, ok_with, ApiState, InvestmentView};
use crate::db;
use crate::errors::{ApiError, Result};
use crate::lifecycle;
use crate::models::{InvestmentStatus, RequestStatus, User, WithdrawalKind};

const REFERRAL_CODE_ATTEMPTS: usize = 5;
const MAX_SHIFT_DAYS: i64 = 3650;

#[derive(Debug, Deserialize)]
pub struct CreateUser {
    pub email: String,
    /// Referral code of the inviting user.
    pub referral_code: Option<String>,
}

/// A user with a freshly issued session token.
#[derive(Debug, Serialize)]
pub struct UserSession {
    pub user: User,
    pub token: String,
    pub expires_at: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct Resolution {
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ShiftDays {
    pub days: i64,
}

/// `POST /admin/users`
pub async fn create_user(
    State(state): State<Arc<ApiState>>,
    _admin: AdminKey,
    axum::Json(body): axum::Json<CreateUser>,
) -> Result<impl IntoResponse> {
    let email = body.email.trim().to_lowercase();
    if email.len() < 3 || !email.contains('@') {
        return Err(ApiError::bad_request("Invalid email address"));
    }
    let now = state.clock.now();

    let mut tx = state.pool.begin().await?;
    if db::users::find_by_email(&mut *tx, &email).await?.is_some() {
        return Err(ApiError::conflict("A user with this email already exists"));
    }
    let referred_by = match body.referral_code.as_deref().map(str::trim) {
        Some(code) if !code.is_empty() => Some(
            db::users::find_by_referral_code(&mut *tx, &code.to_ascii_uppercase())
                .await?
                .ok_or_else(|| ApiError::bad_request("Unknown referral code"))?
                .id,
        ),
        _ => None,
    };

    let mut code = None;
    for _ in 0..REFERRAL_CODE_ATTEMPTS {
        let candidate = new_referral_code();
        if db::users::find_by_referral_code(&mut *tx, &candidate)
            .await?
            .is_none()
        {
            code = Some(candidate);
            break;
        }
    }
    let code = code.ok_or_else(|| ApiError::conflict("Could not allocate a referral code"))?;

    let user_id =
        db::users::insert_user(&mut *tx, &email, &code, referred_by, now.timestamp()).await?;
    let (token, expires_at) =
        issue_session(&mut tx, user_id, now, state.config.session_ttl_hours).await?;
    let user = db::users::find_user(&mut *tx, user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    db::activity::audit(
        &mut *tx,
        Some(user_id),
        None,
        "user_created",
        &json!({ "referred_by": referred_by }),
        now.timestamp(),
    )
    .await?;
    tx.commit().await?;

    info!("User {user_id} created (referred by {referred_by:?})");
    Ok((
        StatusCode::CREATED,
        ok(UserSession {
            user,
            token,
            expires_at,
        }),
    ))
}

async fn issue_session(
    conn: &mut SqliteConnection,
    user_id: i64,
    now: DateTime<Utc>,
    ttl_hours: i64,
) -> Result<(String, i64)> {
    let token = new_session_token();
    let expires_at = (now + Duration::hours(ttl_hours)).timestamp();
    db::users::insert_session(&mut *conn, &token, user_id, now.timestamp(), expires_at).await?;
    Ok((token, expires_at))
}

/// `POST /admin/users/:id/sessions`
///
/// Issues a new session token for an existing user, e.g. once the previous
/// one has expired.
pub async fn create_session(
    State(state): State<Arc<ApiState>>,
    _admin: AdminKey,
    Path(user_id): Path<i64>,
) -> Result<impl IntoResponse> {
    let now = state.clock.now();
    let mut tx = state.pool.begin().await?;
    let user = db::users::find_user(&mut *tx, user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    let (token, expires_at) =
        issue_session(&mut tx, user.id, now, state.config.session_ttl_hours).await?;
    db::activity::audit(
        &mut *tx,
        Some(user.id),
        None,
        "session_issued",
        &json!({ "expires_at": expires_at }),
        now.timestamp(),
    )
    .await?;
    tx.commit().await?;

    info!("Session issued for user {}", user.id);
    Ok((
        StatusCode::CREATED,
        ok(UserSession {
            user,
            token,
            expires_at,
        }),
    ))
}

/// `GET /admin/stats`
pub async fn stats(
    State(state): State<Arc<ApiState>>,
    _admin: AdminKey,
) -> Result<impl IntoResponse> {
    let stats = db::investments::platform_stats(&state.pool).await?;
    Ok(ok(stats))
}

/// `POST /admin/withdrawals/:id/approve`
pub async fn approve_withdrawal(
    State(state): State<Arc<ApiState>>,
    _admin: AdminKey,
    Path(id): Path<i64>,
    body: Option<axum::Json<Resolution>>,
) -> Result<impl IntoResponse> {
    let note = body.and_then(|b| b.0.note);
    resolve_withdrawal(&state, id, RequestStatus::Approved, note).await
}

/// `POST /admin/withdrawals/:id/reject`
pub async fn reject_withdrawal(
    State(state): State<Arc<ApiState>>,
    _admin: AdminKey,
    Path(id): Path<i64>,
    body: Option<axum::Json<Resolution>>,
) -> Result<impl IntoResponse> {
    let note = body.and_then(|b| b.0.note);
    resolve_withdrawal(&state, id, RequestStatus::Rejected, note).await
}

async fn resolve_withdrawal(
    state: &ApiState,
    id: i64,
    status: RequestStatus,
    note: Option<String>,
) -> Result<impl IntoResponse> {
    let now = state.clock.now();
    let mut tx = state.pool.begin().await?;
    let withdrawal = db::activity::find_withdrawal(&mut *tx, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Withdrawal not found"))?;
    if !db::activity::resolve_withdrawal(&mut *tx, id, status, note.as_deref(), now.timestamp())
        .await?
    {
        return Err(ApiError::bad_request("Withdrawal was already processed"));
    }

    let mut inv = db::investments::find(&mut *tx, withdrawal.investment_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Investment not found"))?;
    lifecycle::refresh(&mut inv, now);

    match (status, withdrawal.kind) {
        (RequestStatus::Approved, WithdrawalKind::Full | WithdrawalKind::Early) => {
            inv.status = InvestmentStatus::Withdrawn;
            inv.completed_at = Some(now.timestamp());
        }
        (RequestStatus::Rejected, WithdrawalKind::Full | WithdrawalKind::Early) => {
            inv.withdrawal_requested = false;
        }
        (RequestStatus::Rejected, WithdrawalKind::Profit) => {
            lifecycle::release_profit(&mut inv, withdrawal.amount);
        }
        (RequestStatus::Rejected, WithdrawalKind::Bonus) => {
            inv.bonus_withdrawn = false;
        }
        _ => {}
    }
    inv.updated_at = now.timestamp();
    db::investments::save(&mut *tx, &inv).await?;
    db::activity::audit(
        &mut *tx,
        Some(withdrawal.user_id),
        Some(inv.id),
        "withdrawal_resolved",
        &json!({ "withdrawal_id": id, "kind": withdrawal.kind, "status": status }),
        now.timestamp(),
    )
    .await?;
    tx.commit().await?;

    info!("Withdrawal {id} {status:?}");
    let withdrawal = db::activity::find_withdrawal(&state.pool, id).await?;
    Ok(ok_with(
        format!("Withdrawal {}", if status == RequestStatus::Approved { "approved" } else { "rejected" }),
        withdrawal,
    ))
}

/// `POST /admin/referral-withdrawals/:id/approve`
pub async fn approve_referral_withdrawal(
    State(state): State<Arc<ApiState>>,
    _admin: AdminKey,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse> {
    resolve_referral_withdrawal(&state, id, RequestStatus::Approved).await
}

/// `POST /admin/referral-withdrawals/:id/reject`
pub async fn reject_referral_withdrawal(
    State(state): State<Arc<ApiState>>,
    _admin: AdminKey,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse> {
    resolve_referral_withdrawal(&state, id, RequestStatus::Rejected).await
}

async fn resolve_referral_withdrawal(
    state: &ApiState,
    id: i64,
    status: RequestStatus,
) -> Result<impl IntoResponse> {
    let now = state.clock.now().timestamp();
    let mut tx = state.pool.begin().await?;
    let withdrawal = db::referrals::find_withdrawal(&mut *tx, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Referral withdrawal not found"))?;
    if !db::referrals::resolve_withdrawal(&mut *tx, id, status, now).await? {
        return Err(ApiError::bad_request(
            "Referral withdrawal was already processed",
        ));
    }
    if status == RequestStatus::Rejected {
        let released = db::referrals::release_withdrawal_items(&mut *tx, id).await?;
        warn!("Referral withdrawal {id} rejected, {released} earning(s) unlocked");
    }
    db::activity::audit(
        &mut *tx,
        Some(withdrawal.user_id),
        None,
        "referral_withdrawal_resolved",
        &json!({ "withdrawal_id": id, "status": status }),
        now,
    )
    .await?;
    tx.commit().await?;

    let withdrawal = db::referrals::find_withdrawal(&state.pool, id).await?;
    Ok(ok(withdrawal))
}

/// `POST /admin/investments/:id/shift-days`
///
/// Moves every date of an active investment back by `days`, as if it had
/// started earlier.
pub async fn shift_days(
    State(state): State<Arc<ApiState>>,
    _admin: AdminKey,
    Path(id): Path<i64>,
    axum::Json(body): axum::Json<ShiftDays>,
) -> Result<impl IntoResponse> {
    if body.days <= 0 || body.days > MAX_SHIFT_DAYS {
        return Err(ApiError::bad_request(format!(
            "days must be between 1 and {MAX_SHIFT_DAYS}"
        )));
    }
    let now = state.clock.now();

    let mut tx = state.pool.begin().await?;
    let shifted = db::investments::shift_dates(
        &mut *tx,
        id,
        Duration::days(body.days).num_seconds(),
        now.timestamp(),
    )
    .await?;
    if shifted == 0 {
        return Err(ApiError::not_found("Active investment not found"));
    }
    let mut inv = db::investments::find(&mut *tx, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Investment not found"))?;
    if lifecycle::refresh(&mut inv, now).changed() {
        db::investments::save(&mut *tx, &inv).await?;
    }
    db::activity::audit(
        &mut *tx,
        Some(inv.user_id),
        Some(inv.id),
        "dates_shifted",
        &json!({ "days": body.days }),
        now.timestamp(),
    )
    .await?;
    tx.commit().await?;

    Ok(ok_with(
        format!("Investment dates moved back by {} day(s)", body.days),
        InvestmentView::new(inv, now),
    ))
}
