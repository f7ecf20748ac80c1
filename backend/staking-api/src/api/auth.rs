//! Request authentication: bearer session tokens for investors and a
//! shared key for administrators.

use std::sync::Arc;

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use constant_time_eq::constant_time_eq;
use rand::{distr::Alphanumeric, Rng};

use super::ApiState;
use crate::db;
use crate::errors::ApiError;
use crate::models::User;

pub const ADMIN_KEY_HEADER: &str = "x-admin-key";

const REFERRAL_CODE_LEN: usize = 8;

/// The investor making the request.
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

#[axum::async_trait]
impl FromRequestParts<Arc<ApiState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<ApiState>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ApiError::Unauthorized("Missing bearer token".to_string()))?;

        let now = state.clock.now().timestamp();
        let user = db::users::user_for_token(&state.pool, token, now)
            .await?
            .ok_or_else(|| ApiError::Unauthorized("Invalid or expired session".to_string()))?;
        Ok(AuthUser(user))
    }
}

/// Marker extractor: the request carries the configured admin key.
#[derive(Debug, Clone, Copy)]
pub struct AdminKey;

#[axum::async_trait]
impl FromRequestParts<Arc<ApiState>> for AdminKey {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<ApiState>,
    ) -> Result<Self, Self::Rejection> {
        let provided = parts
            .headers
            .get(ADMIN_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::Unauthorized("Missing admin key".to_string()))?;
        if !constant_time_eq(provided.as_bytes(), state.config.admin_api_key.as_bytes()) {
            return Err(ApiError::Forbidden("Invalid admin key".to_string()));
        }
        Ok(AdminKey)
    }
}

/// Random 32-byte session token, hex encoded.
pub fn new_session_token() -> String {
    let bytes: [u8; 32] = rand::random();
    hex::encode(bytes)
}

pub fn new_referral_code() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(REFERRAL_CODE_LEN)
        .map(char::from)
        .collect::<String>()
        .to_ascii_uppercase()
}
