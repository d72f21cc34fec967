//! `/api/auth/*` (§6), grounded on
//! `examples/original_source/app/services/auth_service.py`'s login/
//! change-password pair, handler style grounded on
//! `examples/xcorat-araliya-bot/crates/araliya-bot/src/subsystems/comms/axum_channel/api.rs`.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::auth::create_access_token;
use crate::error::AppError;

use super::extractors::AuthUser;
use super::ApiState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub user: PublicUser,
}

#[derive(Debug, Serialize)]
pub struct PublicUser {
    pub username: String,
    pub name: String,
    pub email: String,
    pub role: crate::domain::Role,
}

pub async fn login(
    State(state): State<ApiState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let user = state
        .users
        .authenticate(&req.username, &req.password)?
        .ok_or_else(|| AppError::Auth("invalid username or password".into()))?;

    let access_token = create_access_token(&state.secret_salt, &user.username, user.role)?;
    Ok(Json(LoginResponse {
        access_token,
        token_type: "bearer",
        user: PublicUser { username: user.username, name: user.name, email: user.email, role: user.role },
    }))
}

pub async fn me(State(state): State<ApiState>, AuthUser(claims): AuthUser) -> Result<Json<PublicUser>, AppError> {
    let user = state
        .users
        .get(&claims.sub)?
        .ok_or_else(|| AppError::NotFound(format!("user '{}' not found", claims.sub)))?;
    Ok(Json(PublicUser { username: user.username, name: user.name, email: user.email, role: user.role }))
}

/// Stateless JWTs carry no server-side session to invalidate; this endpoint
/// exists only so the frontend has something to call on sign-out.
pub async fn logout(AuthUser(_claims): AuthUser) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

pub async fn change_own_password(
    State(state): State<ApiState>,
    AuthUser(claims): AuthUser,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    state
        .users
        .authenticate(&claims.sub, &req.old_password)?
        .ok_or_else(|| AppError::Auth("old password is incorrect".into()))?;
    state.users.set_password(&claims.sub, &req.new_password)?;
    Ok(Json(serde_json::json!({ "status": "ok" })))
}
