//! JWT issuance and verification (§6 Authentication), grounded on
//! `examples/original_source/app/services/auth_service.py`'s
//! `create_access_token`/`verify_token` pair.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::domain::Role;
use crate::error::AppError;

/// 30 days, matching the original `streamlit-authenticator`-compatible
/// expiry (`30 * 24 * 60` minutes).
const EXPIRY_DAYS: i64 = 30;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Username.
    pub sub: String,
    pub role: Role,
    pub exp: i64,
}

/// Sign a bearer token for `username`/`role` using `secret_salt` as the
/// HMAC-SHA-256 key.
pub fn create_access_token(secret_salt: &str, username: &str, role: Role) -> Result<String, AppError> {
    let exp = (Utc::now() + Duration::days(EXPIRY_DAYS)).timestamp();
    let claims = Claims { sub: username.to_string(), role, exp };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret_salt.as_bytes()))
        .map_err(|e| AppError::Auth(format!("failed to sign token: {e}")))
}

/// Verify and decode a bearer token, rejecting expired or mis-signed tokens.
pub fn verify_token(secret_salt: &str, token: &str) -> Result<Claims, AppError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret_salt.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| AppError::Auth(format!("invalid token: {e}")))
}
