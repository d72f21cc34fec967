//! Auth extractors (§6): bearer-token verification plus the guest-mode
//! coercion rule, implemented via axum 0.8's native `FromRequestParts`
//! (RPITIT, no `async-trait`) — the same pattern the teacher avoids
//! `async-trait` with elsewhere (`ingest::transport::Transport`,
//! `validate::prober::Prober`'s enum dispatch).

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::auth::{verify_token, Claims};
use crate::domain::Role;
use crate::error::AppError;
use crate::store::messages::MessageFilter;

use super::ApiState;

fn bearer_claims(parts: &Parts, state: &ApiState) -> Result<Option<Claims>, AppError> {
    let Some(header) = parts.headers.get(axum::http::header::AUTHORIZATION) else {
        return Ok(None);
    };
    let value = header.to_str().map_err(|_| AppError::Auth("malformed authorization header".into()))?;
    let Some(token) = value.strip_prefix("Bearer ") else {
        return Err(AppError::Auth("expected a bearer token".into()));
    };
    Ok(Some(verify_token(&state.secret_salt, token)?))
}

/// An authenticated user of either role.
pub struct AuthUser(pub Claims);

impl FromRequestParts<ApiState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &ApiState) -> Result<Self, Self::Rejection> {
        match bearer_claims(parts, state)? {
            Some(claims) => Ok(AuthUser(claims)),
            None => Err(AppError::Auth("authentication required".into())),
        }
    }
}

/// An authenticated user holding the `Admin` role. Every `/api/admin/*`
/// handler takes this instead of [`AuthUser`].
pub struct AdminUser(pub Claims);

impl FromRequestParts<ApiState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &ApiState) -> Result<Self, Self::Rejection> {
        let AuthUser(claims) = AuthUser::from_request_parts(parts, state).await?;
        if claims.role != Role::Admin {
            return Err(AppError::Forbidden("admin role required".into()));
        }
        Ok(AdminUser(claims))
    }
}

/// Either an authenticated user or, when `public_dashboard_enabled` is set, an
/// anonymous guest (§6 guest mode). Only the read-only message/statistics
/// handlers accept this extractor.
pub enum Viewer {
    User(Claims),
    Guest,
}

impl FromRequestParts<ApiState> for Viewer {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &ApiState) -> Result<Self, Self::Rejection> {
        match bearer_claims(parts, state)? {
            Some(claims) => Ok(Viewer::User(claims)),
            None if state.guest_mode_enabled() => Ok(Viewer::Guest),
            None => Err(AppError::Auth("authentication required".into())),
        }
    }
}

/// Apply the guest-mode coercion rule (§6) to a filter built from query
/// params: force `time_range` to the last 24 hours and strip every other
/// filter field, independent of whatever the caller requested.
pub fn coerce_guest_filter(mut filter: MessageFilter) -> MessageFilter {
    filter.query = None;
    filter.time_range = crate::store::messages::TimeRange::Last24Hours;
    filter.tags.clear();
    filter.providers.clear();
    filter.min_combined_length = None;
    filter.links_only = false;
    filter.page_size = filter.page_size.min(100);
    filter
}
