//! `/api/admin/*` (§6): credentials/channels CRUD, users, maintenance,
//! channel diagnostics, and the link-validation batch engine's REST
//! boundary. Every handler requires [`AdminUser`].

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::domain::{Channel, Credential, Role, User};
use crate::error::AppError;
use crate::store::dedup::DedupMode;
use crate::validate::run_validation_task;

use super::extractors::AdminUser;
use super::ApiState;

// --- credentials -----------------------------------------------------------

pub async fn list_credentials(State(state): State<ApiState>, _admin: AdminUser) -> Result<Json<Vec<Credential>>, AppError> {
    Ok(Json(state.store.list_credentials()?))
}

#[derive(Debug, Deserialize)]
pub struct CreateCredentialRequest {
    pub api_id: String,
    pub api_hash: String,
}

pub async fn create_credential(
    State(state): State<ApiState>,
    _admin: AdminUser,
    Json(req): Json<CreateCredentialRequest>,
) -> Result<Json<Credential>, AppError> {
    Ok(Json(state.store.create_credential(&req.api_id, &req.api_hash)?))
}

pub async fn delete_credential(
    State(state): State<ApiState>,
    _admin: AdminUser,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.store.delete_credential(id)?;
    Ok(Json(serde_json::json!({ "status": "ok" })))
}

// --- channels ---------------------------------------------------------------

pub async fn list_channels(State(state): State<ApiState>, _admin: AdminUser) -> Result<Json<Vec<Channel>>, AppError> {
    Ok(Json(state.store.list_channels()?))
}

#[derive(Debug, Deserialize)]
pub struct ChannelRequest {
    pub username: String,
}

pub async fn create_channel(
    State(state): State<ApiState>,
    _admin: AdminUser,
    Json(req): Json<ChannelRequest>,
) -> Result<Json<Channel>, AppError> {
    Ok(Json(state.store.create_channel(&req.username)?))
}

pub async fn update_channel(
    State(state): State<ApiState>,
    _admin: AdminUser,
    Path(id): Path<i64>,
    Json(req): Json<ChannelRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.store.update_channel(id, &req.username)?;
    Ok(Json(serde_json::json!({ "status": "ok" })))
}

pub async fn delete_channel(
    State(state): State<ApiState>,
    _admin: AdminUser,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.store.delete_channel(id)?;
    Ok(Json(serde_json::json!({ "status": "ok" })))
}

// --- public-dashboard config -------------------------------------------------

#[derive(Debug, Serialize)]
pub struct ConfigResponse {
    pub public_dashboard_enabled: bool,
}

pub async fn get_config(State(state): State<ApiState>, _admin: AdminUser) -> Json<ConfigResponse> {
    Json(ConfigResponse { public_dashboard_enabled: state.guest_mode_enabled() })
}

#[derive(Debug, Deserialize)]
pub struct PutConfigRequest {
    pub public_dashboard_enabled: bool,
}

pub async fn put_config(
    State(state): State<ApiState>,
    _admin: AdminUser,
    Json(req): Json<PutConfigRequest>,
) -> Result<Json<ConfigResponse>, AppError> {
    crate::config::set_public_dashboard_enabled(&state.env_file_path, req.public_dashboard_enabled)?;
    state.public_dashboard_enabled.store(req.public_dashboard_enabled, std::sync::atomic::Ordering::Relaxed);
    Ok(Json(ConfigResponse { public_dashboard_enabled: req.public_dashboard_enabled }))
}

// --- users -------------------------------------------------------------------

pub async fn list_users(State(state): State<ApiState>, _admin: AdminUser) -> Result<Json<Vec<User>>, AppError> {
    Ok(Json(state.users.list()?))
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    pub role: Role,
}

pub async fn create_user(
    State(state): State<ApiState>,
    _admin: AdminUser,
    Json(req): Json<CreateUserRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.users.create(&req.username, &req.password, &req.name, &req.email, req.role)?;
    Ok(Json(serde_json::json!({ "status": "ok" })))
}

pub async fn get_user(
    State(state): State<ApiState>,
    _admin: AdminUser,
    Path(username): Path<String>,
) -> Result<Json<User>, AppError> {
    let user = state.users.get(&username)?.ok_or_else(|| AppError::NotFound(format!("user '{username}' not found")))?;
    Ok(Json(user))
}

#[derive(Debug, Deserialize, Default)]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
}

pub async fn update_user(
    State(state): State<ApiState>,
    _admin: AdminUser,
    Path(username): Path<String>,
    Json(req): Json<UpdateUserRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.users.update(&username, req.name.as_deref(), req.email.as_deref())?;
    Ok(Json(serde_json::json!({ "status": "ok" })))
}

pub async fn delete_user(
    State(state): State<ApiState>,
    _admin: AdminUser,
    Path(username): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.users.delete(&username)?;
    Ok(Json(serde_json::json!({ "status": "ok" })))
}

#[derive(Debug, Deserialize)]
pub struct SetPasswordRequest {
    pub new_password: String,
}

pub async fn set_user_password(
    State(state): State<ApiState>,
    _admin: AdminUser,
    Path(username): Path<String>,
    Json(req): Json<SetPasswordRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.users.set_password(&username, &req.new_password)?;
    Ok(Json(serde_json::json!({ "status": "ok" })))
}

#[derive(Debug, Deserialize)]
pub struct SetUsernameRequest {
    pub new_username: String,
}

pub async fn set_username(
    State(state): State<ApiState>,
    _admin: AdminUser,
    Path(username): Path<String>,
    Json(req): Json<SetUsernameRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.users.set_username(&username, &req.new_username)?;
    Ok(Json(serde_json::json!({ "status": "ok" })))
}

#[derive(Debug, Deserialize)]
pub struct SetRoleRequest {
    pub role: Role,
}

pub async fn set_role(
    State(state): State<ApiState>,
    _admin: AdminUser,
    Path(username): Path<String>,
    Json(req): Json<SetRoleRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.users.set_role(&username, req.role)?;
    Ok(Json(serde_json::json!({ "status": "ok" })))
}

#[derive(Debug, Serialize)]
pub struct GeneratedCredentialResponse {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct BulkRandomCreateRequest {
    pub count: usize,
    #[serde(default = "default_role_user")]
    pub role: Role,
}

fn default_role_user() -> Role {
    Role::User
}

pub async fn bulk_random_create(
    State(state): State<ApiState>,
    _admin: AdminUser,
    Json(req): Json<BulkRandomCreateRequest>,
) -> Result<Json<Vec<GeneratedCredentialResponse>>, AppError> {
    let created = state.users.bulk_random_create(req.count, req.role)?;
    Ok(Json(
        created.into_iter().map(|c| GeneratedCredentialResponse { username: c.username, password: c.password }).collect(),
    ))
}

#[derive(Debug, Deserialize)]
pub struct UsernamesRequest {
    pub usernames: Vec<String>,
}

pub async fn bulk_delete(
    State(state): State<ApiState>,
    _admin: AdminUser,
    Json(req): Json<UsernamesRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.users.bulk_delete(&req.usernames)?;
    Ok(Json(serde_json::json!({ "status": "ok" })))
}

pub async fn bulk_reset_password(
    State(state): State<ApiState>,
    _admin: AdminUser,
    Json(req): Json<UsernamesRequest>,
) -> Result<Json<Vec<GeneratedCredentialResponse>>, AppError> {
    let reset = state.users.bulk_reset_password(&req.usernames)?;
    Ok(Json(
        reset.into_iter().map(|c| GeneratedCredentialResponse { username: c.username, password: c.password }).collect(),
    ))
}

pub async fn export_all_users(State(state): State<ApiState>, _admin: AdminUser) -> Result<Json<Vec<User>>, AppError> {
    Ok(Json(state.users.export_all()?))
}

// --- maintenance ---------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct FixTagsResponse {
    pub updated: i64,
}

pub async fn fix_tags(State(state): State<ApiState>, _admin: AdminUser) -> Result<Json<FixTagsResponse>, AppError> {
    Ok(Json(FixTagsResponse { updated: state.store.fix_tags()? }))
}

#[derive(Debug, Deserialize, Default)]
pub struct DedupLinksRequest {
    #[serde(default)]
    pub mode: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DedupLinksResponse {
    pub inserted: i64,
    pub deleted: i64,
}

pub async fn dedup_links(
    State(state): State<ApiState>,
    _admin: AdminUser,
    Json(req): Json<DedupLinksRequest>,
) -> Result<Json<DedupLinksResponse>, AppError> {
    let mode = match req.mode.as_deref() {
        Some("streaming") | Some("dedup-links-fast") => DedupMode::Streaming,
        _ => DedupMode::Strict,
    };
    let outcome = state.store.dedup(mode, crate::time::now_local())?;
    Ok(Json(DedupLinksResponse { inserted: outcome.inserted, deleted: outcome.deleted }))
}

pub async fn clear_link_check_data(
    State(state): State<ApiState>,
    _admin: AdminUser,
) -> Result<Json<serde_json::Value>, AppError> {
    state.store.clear_link_check_data()?;
    Ok(Json(serde_json::json!({ "status": "ok" })))
}

#[derive(Debug, Deserialize)]
pub struct ClearOldLinkCheckDataRequest {
    pub days: i64,
}

#[derive(Debug, Serialize)]
pub struct ClearOldLinkCheckDataResponse {
    pub deleted: i64,
}

pub async fn clear_old_link_check_data(
    State(state): State<ApiState>,
    _admin: AdminUser,
    Json(req): Json<ClearOldLinkCheckDataRequest>,
) -> Result<Json<ClearOldLinkCheckDataResponse>, AppError> {
    let deleted = state.store.clear_old_link_check_data(req.days, crate::time::now_local())?;
    Ok(Json(ClearOldLinkCheckDataResponse { deleted }))
}

// --- channel diagnostics ---------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ChannelsDiagnoseRequest {
    #[serde(default)]
    pub channels: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ChannelDiagnosis {
    pub channel: String,
    pub ok: bool,
    pub error: Option<String>,
}

pub async fn diagnose_channels(
    State(state): State<ApiState>,
    _admin: AdminUser,
    Json(req): Json<ChannelsDiagnoseRequest>,
) -> Result<Json<Vec<ChannelDiagnosis>>, AppError> {
    let channels = if req.channels.is_empty() {
        state.store.list_channels()?.into_iter().map(|c| c.username).collect()
    } else {
        req.channels
    };

    let mut results = Vec::with_capacity(channels.len());
    for channel in channels {
        let outcome = state.transport.diagnose_channel(&channel).await;
        results.push(match outcome {
            Ok(()) => ChannelDiagnosis { channel, ok: true, error: None },
            Err(e) => ChannelDiagnosis { channel, ok: false, error: Some(e) },
        });
    }
    Ok(Json(results))
}

#[derive(Debug, Deserialize)]
pub struct TestMonitorRequest {
    pub channel: String,
}

#[derive(Debug, Serialize)]
pub struct TestMonitorResponse {
    pub channel: String,
    pub message_received: bool,
}

/// Wait up to 5 seconds for a message on `channel`, per SPEC_FULL.md §6
/// supplement.
const TEST_MONITOR_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

pub async fn test_monitor(
    State(state): State<ApiState>,
    _admin: AdminUser,
    Json(req): Json<TestMonitorRequest>,
) -> Result<Json<TestMonitorResponse>, AppError> {
    let message_received = state.transport.test_monitor(&req.channel, TEST_MONITOR_TIMEOUT).await;
    Ok(Json(TestMonitorResponse { channel: req.channel, message_received }))
}

// --- link-validation batch engine ------------------------------------------

#[derive(Debug, Deserialize)]
pub struct StartLinkCheckRequest {
    pub period: String,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    #[serde(default)]
    pub full_history: bool,
}

fn default_max_concurrent() -> usize {
    crate::validate::limits::MAX_CONCURRENT_GLOBAL
}

#[derive(Debug, Serialize)]
pub struct StartLinkCheckResponse {
    pub task_id: String,
}

pub async fn start_link_check(
    State(state): State<ApiState>,
    _admin: AdminUser,
    Json(req): Json<StartLinkCheckRequest>,
) -> Result<Json<StartLinkCheckResponse>, AppError> {
    // Validate the period specifier eagerly so a malformed request gets a
    // 400 instead of silently failing inside the spawned task.
    crate::time::parse_period(&req.period, crate::time::now_local())?;

    let task_id = uuid::Uuid::now_v7().to_string();
    let cancel = CancellationToken::new();

    let store = state.store.clone();
    let registry = state.registry.clone();
    let breaker = state.breaker.clone();
    let prober = state.prober.clone();
    let period = req.period.clone();
    let max_concurrent = req.max_concurrent;
    let full_history = req.full_history;
    let spawned_id = task_id.clone();

    tokio::spawn(async move {
        if let Err(e) =
            run_validation_task(spawned_id, &store, &registry, &breaker, &prober, &period, max_concurrent, full_history, cancel)
                .await
        {
            tracing::warn!(error = %e, "validation task exited with an error");
        }
    });

    Ok(Json(StartLinkCheckResponse { task_id }))
}

#[derive(Debug, Serialize)]
pub struct LinkCheckTaskResponse {
    pub task_id: String,
    pub status: crate::domain::TaskStatus,
    pub total_links: i64,
    pub completed: i64,
    pub valid: i64,
    pub invalid: i64,
    pub failure_reason: Option<String>,
}

pub async fn link_check_task(
    State(state): State<ApiState>,
    _admin: AdminUser,
    Path(task_id): Path<String>,
) -> Result<Json<LinkCheckTaskResponse>, AppError> {
    let snapshot = state
        .registry
        .snapshot(&task_id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("task {task_id} not found")))?;
    Ok(Json(LinkCheckTaskResponse {
        task_id,
        status: snapshot.status,
        total_links: snapshot.total_links,
        completed: snapshot.completed,
        valid: snapshot.valid,
        invalid: snapshot.invalid,
        failure_reason: snapshot.failure_reason,
    }))
}

#[derive(Debug, Deserialize, Default)]
pub struct RecentTasksQuery {
    pub limit: Option<i64>,
}

pub async fn recent_link_check_tasks(
    State(state): State<ApiState>,
    _admin: AdminUser,
    Query(query): Query<RecentTasksQuery>,
) -> Result<Json<Vec<crate::domain::LinkCheckStats>>, AppError> {
    Ok(Json(state.store.recent_link_check_stats(query.limit.unwrap_or(20))?))
}

pub async fn link_check_result(
    State(state): State<ApiState>,
    _admin: AdminUser,
    Path(check_time): Path<String>,
) -> Result<Json<crate::domain::LinkCheckStats>, AppError> {
    let recent = state.store.recent_link_check_stats(100)?;
    let target = crate::store::dt_from_text(&check_time)?;
    recent
        .into_iter()
        .find(|s| s.check_time == target)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("no link-check result at {check_time}")))
}

/// Cancel a running task (cooperative — see `validate::task`'s module doc).
/// No-op if the task is unknown or already finished.
pub async fn cancel_link_check_task(
    State(state): State<ApiState>,
    _admin: AdminUser,
    Path(task_id): Path<String>,
) -> Json<serde_json::Value> {
    state.registry.cancel(&task_id).await;
    Json(serde_json::json!({ "status": "ok" }))
}
