//! REST API surface (§6), grounded on
//! `examples/xcorat-araliya-bot/crates/araliya-bot/src/subsystems/comms/axum_channel/mod.rs`'s
//! `AxumState`/`Component`/`build_router` shape.

pub mod admin_routes;
pub mod auth_routes;
pub mod extractors;
pub mod messages_routes;
pub mod statistics_routes;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::routing::{get, post, put};
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::auth::UserStore;
use crate::error::AppError;
use crate::ingest::transport::Transport;
use crate::store::Store;
use crate::subsystems::runtime::{Component, ComponentFuture};
use crate::validate::{CircuitBreaker, Prober, TaskRegistry};

/// Shared, cheap-to-clone state handed to every handler, mirroring the
/// teacher's `AxumState` (`Arc`-backed fields, `Clone` derive, no interior
/// locking beyond what each field already provides).
#[derive(Clone)]
pub struct ApiState {
    pub store: Store,
    pub users: UserStore,
    pub registry: Arc<TaskRegistry>,
    pub breaker: Arc<CircuitBreaker>,
    pub prober: Arc<Prober>,
    pub transport: Arc<dyn Transport>,
    pub secret_salt: Arc<str>,
    pub public_dashboard_enabled: Arc<AtomicBool>,
    pub env_file_path: Arc<PathBuf>,
}

impl ApiState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Store,
        users: UserStore,
        registry: Arc<TaskRegistry>,
        breaker: Arc<CircuitBreaker>,
        prober: Arc<Prober>,
        transport: Arc<dyn Transport>,
        secret_salt: String,
        public_dashboard_enabled: bool,
        env_file_path: PathBuf,
    ) -> Self {
        Self {
            store,
            users,
            registry,
            breaker,
            prober,
            transport,
            secret_salt: Arc::from(secret_salt.as_str()),
            public_dashboard_enabled: Arc::new(AtomicBool::new(public_dashboard_enabled)),
            env_file_path: Arc::new(env_file_path),
        }
    }

    pub fn guest_mode_enabled(&self) -> bool {
        self.public_dashboard_enabled.load(Ordering::Relaxed)
    }
}

/// The REST API component, bound to `bind_addr` and run until `shutdown` is
/// cancelled — same `Component` + graceful-shutdown pattern as the teacher's
/// `AxumChannel`.
pub struct ApiServer {
    bind_addr: String,
    state: ApiState,
}

impl ApiServer {
    pub fn new(bind_addr: String, state: ApiState) -> Self {
        Self { bind_addr, state }
    }
}

impl Component for ApiServer {
    fn id(&self) -> &str {
        "api-server"
    }

    fn run(self: Box<Self>, shutdown: CancellationToken) -> ComponentFuture {
        Box::pin(run_axum(self.bind_addr, self.state, shutdown))
    }
}

async fn run_axum(bind_addr: String, state: ApiState, shutdown: CancellationToken) -> Result<(), AppError> {
    let router = build_router(state);
    let listener = TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| AppError::Comms(format!("bind {bind_addr}: {e}")))?;
    info!(%bind_addr, "api server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| AppError::Comms(format!("api server exited: {e}")))
}

pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/api/auth/login", post(auth_routes::login))
        .route("/api/auth/me", get(auth_routes::me))
        .route("/api/auth/logout", post(auth_routes::logout))
        .route("/api/auth/me/password", post(auth_routes::change_own_password))
        .route("/api/messages", get(messages_routes::list_messages))
        .route("/api/messages/{id}", get(messages_routes::get_message))
        .route("/api/messages/tags/stats", get(messages_routes::tag_stats))
        .route("/api/statistics/overview", get(statistics_routes::overview))
        .route("/api/statistics/daily-trend", get(statistics_routes::daily_trend))
        .route("/api/statistics/dedup-stats", get(statistics_routes::dedup_stats))
        .route("/api/statistics/netdisk-distribution", get(statistics_routes::netdisk_distribution))
        .route(
            "/api/admin/credentials",
            get(admin_routes::list_credentials).post(admin_routes::create_credential),
        )
        .route("/api/admin/credentials/{id}", axum::routing::delete(admin_routes::delete_credential))
        .route("/api/admin/channels", get(admin_routes::list_channels).post(admin_routes::create_channel))
        .route(
            "/api/admin/channels/{id}",
            put(admin_routes::update_channel).delete(admin_routes::delete_channel),
        )
        .route("/api/admin/config", get(admin_routes::get_config).put(admin_routes::put_config))
        .route("/api/admin/users", get(admin_routes::list_users).post(admin_routes::create_user))
        .route(
            "/api/admin/users/{username}",
            get(admin_routes::get_user).put(admin_routes::update_user).delete(admin_routes::delete_user),
        )
        .route("/api/admin/users/{username}/password", put(admin_routes::set_user_password))
        .route("/api/admin/users/{username}/username", put(admin_routes::set_username))
        .route("/api/admin/users/{username}/role", put(admin_routes::set_role))
        .route("/api/admin/users/bulk/random-create", post(admin_routes::bulk_random_create))
        .route("/api/admin/users/bulk/delete", post(admin_routes::bulk_delete))
        .route("/api/admin/users/bulk/reset-password", post(admin_routes::bulk_reset_password))
        .route("/api/admin/users/export-all", get(admin_routes::export_all_users))
        .route("/api/admin/maintenance/fix-tags", post(admin_routes::fix_tags))
        .route("/api/admin/maintenance/dedup-links", post(admin_routes::dedup_links))
        .route("/api/admin/maintenance/clear-link-check-data", post(admin_routes::clear_link_check_data))
        .route(
            "/api/admin/maintenance/clear-old-link-check-data",
            post(admin_routes::clear_old_link_check_data),
        )
        .route("/api/admin/channels/diagnose", post(admin_routes::diagnose_channels))
        .route("/api/admin/channels/test-monitor", post(admin_routes::test_monitor))
        .route("/api/admin/link-check/start", post(admin_routes::start_link_check))
        .route(
            "/api/admin/link-check/tasks/{task_id}",
            get(admin_routes::link_check_task).delete(admin_routes::cancel_link_check_task),
        )
        .route("/api/admin/link-check/tasks", get(admin_routes::recent_link_check_tasks))
        .route("/api/admin/link-check/tasks/{check_time}/result", get(admin_routes::link_check_result))
        .route("/api/config/public", get(public_config))
        .route("/api/health", get(health))
        .with_state(state)
}

async fn public_config(
    axum::extract::State(state): axum::extract::State<ApiState>,
) -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({ "public_dashboard_enabled": state.guest_mode_enabled() }))
}

async fn health() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({ "status": "ok" }))
}
