//! tgmonitor-rs — entry point.
//!
//! Startup sequence (SPEC_FULL.md §0/§5):
//!   1. Load .env (if present)
//!   2. Init logger at "info" (config isn't available yet)
//!   3. Load config
//!   4. Re-init logger at the configured level
//!   5. Open the relational store and the file-backed user store
//!   6. Build shared validation state (task registry, circuit breaker, prober)
//!   7. Spawn the Ingestion Loop and the REST API server as components under
//!      one shared shutdown token, rooted at Ctrl-C
//!   8. Await shutdown

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use tgmonitor::api::{ApiServer, ApiState};
use tgmonitor::auth::UserStore;
use tgmonitor::config::Config;
use tgmonitor::error::AppError;
use tgmonitor::ingest::transport::{TeloxideTransport, Transport};
use tgmonitor::ingest::IngestionLoop;
use tgmonitor::logger;
use tgmonitor::store::Store;
use tgmonitor::subsystems::runtime::{spawn_components, Component};
use tgmonitor::validate::prober::HttpProber;
use tgmonitor::validate::{CircuitBreaker, Prober, TaskRegistry};

fn main() -> Result<(), AppError> {
    let _ = dotenvy::dotenv();
    logger::init("info", None)?;

    let config = Config::load()?;

    logger::init(&config.log_level, None)?;
    info!(bind_addr = %config.bind_addr, db_path = %config.db_path.display(), "config loaded");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| AppError::Comms(format!("build tokio runtime: {e}")))?;

    runtime.block_on(run(config))
}

async fn run(config: Config) -> Result<(), AppError> {
    let store = Store::open(&config.db_path)?;
    let users = UserStore::new(config.db_path.with_file_name("users.json"));

    let registry = Arc::new(TaskRegistry::new());
    let breaker = Arc::new(CircuitBreaker::new());
    let prober = Arc::new(Prober::Http(
        HttpProber::new().map_err(|e| AppError::Comms(format!("build http prober: {e}")))?,
    ));

    let transport: Arc<dyn Transport> = Arc::new(TeloxideTransport::new(
        config.telegram_bot_token.clone().unwrap_or_default(),
        config.default_channels.clone(),
    ));

    let api_state = ApiState::new(
        store.clone(),
        users,
        registry,
        breaker,
        prober,
        transport,
        config.secret_salt.clone(),
        config.public_dashboard_enabled,
        config.env_file_path.clone(),
    );

    let shutdown = CancellationToken::new();
    let ctrl_c_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received, shutting down");
            ctrl_c_shutdown.cancel();
        }
    });

    let ingestion = IngestionLoop::new(
        config.telegram_bot_token.clone(),
        config.default_channels.clone(),
        store,
        config.failed_messages_log_path.clone(),
        config.error_messages_log_path.clone(),
    );
    let api_server = ApiServer::new(config.bind_addr.clone(), api_state);

    let components: Vec<Box<dyn Component>> = vec![Box::new(ingestion), Box::new(api_server)];
    spawn_components(components, shutdown).join().await
}
