//! erfx-ingest - Main entry point
//!
//! Wires the ingestion pipeline (MQTT → decode → dedup-persist → broadcast)
//! and serves the observer HTTP surface until Ctrl+C / SIGTERM.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use erfx_common::config::{ConfigSource, ErfxConfig};
use erfx_common::EventBus;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use erfx_ingest::api::{self, AppState};
use erfx_ingest::broadcaster::RealtimeBroadcaster;
use erfx_ingest::connection::{ConnectionManager, RumqttTransport};
use erfx_ingest::coordinator::DedupCoordinator;
use erfx_ingest::db::SqliteInspectionStore;
use erfx_ingest::dispatch::Dispatcher;

/// Realtime events buffered per observer before it starts lagging
const EVENT_BUS_CAPACITY: usize = 256;

/// Command-line arguments for erfx-ingest
#[derive(Parser, Debug)]
#[command(name = "erfx-ingest")]
#[command(about = "MQTT inspection result ingester for ERFX")]
#[command(version)]
struct Args {
    /// Path to TOML config file
    #[arg(short, long, env = "ERFX_CONFIG")]
    config: Option<PathBuf>,

    /// Broker host (overrides config)
    #[arg(long)]
    broker_host: Option<String>,

    /// Broker port (overrides config)
    #[arg(long)]
    broker_port: Option<u16>,

    /// HTTP bind address (overrides config)
    #[arg(long)]
    bind: Option<String>,

    /// Database file (overrides config)
    #[arg(long)]
    database: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let (mut config, config_source) =
        ErfxConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(host) = args.broker_host {
        config.mqtt.broker_host = host;
    }
    if let Some(port) = args.broker_port {
        config.mqtt.broker_port = port;
    }
    if let Some(bind) = args.bind {
        config.http.bind_addr = bind;
    }
    if let Some(path) = args.database {
        config.database.path = path;
    }
    config.validate().context("Invalid configuration")?;

    // Initialize tracing
    let default_filter = format!(
        "erfx_ingest={level},erfx_common={level},tower_http=info",
        level = config.logging.level
    );
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting erfx-ingest v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    match &config_source {
        ConfigSource::File(path) => info!("Loaded configuration from {}", path.display()),
        ConfigSource::Defaults => warn!("No config file found, using compiled defaults"),
    }

    let pool = erfx_common::db::init_database(&config.database.path)
        .await
        .context("Failed to open inspection database")?;
    info!("Inspection database: {}", config.database.path.display());

    let bus = EventBus::new(EVENT_BUS_CAPACITY);
    let store = SqliteInspectionStore::new(pool);
    let broadcaster: Arc<dyn RealtimeBroadcaster> = Arc::new(bus.clone());

    let coordinator = Arc::new(DedupCoordinator::new(Arc::new(store.clone())));
    let dispatcher = Arc::new(Dispatcher::new(coordinator, broadcaster.clone()));
    let manager = ConnectionManager::new(
        config.mqtt.clone(),
        config.heartbeat.clone(),
        Arc::new(RumqttTransport::new()),
        dispatcher,
        broadcaster,
    );
    manager.start().await.context("Failed to start connection manager")?;

    let app = api::build_router(AppState {
        bus,
        manager: manager.clone(),
        store,
    });

    info!("Starting HTTP server on {}", config.http.bind_addr);
    let listener = tokio::net::TcpListener::bind(&config.http.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.http.bind_addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    manager.stop().await;
    info!("Shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
