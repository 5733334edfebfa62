//! # Notiflow
//! Scheduled notification delivery.
//!
//! Usage:
//!   notiflow                             # Serve on 0.0.0.0:8000
//!   notiflow --config ./notiflow.toml    # Explicit config file
//!   notiflow --port 9000 --verbose       # Override port, debug logging

mod logging;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use notiflow_channels::DispatchManager;
use notiflow_core::config::{NotiflowConfig, StoreBackend};
use notiflow_gateway::AppState;
use notiflow_scheduler::{JsonFileStore, MemoryStore, NotificationService, NotificationStore, TokioScheduler};

#[derive(Parser)]
#[command(
    name = "notiflow",
    version,
    about = "🔔 Notiflow: scheduled notifications over mail, SMS and Telegram"
)]
struct Cli {
    /// Config file (default: ~/.notiflow/config.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Override the listen host
    #[arg(long)]
    host: Option<String>,

    /// Override the listen port
    #[arg(short, long)]
    port: Option<u16>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn expand_path(p: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(p).to_string())
}

fn load_config(cli: &Cli) -> Result<NotiflowConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let path = expand_path(path);
            if path.exists() {
                NotiflowConfig::load_from(&path)?
            } else {
                NotiflowConfig::default()
            }
        }
        None => NotiflowConfig::load()?,
    };
    config.apply_env_overrides();
    if let Some(host) = &cli.host {
        config.server.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    Ok(config)
}

fn open_store(config: &NotiflowConfig) -> Result<Arc<dyn NotificationStore>> {
    let store: Arc<dyn NotificationStore> = match config.store.backend {
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
        StoreBackend::Json => {
            let dir = expand_path(&config.store.path);
            let store = JsonFileStore::open(&dir)
                .with_context(|| format!("opening notification store {}", dir.display()))?;
            tracing::info!("💾 Notification store: {}", store.path().display());
            Arc::new(store)
        }
    };
    Ok(store)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = load_config(&cli)?;
    let _log_guard = logging::init(&config.logging, cli.verbose)?;
    if cli.config.as_deref().map(expand_path).is_some_and(|p| !p.exists()) {
        tracing::warn!("Config file not found, using defaults");
    }

    tracing::info!("🔔 Notiflow v{} starting", env!("CARGO_PKG_VERSION"));

    let manager = DispatchManager::from_config(&config);
    manager
        .initialize()
        .await
        .context("dispatch manager initialization failed")?;
    let manager = Arc::new(manager);

    let scheduler = TokioScheduler::with_grace_secs(config.scheduler.misfire_grace_secs);
    let store = open_store(&config)?;
    let service = NotificationService::new(manager, store, Arc::new(scheduler.clone()));
    service.restore().await?;

    let result = notiflow_gateway::start(&config.server, AppState::new(service), shutdown_signal()).await;
    scheduler.shutdown();
    result
}
