//! Startup orchestration.
//!
//! # Responsibilities
//! - Load and validate configuration
//! - Initialize logging and metrics
//! - Load packages, then start the watcher and signal handling
//! - Bind the listener and begin accepting traffic
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently
//! - Listeners start last (traffic only when ready)

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::net::TcpListener;

use crate::config::{load_config, ConfigError, RouterConfig};
use crate::http::HttpServer;
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::signals;
use crate::observability::{logging, metrics};
use crate::package::{load_all, start_package_watcher, LoadError, PackageRegistry};

/// Anything that stops the router from coming up.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to load packages: {0}")]
    Packages(#[from] LoadError),

    #[error("failed to start package watcher: {0}")]
    Watcher(#[from] notify::Error),

    #[error("startup task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Run the router until a termination signal arrives.
///
/// Without `config_path` the built-in defaults are used.
pub async fn run(config_path: Option<PathBuf>) -> Result<(), StartupError> {
    let config = match config_path.as_deref() {
        Some(path) => load_config(path)?,
        None => RouterConfig::default(),
    };

    if let Err(e) = logging::init_logging(Some(&config.observability.log_level)) {
        eprintln!("Logging already initialized: {e}");
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = ?config_path,
        "capsium-router starting"
    );
    tracing::info!(
        bind_address = %config.listener.bind_address,
        package_dir = %config.packages.package_dir.display(),
        operator_mounts = config.mounts.len(),
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let registry = Arc::new(PackageRegistry::new());
    let report = {
        let registry = Arc::clone(&registry);
        let config = config.clone();
        tokio::task::spawn_blocking(move || load_all(&registry, &config)).await??
    };
    tracing::info!(
        loaded = report.loaded.len(),
        failed = report.failed.len(),
        "Packages loaded"
    );

    let shutdown = Arc::new(Shutdown::new());
    let (watcher, reload) = start_package_watcher(
        Arc::clone(&registry),
        config.clone(),
        config_path,
        shutdown.subscribe(),
    )?;

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let signal_shutdown = Arc::clone(&shutdown);
    tokio::spawn(async move {
        if let Err(e) = signals::handle_signals(signal_shutdown, reload).await {
            tracing::error!(error = %e, "Signal handling failed");
        }
    });

    let server = HttpServer::new(config, registry);
    let result = server.run(listener, shutdown.subscribe()).await;
    drop(watcher);
    result?;

    tracing::info!("Shutdown complete");
    Ok(())
}
