//! OS signal handling.
//!
//! # Responsibilities
//! - Register signal handlers (SIGTERM, SIGINT, SIGHUP)
//! - Translate signals to internal events
//! - Trigger appropriate actions (shutdown, reload)
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - A second SIGINT after shutdown began forces exit
//! - SIGHUP reloads packages and operator mounts, not shutdown

use std::sync::Arc;

use crate::lifecycle::shutdown::Shutdown;
use crate::package::watcher::ReloadHandle;

/// Exit status used when a second interrupt forces exit.
const FORCED_EXIT_CODE: i32 = 130;

/// Wait for a termination signal, reloading on SIGHUP meanwhile, then
/// trigger `shutdown`.
#[cfg(unix)]
pub async fn handle_signals(shutdown: Arc<Shutdown>, reload: ReloadHandle) -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    let mut hangup = signal(SignalKind::hangup())?;

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                tracing::info!("SIGINT received");
                break;
            }
            _ = terminate.recv() => {
                tracing::info!("SIGTERM received");
                break;
            }
            _ = hangup.recv() => {
                tracing::info!("SIGHUP received, reloading packages");
                if !reload.trigger() {
                    tracing::warn!("Package watcher is not running, reload skipped");
                }
            }
        }
    }

    begin_shutdown(&shutdown);
    Ok(())
}

/// Wait for Ctrl+C, then trigger `shutdown`.
#[cfg(not(unix))]
pub async fn handle_signals(shutdown: Arc<Shutdown>, _reload: ReloadHandle) -> std::io::Result<()> {
    tokio::signal::ctrl_c().await?;
    tracing::info!("Ctrl+C received");
    begin_shutdown(&shutdown);
    Ok(())
}

fn begin_shutdown(shutdown: &Shutdown) {
    shutdown.trigger();
    tokio::spawn(async {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Second interrupt received, exiting immediately");
            std::process::exit(FORCED_EXIT_CODE);
        }
    });
}
