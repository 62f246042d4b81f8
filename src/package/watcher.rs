//! Keeping the registry fresh while serving.
//!
//! # Responsibilities
//! - Reload packages on demand (SIGHUP, [`ReloadHandle::trigger`])
//! - Optionally watch the package directory, `mounts_dir` and the config
//!   file, reloading on change
//! - Optionally reindex every package on a fixed period
//!
//! # Design Decisions
//! - Hashing and directory walks run on `spawn_blocking`
//! - Reload requests coalesce: a burst of file events causes one reload
//! - Failures are logged and the last-known-good state keeps serving

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{broadcast, mpsc};
use tokio::task::{self, JoinHandle};
use tokio::time::{Instant, Interval, MissedTickBehavior};

use crate::config::loader::load_config;
use crate::config::schema::RouterConfig;
use crate::package::loader;
use crate::package::registry::PackageRegistry;

/// Quiet period after a reload request before the reload runs.
const DEBOUNCE: Duration = Duration::from_millis(250);

/// Background task owning reloads and periodic reindexing.
pub struct PackageWatcher {
    handle: JoinHandle<()>,
    _fs_watcher: Option<RecommendedWatcher>,
}

impl Drop for PackageWatcher {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Cloneable handle that asks the watcher to reload packages.
#[derive(Clone)]
pub struct ReloadHandle {
    trigger: mpsc::Sender<()>,
}

impl ReloadHandle {
    /// Request a reload. Returns `false` once the watcher has stopped.
    pub fn trigger(&self) -> bool {
        match self.trigger.try_send(()) {
            // A reload is already queued; it will pick up this change too.
            Ok(()) | Err(mpsc::error::TrySendError::Full(())) => true,
            Err(mpsc::error::TrySendError::Closed(())) => false,
        }
    }
}

/// Start the watcher task. Must be called from within a Tokio runtime.
///
/// `config_path` is re-read on every reload so edited operator mounts take
/// effect; without it the startup config is reused.
pub fn start_package_watcher(
    registry: Arc<PackageRegistry>,
    config: RouterConfig,
    config_path: Option<PathBuf>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<(PackageWatcher, ReloadHandle), notify::Error> {
    let (tx, mut rx) = mpsc::channel::<()>(1);

    let fs_watcher = if config.packages.watch {
        Some(watch_paths(&config, config_path.as_deref(), tx.clone())?)
    } else {
        None
    };

    let mut ticker = match config.packages.reindex_interval_secs {
        0 => None,
        secs => {
            let period = Duration::from_secs(secs);
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            Some(interval)
        }
    };

    let reindex_interval_secs = ticker_period_secs(&ticker);
    let watching = fs_watcher.is_some();

    let handle = tokio::spawn(async move {
        let mut config = config;
        loop {
            tokio::select! {
                _ = next_tick(&mut ticker) => reindex_all(&registry).await,
                request = rx.recv() => {
                    if request.is_none() {
                        break;
                    }
                    tokio::time::sleep(DEBOUNCE).await;
                    while rx.try_recv().is_ok() {}
                    reload_packages(&registry, &mut config, config_path.as_deref()).await;
                }
                _ = shutdown.recv() => break,
            }
        }
        tracing::debug!("Package watcher stopped");
    });

    tracing::info!(
        watch = watching,
        reindex_interval_secs,
        "Package watcher started"
    );

    Ok((PackageWatcher { handle, _fs_watcher: fs_watcher }, ReloadHandle { trigger: tx }))
}

/// Rebuild the content index of every registered package.
pub async fn reindex_all(registry: &Arc<PackageRegistry>) {
    let registry = Arc::clone(registry);
    let result = task::spawn_blocking(move || {
        for package in registry.all() {
            if let Err(e) = registry.reindex(package.name()) {
                tracing::error!(
                    package = %package.name(),
                    error = %e,
                    "Reindex failed, keeping last good index"
                );
            }
        }
    })
    .await;

    if let Err(e) = result {
        tracing::error!(error = %e, "Reindex task failed");
    }
}

async fn reload_packages(registry: &Arc<PackageRegistry>, config: &mut RouterConfig, config_path: Option<&Path>) {
    if let Some(path) = config_path {
        match load_config(path) {
            Ok(next) => *config = next,
            Err(e) => tracing::error!("Failed to reload config: {}. Keeping current configuration.", e),
        }
    }

    let registry = Arc::clone(registry);
    let snapshot = config.clone();
    match task::spawn_blocking(move || loader::load_all(&registry, &snapshot)).await {
        Ok(Ok(report)) => tracing::info!(
            loaded = report.loaded.len(),
            failed = report.failed.len(),
            removed = report.removed.len(),
            "Packages reloaded"
        ),
        Ok(Err(e)) => tracing::error!(error = %e, "Package reload failed, keeping current packages"),
        Err(e) => tracing::error!(error = %e, "Package reload task failed"),
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

fn ticker_period_secs(ticker: &Option<Interval>) -> u64 {
    ticker.as_ref().map(|t| t.period().as_secs()).unwrap_or(0)
}

fn watch_paths(
    config: &RouterConfig,
    config_path: Option<&Path>,
    tx: mpsc::Sender<()>,
) -> Result<RecommendedWatcher, notify::Error> {
    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if event.kind.is_modify() || event.kind.is_create() || event.kind.is_remove() {
                    tracing::debug!(paths = ?event.paths, "Package change detected");
                    let _ = tx.try_send(());
                }
            }
            Err(e) => tracing::error!("Watch error: {:?}", e),
        },
        Config::default().with_poll_interval(Duration::from_secs(2)),
    )?;

    watcher.watch(&config.packages.package_dir, RecursiveMode::Recursive)?;
    if let Some(dir) = config.packages.mounts_dir.as_deref().filter(|d| d.is_dir()) {
        watcher.watch(dir, RecursiveMode::NonRecursive)?;
    }
    if let Some(path) = config_path {
        watcher.watch(path, RecursiveMode::NonRecursive)?;
    }

    tracing::info!(path = ?config.packages.package_dir, "Watching package directory");
    Ok(watcher)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::loader::{CONTENT_DIR, MANIFEST_FILE};
    use std::fs;

    fn write_package(root: &Path, name: &str, body: &str) {
        let pkg = root.join(name);
        fs::create_dir_all(pkg.join(CONTENT_DIR)).unwrap();
        fs::write(pkg.join(MANIFEST_FILE), format!(r#"{{"name": "{name}", "version": "1.0.0"}}"#)).unwrap();
        fs::write(pkg.join(CONTENT_DIR).join("index.html"), body).unwrap();
    }

    async fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        for _ in 0..100 {
            if condition() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_trigger_reloads_packages() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = RouterConfig::default();
        config.packages.package_dir = dir.path().to_path_buf();

        let registry = Arc::new(PackageRegistry::new());
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let (_watcher, reload) =
            start_package_watcher(Arc::clone(&registry), config, None, shutdown_rx).unwrap();

        write_package(dir.path(), "late", "hello");
        assert!(reload.trigger());
        assert!(wait_for(|| registry.lookup("late").is_some()).await);

        fs::remove_dir_all(dir.path().join("late")).unwrap();
        assert!(reload.trigger());
        assert!(wait_for(|| registry.is_empty()).await);

        shutdown_tx.send(()).unwrap();
        assert!(wait_for(|| !reload.trigger()).await);
    }

    #[tokio::test]
    async fn test_periodic_reindex_publishes_new_index() {
        let dir = tempfile::tempdir().unwrap();
        write_package(dir.path(), "site", "v1");
        let mut config = RouterConfig::default();
        config.packages.package_dir = dir.path().to_path_buf();
        config.packages.reindex_interval_secs = 1;

        let registry = Arc::new(PackageRegistry::new());
        loader::load_all(&registry, &config).unwrap();
        let package = registry.lookup("site").unwrap();
        let first = package.index().generation();

        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let (_watcher, _reload) =
            start_package_watcher(Arc::clone(&registry), config, None, shutdown_rx).unwrap();

        assert!(wait_for(|| package.index().generation() > first).await);
    }
}
