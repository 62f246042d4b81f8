//! Capsium package router.
//!
//! Serves the content of installed Capsium packages over HTTP, each package
//! under one or more mounts (a path prefix, optionally bound to a host), and
//! exposes an introspection API describing what is installed.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ http::server ──▶ routing::router ──▶ ServeFile ──▶ content/
//!                          │                 │
//!                          │                 ▼
//!                          │        package::registry (snapshot)
//!                          │                 ▲
//!                          ▼                 │
//!                    introspection    package::watcher (reload, reindex)
//!
//!     Cross-cutting: config, headers, observability, lifecycle
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

#[derive(Parser)]
#[command(name = "capsium-router")]
#[command(about = "Serve installed Capsium packages over HTTP", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, env = "CAPSIUM_CONFIG_PATH")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match capsium_router::lifecycle::run(cli.config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Router failed");
            eprintln!("capsium-router: {e}");
            ExitCode::FAILURE
        }
    }
}
