//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber once per process
//! - Honor `RUST_LOG` over the configured level
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - Compact single-line format; fields stay machine-greppable

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter applied when neither `RUST_LOG` nor the config sets a level.
pub const DEFAULT_DIRECTIVES: &str = "capsium_router=info,tower_http=info";

/// Install the global subscriber.
///
/// `level` comes from the config file and is used only when `RUST_LOG`
/// is unset or unparsable. Fails if a subscriber is already installed.
pub fn init_logging(level: Option<&str>) -> Result<(), tracing_subscriber::util::TryInitError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        level
            .and_then(|l| EnvFilter::try_new(l).ok())
            .unwrap_or_else(|| EnvFilter::new(DEFAULT_DIRECTIVES))
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().compact())
        .try_init()
}
