//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the router.
//! All types derive Serde traits for deserialization from config files.

use std::path::PathBuf;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::package::manifest::MountDecl;

/// Root configuration for the package router.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RouterConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Where packages come from and how they are kept fresh.
    pub packages: PackagesConfig,

    /// Introspection API behavior.
    pub introspection: IntrospectionConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Operator-declared mounts, merged into the named package's manifest.
    pub mounts: Vec<MountConfig>,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Package source configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PackagesConfig {
    /// Directory holding one unpacked package per subdirectory.
    pub package_dir: PathBuf,

    /// Optional directory of `*.toml` files, each holding `[[mounts]]`.
    pub mounts_dir: Option<PathBuf>,

    /// Watch `package_dir` and reload on change.
    pub watch: bool,

    /// Background reindex period in seconds; 0 disables it.
    pub reindex_interval_secs: u64,
}

impl Default for PackagesConfig {
    fn default() -> Self {
        Self {
            package_dir: PathBuf::from("packages"),
            mounts_dir: None,
            watch: false,
            reindex_interval_secs: 0,
        }
    }
}

/// Introspection API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IntrospectionConfig {
    /// How long a computed validity result may be reused; 0 recomputes
    /// on every request.
    pub validity_cache_ttl_secs: u64,

    /// Serve the built-in landing page at `/` when no mount covers it.
    pub landing_page: bool,
}

impl Default for IntrospectionConfig {
    fn default() -> Self {
        Self {
            validity_cache_ttl_secs: 0,
            landing_page: true,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log filter directive (trace, debug, info, warn, error, or a full
    /// `EnvFilter` string). `RUST_LOG` takes precedence.
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// An operator mount for an installed package.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MountConfig {
    /// Package name, or `name-version` to pin a version.
    pub package: String,

    /// Path prefix (e.g., "/app/").
    pub path: String,

    /// Host to bind to; absent or `*` means any host.
    #[serde(default)]
    pub domain: Option<String>,

    /// Mount id referenced in logs; generated when absent.
    #[serde(default)]
    pub id: Option<String>,

    /// Headers attached to every response served through this mount.
    #[serde(default)]
    pub headers: IndexMap<String, String>,

    /// Emitted as `Cache-Control: max-age=<ttl>`.
    #[serde(default)]
    pub cache_ttl_secs: Option<u64>,
}

impl MountConfig {
    /// True if this mount targets the package `name` at `version`.
    pub fn applies_to(&self, name: &str, version: &str) -> bool {
        self.package == name || self.package == format!("{name}-{version}")
    }

    /// The manifest-level declaration this mount contributes.
    pub fn to_decl(&self) -> MountDecl {
        MountDecl {
            id: self.id.clone(),
            path: self.path.clone(),
            domain: self.domain.clone(),
            headers: self.headers.clone(),
            cache_ttl_secs: self.cache_ttl_secs,
        }
    }
}

/// A `mounts_dir` drop-in file.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct MountsFile {
    pub mounts: Vec<MountConfig>,
}
