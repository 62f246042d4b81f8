//! Content validity checks with an optional TTL cache.
//!
//! With a TTL of zero (the default) every check re-hashes the package's
//! files, so results always reflect current on-disk bytes. With a positive
//! TTL a result is reused until it expires or the package's index
//! generation changes (reindex or re-registration), whichever comes first.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::Serialize;

use crate::observability::metrics;
use crate::package::registry::Package;

/// Outcome of verifying one package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Validity {
    pub valid: bool,
    /// Files whose bytes no longer match the index, in path order.
    pub invalid_files: Vec<String>,
}

#[derive(Debug, Clone)]
struct CachedValidity {
    generation: u64,
    computed_at: Instant,
    validity: Arc<Validity>,
}

/// Per-package validity results keyed by package name.
#[derive(Debug)]
pub struct ValidityCache {
    ttl: Duration,
    entries: DashMap<String, CachedValidity>,
}

impl ValidityCache {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, entries: DashMap::new() }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Validity of `package`'s current index. Blocking: may hash files.
    pub fn check(&self, package: &Package) -> Arc<Validity> {
        let index = package.index();
        let generation = index.generation();

        if !self.ttl.is_zero() {
            if let Some(cached) = self.entries.get(package.name()) {
                if cached.generation == generation && cached.computed_at.elapsed() < self.ttl {
                    return Arc::clone(&cached.validity);
                }
            }
        }

        let invalid_files: Vec<String> = index
            .verify_all()
            .into_iter()
            .filter(|status| !status.valid)
            .map(|status| status.path)
            .collect();
        if !invalid_files.is_empty() {
            tracing::warn!(
                package = %package.name(),
                invalid = invalid_files.len(),
                "Package content no longer matches its index"
            );
            metrics::record_invalid_content(package.name());
        }

        let validity = Arc::new(Validity { valid: invalid_files.is_empty(), invalid_files });
        if !self.ttl.is_zero() {
            self.entries.insert(
                package.name().to_string(),
                CachedValidity { generation, computed_at: Instant::now(), validity: Arc::clone(&validity) },
            );
        }
        validity
    }

    /// Drop cached results for packages not in `names`.
    pub fn retain_packages<'a>(&self, names: impl IntoIterator<Item = &'a str>) {
        let keep: std::collections::HashSet<&str> = names.into_iter().collect();
        self.entries.retain(|name, _| keep.contains(name.as_str()));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ValidityCache {
    fn default() -> Self {
        Self::new(Duration::ZERO)
    }
}
