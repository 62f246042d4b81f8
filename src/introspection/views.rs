//! Introspection views.
//!
//! Every function here is a pure projection over one registry snapshot:
//! nothing is mutated, and a view never mixes two snapshots even if the
//! registry changes while it is being built.

use serde::Serialize;

use crate::introspection::validity::ValidityCache;
use crate::package::content::ContentHash;
use crate::package::registry::RegistrySnapshot;

#[derive(Debug, Serialize)]
pub struct PackageMetadata {
    pub name: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MetadataView {
    pub packages: Vec<PackageMetadata>,
}

#[derive(Debug, Serialize)]
pub struct PackageRoutes {
    pub package: String,
    pub routes: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct RoutesView {
    pub routes: Vec<PackageRoutes>,
}

#[derive(Debug, Serialize)]
pub struct FileHash {
    pub path: String,
    pub hash: ContentHash,
    pub size: u64,
}

#[derive(Debug, Serialize)]
pub struct PackageHashes {
    pub package: String,
    /// Aggregate over every file's path and hash.
    pub hash: ContentHash,
    pub files: Vec<FileHash>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentHashesView {
    pub content_hashes: Vec<PackageHashes>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageValidity {
    pub package: String,
    pub valid: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub invalid_files: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentValidityView {
    pub content_validity: Vec<PackageValidity>,
}

/// Name and version of every registered package.
pub fn metadata(snapshot: &RegistrySnapshot) -> MetadataView {
    MetadataView {
        packages: snapshot
            .packages()
            .map(|p| PackageMetadata {
                name: p.name().to_string(),
                version: p.version().to_string(),
                description: p.manifest().description.clone(),
            })
            .collect(),
    }
}

/// Effective path patterns per package: each mount in declaration order
/// (default first), then each explicit route under every mount.
pub fn routes(snapshot: &RegistrySnapshot) -> RoutesView {
    RoutesView {
        routes: snapshot
            .packages()
            .map(|p| {
                let manifest = p.manifest();
                let mut routes: Vec<String> = manifest.mounts.iter().map(|m| m.pattern()).collect();
                for route in &manifest.routes {
                    routes.extend(manifest.mounts.iter().map(|m| format!("{}{}", m.pattern(), route.path)));
                }
                PackageRoutes { package: p.name().to_string(), routes }
            })
            .collect(),
    }
}

/// Aggregate and per-file hashes from each package's current index.
pub fn content_hashes(snapshot: &RegistrySnapshot) -> ContentHashesView {
    ContentHashesView {
        content_hashes: snapshot
            .packages()
            .map(|p| {
                let index = p.index();
                PackageHashes {
                    package: p.name().to_string(),
                    hash: index.digest(),
                    files: index
                        .entries()
                        .map(|e| FileHash { path: e.relative_path.clone(), hash: e.hash, size: e.size })
                        .collect(),
                }
            })
            .collect(),
    }
}

/// Validity of every package. Blocking: may hash files.
pub fn content_validity(snapshot: &RegistrySnapshot, cache: &ValidityCache) -> ContentValidityView {
    cache.retain_packages(snapshot.packages().map(|p| p.name()));
    ContentValidityView {
        content_validity: snapshot
            .packages()
            .map(|p| {
                let validity = cache.check(p);
                PackageValidity {
                    package: p.name().to_string(),
                    valid: validity.valid,
                    invalid_files: validity.invalid_files.clone(),
                }
            })
            .collect(),
    }
}
