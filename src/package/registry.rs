//! Package registry.
//!
//! # Responsibilities
//! - Own the catalog of installed packages and their compiled mount bindings
//! - Reject registrations whose mounts collide with another package
//! - Publish every change as a new immutable snapshot
//!
//! # Concurrency
//! - Readers call [`PackageRegistry::snapshot`] and keep the `Arc` for the
//!   whole request; loads are lock-free (`ArcSwap`)
//! - Writers (register, unregister, replace_all) serialize on a mutex,
//!   build the next snapshot off to the side, then swap it in
//! - Each package keeps its content index in its own `ArcSwap`, so a reindex
//!   replaces the index without republishing the registry

use std::cmp::Reverse;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use thiserror::Error;

use crate::observability::metrics;
use crate::package::content::{ContentError, ContentIndex};
use crate::package::manifest::{describe_domain, Manifest, ManifestError, Mount};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("mount {path} on {domain} is already bound by package {existing}")]
    DuplicateMount { domain: String, path: String, existing: String },

    #[error("invalid manifest for package {package}: {source}")]
    InvalidManifest {
        package: String,
        #[source]
        source: ManifestError,
    },

    #[error("package {0} is not registered")]
    UnknownPackage(String),

    #[error("package {0} appears more than once in one publish")]
    DuplicateName(String),

    #[error("indexing package {package} failed: {source}")]
    Content {
        package: String,
        #[source]
        source: ContentError,
    },
}

/// An installed content bundle.
#[derive(Debug)]
pub struct Package {
    manifest: Manifest,
    root: PathBuf,
    content_root: PathBuf,
    index: ArcSwap<ContentIndex>,
}

impl Package {
    /// Assemble a package and build its initial content index.
    pub fn new(manifest: Manifest, root: PathBuf, content_root: PathBuf) -> Result<Self, RegistryError> {
        let index = ContentIndex::build(&content_root).map_err(|source| RegistryError::Content {
            package: manifest.name.clone(),
            source,
        })?;
        Ok(Self::with_index(manifest, root, content_root, index))
    }

    pub fn with_index(manifest: Manifest, root: PathBuf, content_root: PathBuf, index: ContentIndex) -> Self {
        Self { manifest, root, content_root, index: ArcSwap::from_pointee(index) }
    }

    pub fn name(&self) -> &str {
        &self.manifest.name
    }

    pub fn version(&self) -> &semver::Version {
        &self.manifest.version
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Directory the package was loaded from.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn content_root(&self) -> &Path {
        &self.content_root
    }

    /// Current index snapshot.
    pub fn index(&self) -> Arc<ContentIndex> {
        self.index.load_full()
    }

    /// Rebuild the index and publish it. On failure the old index stays.
    pub fn reindex(&self) -> Result<Arc<ContentIndex>, ContentError> {
        let next = Arc::new(ContentIndex::build(&self.content_root)?);
        self.index.store(Arc::clone(&next));
        Ok(next)
    }

    fn check_routes(&self, index: &ContentIndex) -> Result<(), ManifestError> {
        for route in &self.manifest.routes {
            if !index.contains(&route.target) {
                return Err(ManifestError::MissingRouteTarget {
                    path: route.path.clone(),
                    target: route.target.clone(),
                });
            }
        }
        Ok(())
    }
}

/// One mount of one package, as seen by the resolver.
#[derive(Debug, Clone)]
pub struct MountBinding {
    package: Arc<Package>,
    mount_index: usize,
    sequence: u64,
}

impl MountBinding {
    pub fn package(&self) -> &Arc<Package> {
        &self.package
    }

    pub fn mount(&self) -> &Mount {
        &self.package.manifest.mounts[self.mount_index]
    }

    /// Resolution precedence: domain-scoped before wildcard, deeper prefix
    /// first, then earlier registration, then declaration order.
    fn precedence(&self) -> (bool, Reverse<usize>, u64, usize) {
        let mount = self.mount();
        (mount.domain.is_none(), Reverse(mount.prefix.depth()), self.sequence, self.mount_index)
    }
}

#[derive(Debug, Clone)]
struct Registered {
    sequence: u64,
    package: Arc<Package>,
}

/// Immutable view of the registry at one point in time.
#[derive(Debug, Default)]
pub struct RegistrySnapshot {
    generation: u64,
    packages: Vec<Registered>,
    bindings: Vec<MountBinding>,
}

impl RegistrySnapshot {
    fn build(generation: u64, packages: Vec<Registered>) -> Self {
        let mut bindings: Vec<MountBinding> = packages
            .iter()
            .flat_map(|entry| {
                (0..entry.package.manifest.mounts.len()).map(move |mount_index| MountBinding {
                    package: Arc::clone(&entry.package),
                    mount_index,
                    sequence: entry.sequence,
                })
            })
            .collect();
        bindings.sort_by_key(MountBinding::precedence);
        Self { generation, packages, bindings }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Packages in registration order.
    pub fn packages(&self) -> impl Iterator<Item = &Arc<Package>> {
        self.packages.iter().map(|entry| &entry.package)
    }

    /// Mount bindings in resolution precedence order.
    pub fn bindings(&self) -> &[MountBinding] {
        &self.bindings
    }

    pub fn lookup(&self, name: &str) -> Option<&Arc<Package>> {
        self.packages().find(|p| p.name() == name)
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

/// Result of [`PackageRegistry::replace_all`].
#[derive(Debug, Default)]
pub struct Replacement {
    /// Packages in the new snapshot, including retained predecessors.
    pub published: Vec<Arc<Package>>,
    /// Candidates left out, with the reason.
    pub rejected: Vec<(Arc<Package>, RegistryError)>,
    /// Previously registered packages absent from the new snapshot.
    pub removed: Vec<Arc<Package>>,
}

/// First mount of `package` already bound by one of `others`.
fn first_clash<'a>(package: &Package, others: impl Iterator<Item = &'a Arc<Package>>) -> Option<RegistryError> {
    for other in others {
        for existing in &other.manifest.mounts {
            let clash = package
                .manifest
                .mounts
                .iter()
                .find(|m| m.domain == existing.domain && m.prefix == existing.prefix);
            if let Some(mount) = clash {
                return Some(RegistryError::DuplicateMount {
                    domain: describe_domain(&mount.domain),
                    path: mount.prefix.to_string(),
                    existing: other.name().to_string(),
                });
            }
        }
    }
    None
}

/// Check `package` against the packages accepted so far in one publish.
fn admit(package: &Package, accepted: &[Registered]) -> Result<(), RegistryError> {
    if accepted.iter().any(|e| e.package.name() == package.name()) {
        return Err(RegistryError::DuplicateName(package.name().to_string()));
    }
    package
        .check_routes(&package.index())
        .map_err(|source| RegistryError::InvalidManifest { package: package.name().to_string(), source })?;
    match first_clash(package, accepted.iter().map(|e| &e.package)) {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Authoritative in-memory catalog of installed packages.
pub struct PackageRegistry {
    current: ArcSwap<RegistrySnapshot>,
    next_sequence: Mutex<u64>,
}

impl PackageRegistry {
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(RegistrySnapshot::default()),
            next_sequence: Mutex::new(1),
        }
    }

    /// Current snapshot; hold it for the duration of one request.
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.current.load_full()
    }

    /// Add a package, replacing any registered package with the same name.
    pub fn register(&self, package: Package) -> Result<Arc<Package>, RegistryError> {
        let name = package.name().to_string();
        package
            .check_routes(&package.index())
            .map_err(|source| RegistryError::InvalidManifest { package: name.clone(), source })?;

        let mut next_sequence = self.next_sequence.lock();
        let current = self.current.load_full();

        let others = current.packages().filter(|p| p.name() != name);
        if let Some(err) = first_clash(&package, others) {
            return Err(err);
        }

        let package = Arc::new(package);
        let replaced = current.lookup(&name).map(|p| p.version().to_string());
        let mut packages: Vec<Registered> =
            current.packages.iter().filter(|entry| entry.package.name() != name).cloned().collect();
        packages.push(Registered { sequence: *next_sequence, package: Arc::clone(&package) });
        *next_sequence += 1;

        self.publish(&current, packages);

        match replaced {
            Some(previous) => tracing::info!(
                package = %name,
                version = %package.version(),
                previous_version = %previous,
                "Package replaced"
            ),
            None => tracing::info!(
                package = %name,
                version = %package.version(),
                mounts = package.manifest.mounts.len(),
                files = package.index().len(),
                "Package registered"
            ),
        }
        Ok(package)
    }

    /// Remove a package and all of its mounts in one publish.
    pub fn unregister(&self, name: &str) -> Result<Arc<Package>, RegistryError> {
        let _guard = self.next_sequence.lock();
        let current = self.current.load_full();
        let removed = current
            .lookup(name)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownPackage(name.to_string()))?;

        let packages = current.packages.iter().filter(|entry| entry.package.name() != name).cloned().collect();
        self.publish(&current, packages);

        tracing::info!(package = %name, version = %removed.version(), "Package unregistered");
        Ok(removed)
    }

    /// Replace the whole catalog with `packages` in one publish.
    ///
    /// Conflicts are checked within the new set only, so mounts may move
    /// between packages in a single call. A package keeps the registration
    /// sequence of its same-named predecessor; newcomers follow in the given
    /// order, and the earlier sequence wins a mount collision. When a
    /// candidate is rejected, its predecessor is kept if it still fits.
    pub fn replace_all(&self, packages: Vec<Arc<Package>>) -> Replacement {
        let mut next_sequence = self.next_sequence.lock();
        let current = self.current.load_full();
        let sequence_of = |name: &str| current.packages.iter().find(|e| e.package.name() == name).map(|e| e.sequence);

        let mut candidates: Vec<(Option<u64>, Arc<Package>)> =
            packages.into_iter().map(|p| (sequence_of(p.name()), p)).collect();
        // Stable: newcomers (None) keep their given order after incumbents.
        candidates.sort_by_key(|(sequence, _)| sequence.unwrap_or(u64::MAX));

        let mut outcome = Replacement::default();
        let mut accepted: Vec<Registered> = Vec::new();
        for (sequence, package) in candidates {
            match admit(&package, &accepted) {
                Ok(()) => {
                    let sequence = sequence.unwrap_or_else(|| {
                        let assigned = *next_sequence;
                        *next_sequence += 1;
                        assigned
                    });
                    accepted.push(Registered { sequence, package: Arc::clone(&package) });
                    outcome.published.push(package);
                }
                Err(e) => outcome.rejected.push((package, e)),
            }
        }

        for (rejected, _) in &outcome.rejected {
            let Some(previous) = current.packages.iter().find(|e| e.package.name() == rejected.name()) else {
                continue;
            };
            if Arc::ptr_eq(&previous.package, rejected) || admit(&previous.package, &accepted).is_err() {
                continue;
            }
            tracing::warn!(
                package = %rejected.name(),
                version = %previous.package.version(),
                "Keeping previously registered version"
            );
            accepted.push(previous.clone());
            outcome.published.push(Arc::clone(&previous.package));
        }

        outcome.removed = current
            .packages()
            .filter(|p| !accepted.iter().any(|e| e.package.name() == p.name()))
            .cloned()
            .collect();

        accepted.sort_by_key(|e| e.sequence);
        self.publish(&current, accepted);

        tracing::info!(
            published = outcome.published.len(),
            rejected = outcome.rejected.len(),
            removed = outcome.removed.len(),
            "Package set replaced"
        );
        outcome
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<Package>> {
        self.current.load().lookup(name).cloned()
    }

    /// Packages of one snapshot, in registration order.
    pub fn all(&self) -> Vec<Arc<Package>> {
        self.snapshot().packages().cloned().collect()
    }

    /// Rebuild one package's content index. The previous index keeps serving
    /// if the rebuild fails.
    pub fn reindex(&self, name: &str) -> Result<Arc<ContentIndex>, RegistryError> {
        let package = self.lookup(name).ok_or_else(|| RegistryError::UnknownPackage(name.to_string()))?;
        match package.reindex() {
            Ok(index) => {
                if let Err(e) = package.check_routes(&index) {
                    tracing::warn!(package = %name, error = %e, "Route target missing after reindex");
                }
                metrics::record_reindex(true);
                tracing::debug!(package = %name, files = index.len(), generation = index.generation(), "Package reindexed");
                Ok(index)
            }
            Err(source) => {
                metrics::record_reindex(false);
                Err(RegistryError::Content { package: name.to_string(), source })
            }
        }
    }

    pub fn len(&self) -> usize {
        self.current.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn publish(&self, current: &RegistrySnapshot, packages: Vec<Registered>) {
        let next = RegistrySnapshot::build(current.generation + 1, packages);
        metrics::record_packages(next.len());
        self.current.store(Arc::new(next));
    }
}

impl Default for PackageRegistry {
    fn default() -> Self {
        Self::new()
    }
}
