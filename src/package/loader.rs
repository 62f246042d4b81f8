//! Loading unpacked packages from disk.
//!
//! # Layout
//! ```text
//! <package_dir>/
//!     mn-samples-iso-0.1.0/
//!         manifest.json
//!         content/
//!             index.html
//!             ...
//! ```
//!
//! # Responsibilities
//! - Discover package directories (sorted, so registration order is stable)
//! - Merge operator mounts from the router config and `mounts_dir`
//! - Publish the whole set at once; one bad package never blocks the others
//!
//! Everything here does blocking file I/O and hashing. Async callers go
//! through `tokio::task::spawn_blocking`.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use crate::config::schema::{MountConfig, MountsFile, RouterConfig};
use crate::config::validation::{validate_mounts, ValidationError};
use crate::package::manifest::{Manifest, ManifestFile};
use crate::package::registry::{Package, PackageRegistry, RegistryError};

pub const MANIFEST_FILE: &str = "manifest.json";
pub const CONTENT_DIR: &str = "content";

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed manifest {}: {source}", .path.display())]
    Manifest {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("malformed mounts file {}: {source}", .path.display())]
    MountsFile {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid mounts in {}: {}", .path.display(), join_errors(.errors))]
    InvalidMounts { path: PathBuf, errors: Vec<ValidationError> },

    #[error("package {} has no content directory", .0.display())]
    MissingContent(PathBuf),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

/// Outcome of one load or reload pass.
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Packages registered (or replaced) by this pass.
    pub loaded: Vec<String>,
    /// Package directories that failed, with the reason.
    pub failed: Vec<(PathBuf, String)>,
    /// Packages dropped because no directory provides them any more.
    pub removed: Vec<String>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Operator mounts: the config's `[[mounts]]` followed by every `*.toml`
/// drop-in under `mounts_dir`, in file name order.
pub fn operator_mounts(config: &RouterConfig) -> Result<Vec<MountConfig>, LoadError> {
    let mut mounts = config.mounts.clone();

    let Some(dir) = &config.packages.mounts_dir else {
        return Ok(mounts);
    };
    if !dir.is_dir() {
        tracing::warn!(path = %dir.display(), "mounts_dir does not exist, skipping");
        return Ok(mounts);
    }

    let mut files: Vec<PathBuf> = read_dir(dir)?
        .into_iter()
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "toml"))
        .collect();
    files.sort();

    for path in files {
        let content = fs::read_to_string(&path).map_err(|source| LoadError::Io { path: path.clone(), source })?;
        let file: MountsFile =
            toml::from_str(&content).map_err(|source| LoadError::MountsFile { path: path.clone(), source })?;
        let errors = validate_mounts("mounts", &file.mounts);
        if !errors.is_empty() {
            return Err(LoadError::InvalidMounts { path, errors });
        }
        tracing::debug!(path = %path.display(), mounts = file.mounts.len(), "Loaded mounts drop-in");
        mounts.extend(file.mounts);
    }

    Ok(mounts)
}

/// Package directories under `package_dir`: subdirectories holding a
/// manifest, sorted by path.
pub fn discover(package_dir: &Path) -> Result<Vec<PathBuf>, LoadError> {
    let mut dirs: Vec<PathBuf> = read_dir(package_dir)?
        .into_iter()
        .filter(|p| p.join(MANIFEST_FILE).is_file())
        .collect();
    dirs.sort();
    Ok(dirs)
}

/// Read, validate and index one package directory.
pub fn load_package(dir: &Path, mounts: &[MountConfig]) -> Result<Package, LoadError> {
    let manifest_path = dir.join(MANIFEST_FILE);
    let raw = fs::read_to_string(&manifest_path)
        .map_err(|source| LoadError::Io { path: manifest_path.clone(), source })?;
    let mut file: ManifestFile =
        serde_json::from_str(&raw).map_err(|source| LoadError::Manifest { path: manifest_path, source })?;

    let version = file.version.trim().to_string();
    file.mounts.extend(
        mounts
            .iter()
            .filter(|m| m.applies_to(&file.name, &version))
            .map(MountConfig::to_decl),
    );

    let name = file.name.clone();
    let manifest =
        Manifest::from_file(file).map_err(|source| RegistryError::InvalidManifest { package: name, source })?;

    let content_root = dir.join(CONTENT_DIR);
    if !content_root.is_dir() {
        return Err(LoadError::MissingContent(dir.to_path_buf()));
    }

    Ok(Package::new(manifest, dir.to_path_buf(), content_root)?)
}

/// Load every package under `package_dir` and publish them as the whole
/// registry in one snapshot swap.
///
/// Fails only when the package directory or the operator mounts cannot be
/// read; per-package problems are logged and reported. A directory that
/// fails to load keeps its previously registered package. Packages whose
/// directory is gone, or whose manifest now names another package, are
/// removed. When several directories declare the same name, the highest
/// version wins.
pub fn load_all(registry: &PackageRegistry, config: &RouterConfig) -> Result<LoadReport, LoadError> {
    let mounts = operator_mounts(config)?;
    let dirs = discover(&config.packages.package_dir)?;
    let current = registry.snapshot();
    let mut report = LoadReport::default();

    let mut candidates: Vec<Arc<Package>> = Vec::new();
    for dir in &dirs {
        match load_package(dir, &mounts) {
            Ok(package) => candidates.push(Arc::new(package)),
            Err(e) => {
                tracing::error!(path = %dir.display(), error = %e, "Failed to load package");
                report.failed.push((dir.clone(), e.to_string()));
                if let Some(previous) = current.packages().find(|p| p.root() == dir.as_path()) {
                    tracing::warn!(package = %previous.name(), "Keeping last good version");
                    candidates.push(Arc::clone(previous));
                }
            }
        }
    }

    let candidates = newest_per_name(candidates, &mut report);
    let outcome = registry.replace_all(candidates);

    for package in &outcome.published {
        if !current.packages().any(|p| Arc::ptr_eq(p, package)) {
            report.loaded.push(package.name().to_string());
        }
    }
    for (package, e) in &outcome.rejected {
        tracing::error!(package = %package.name(), path = %package.root().display(), error = %e, "Failed to register package");
        report.failed.push((package.root().to_path_buf(), e.to_string()));
    }
    report.removed = outcome.removed.iter().map(|p| p.name().to_string()).collect();

    let snapshot = registry.snapshot();
    for mount in &mounts {
        let known = snapshot
            .packages()
            .any(|p| mount.applies_to(p.name(), &p.version().to_string()));
        if !known {
            tracing::warn!(package = %mount.package, path = %mount.path, "Operator mount targets no loaded package");
        }
    }

    tracing::info!(
        package_dir = %config.packages.package_dir.display(),
        loaded = report.loaded.len(),
        failed = report.failed.len(),
        removed = report.removed.len(),
        "Packages loaded"
    );
    Ok(report)
}

/// Keep the highest version of each package name; the rest are reported
/// as failed. Ties go to the first directory in sorted order.
fn newest_per_name(candidates: Vec<Arc<Package>>, report: &mut LoadReport) -> Vec<Arc<Package>> {
    let mut kept: Vec<Arc<Package>> = Vec::with_capacity(candidates.len());
    for package in candidates {
        let Some(slot) = kept.iter_mut().find(|k| k.name() == package.name()) else {
            kept.push(package);
            continue;
        };
        let (winner, loser) = if package.version() > slot.version() {
            let loser = std::mem::replace(slot, Arc::clone(&package));
            (package, loser)
        } else {
            (Arc::clone(slot), package)
        };
        tracing::warn!(
            package = %winner.name(),
            version = %winner.version(),
            shadowed = %loser.root().display(),
            "Package name declared twice, keeping the highest version"
        );
        report.failed.push((
            loser.root().to_path_buf(),
            format!("shadowed by {} {} in {}", winner.name(), winner.version(), winner.root().display()),
        ));
    }
    kept
}

fn read_dir(dir: &Path) -> Result<Vec<PathBuf>, LoadError> {
    let io_err = |source| LoadError::Io { path: dir.to_path_buf(), source };
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_err)? {
        paths.push(entry.map_err(io_err)?.path());
    }
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_package(root: &Path, dir: &str, manifest: serde_json::Value, files: &[(&str, &str)]) -> PathBuf {
        let pkg = root.join(dir);
        fs::create_dir_all(pkg.join(CONTENT_DIR)).unwrap();
        fs::write(pkg.join(MANIFEST_FILE), manifest.to_string()).unwrap();
        for (path, body) in files {
            let target = pkg.join(CONTENT_DIR).join(path);
            fs::create_dir_all(target.parent().unwrap()).unwrap();
            fs::write(target, body).unwrap();
        }
        pkg
    }

    fn config(package_dir: &Path) -> RouterConfig {
        let mut config = RouterConfig::default();
        config.packages.package_dir = package_dir.to_path_buf();
        config
    }

    #[test]
    fn test_load_all_merges_operator_mounts() {
        let dir = tempfile::tempdir().unwrap();
        write_package(
            dir.path(),
            "mn-samples-iso-0.1.0",
            serde_json::json!({"name": "mn-samples-iso", "version": "0.1.0"}),
            &[("index.html", "<p>ISO sample documents in Metanorma</p>")],
        );

        let mut config = config(dir.path());
        config.mounts.push(MountConfig {
            package: "mn-samples-iso".into(),
            path: "/app/".into(),
            domain: None,
            id: None,
            headers: [("X-Frame-Options".to_string(), "SAMEORIGIN".to_string())].into_iter().collect(),
            cache_ttl_secs: None,
        });

        let registry = PackageRegistry::new();
        let report = load_all(&registry, &config).unwrap();
        assert_eq!(report.loaded, vec!["mn-samples-iso"]);
        assert!(report.is_clean());

        let package = registry.lookup("mn-samples-iso").unwrap();
        let patterns: Vec<_> = package.manifest().mounts.iter().map(|m| m.pattern()).collect();
        assert_eq!(patterns, vec!["/capsium/mn-samples-iso-0.1.0/", "/app/"]);
    }

    #[test]
    fn test_bad_package_does_not_block_others() {
        let dir = tempfile::tempdir().unwrap();
        write_package(dir.path(), "a", serde_json::json!({"name": "a", "version": "1.0.0"}), &[("index.html", "a")]);
        write_package(dir.path(), "b", serde_json::json!({"name": "b", "version": "not-semver"}), &[]);
        fs::create_dir_all(dir.path().join("c")).unwrap();
        fs::write(dir.path().join("c").join(MANIFEST_FILE), "{ nope").unwrap();
        fs::create_dir_all(dir.path().join("not-a-package")).unwrap();

        let registry = PackageRegistry::new();
        let report = load_all(&registry, &config(dir.path())).unwrap();
        assert_eq!(report.loaded, vec!["a"]);
        assert_eq!(report.failed.len(), 2);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_missing_content_dir() {
        let dir = tempfile::tempdir().unwrap();
        let pkg = dir.path().join("x");
        fs::create_dir_all(&pkg).unwrap();
        fs::write(pkg.join(MANIFEST_FILE), r#"{"name": "x", "version": "1.0.0"}"#).unwrap();
        assert!(matches!(load_package(&pkg, &[]), Err(LoadError::MissingContent(_))));
    }

    #[test]
    fn test_mounts_dir_drop_ins() {
        let dir = tempfile::tempdir().unwrap();
        let mounts_dir = dir.path().join("mounts.d");
        fs::create_dir_all(&mounts_dir).unwrap();
        fs::write(
            mounts_dir.join("10-site.toml"),
            "[[mounts]]\npackage = \"site\"\npath = \"/site/\"\n",
        )
        .unwrap();
        fs::write(mounts_dir.join("README"), "ignored").unwrap();

        let mut config = config(dir.path());
        config.packages.mounts_dir = Some(mounts_dir.clone());
        let mounts = operator_mounts(&config).unwrap();
        assert_eq!(mounts.len(), 1);
        assert_eq!(mounts[0].path, "/site/");

        fs::write(mounts_dir.join("20-bad.toml"), "[[mounts]]\npackage = \"site\"\npath = \"nope\"\n").unwrap();
        assert!(matches!(operator_mounts(&config), Err(LoadError::InvalidMounts { .. })));
    }

    #[test]
    fn test_second_pass_removes_deleted_and_keeps_broken() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_package(dir.path(), "a", serde_json::json!({"name": "a", "version": "1.0.0"}), &[("index.html", "a")]);
        let b = write_package(dir.path(), "b", serde_json::json!({"name": "b", "version": "1.0.0"}), &[("index.html", "b")]);

        let registry = PackageRegistry::new();
        let config = config(dir.path());
        load_all(&registry, &config).unwrap();
        assert_eq!(registry.len(), 2);

        fs::remove_dir_all(&a).unwrap();
        fs::write(b.join(MANIFEST_FILE), "{ broken").unwrap();

        let report = load_all(&registry, &config).unwrap();
        assert_eq!(report.removed, vec!["a"]);
        assert_eq!(report.failed.len(), 1);
        assert!(registry.lookup("a").is_none());
        assert!(registry.lookup("b").is_some());
    }

    #[test]
    fn test_operator_mount_moves_between_packages() {
        let dir = tempfile::tempdir().unwrap();
        write_package(dir.path(), "a", serde_json::json!({"name": "a", "version": "1.0.0"}), &[("index.html", "a")]);
        write_package(dir.path(), "b", serde_json::json!({"name": "b", "version": "1.0.0"}), &[("index.html", "b")]);

        let registry = PackageRegistry::new();
        let mut config = config(dir.path());
        config.mounts.push(operator_mount("b", "/app/"));
        load_all(&registry, &config).unwrap();

        config.mounts = vec![operator_mount("a", "/app/")];
        let report = load_all(&registry, &config).unwrap();
        assert!(report.is_clean(), "{:?}", report.failed);

        match crate::routing::resolve(&registry.snapshot(), None, "/app/").unwrap() {
            crate::routing::Target::File(resolution) => assert_eq!(resolution.package().name(), "a"),
            other => panic!("expected a file, got {other:?}"),
        }
    }

    #[test]
    fn test_renamed_package_replaces_old_name() {
        let dir = tempfile::tempdir().unwrap();
        let site = write_package(dir.path(), "site", serde_json::json!({"name": "site", "version": "1.0.0"}), &[("index.html", "s")]);

        let registry = PackageRegistry::new();
        let config = config(dir.path());
        load_all(&registry, &config).unwrap();

        fs::write(site.join(MANIFEST_FILE), r#"{"name": "site2", "version": "1.0.0"}"#).unwrap();
        let report = load_all(&registry, &config).unwrap();

        assert_eq!(report.loaded, vec!["site2"]);
        assert_eq!(report.removed, vec!["site"]);
        let names: Vec<String> = registry.all().iter().map(|p| p.name().to_string()).collect();
        assert_eq!(names, vec!["site2"]);
    }

    #[test]
    fn test_duplicate_name_keeps_highest_version() {
        let dir = tempfile::tempdir().unwrap();
        write_package(dir.path(), "mn-1.10.0", serde_json::json!({"name": "mn", "version": "1.10.0"}), &[("index.html", "new")]);
        let old = write_package(dir.path(), "mn-1.9.0", serde_json::json!({"name": "mn", "version": "1.9.0"}), &[("index.html", "old")]);

        let registry = PackageRegistry::new();
        let report = load_all(&registry, &config(dir.path())).unwrap();

        assert_eq!(registry.lookup("mn").unwrap().version().to_string(), "1.10.0");
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, old);
        assert!(report.failed[0].1.contains("shadowed"));
    }

    fn operator_mount(package: &str, path: &str) -> MountConfig {
        MountConfig {
            package: package.into(),
            path: path.into(),
            domain: None,
            id: None,
            headers: Default::default(),
            cache_ttl_secs: None,
        }
    }
}
