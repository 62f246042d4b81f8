//! Package subsystem.
//!
//! # Data Flow
//! ```text
//! <package_dir>/<pkg>/manifest.json + content/
//!     → loader.rs (read manifest, merge operator mounts)
//!     → manifest.rs (validate into Manifest)
//!     → content.rs (walk + hash into ContentIndex)
//!     → registry.rs (conflict checks, publish new snapshot)
//!
//! While serving:
//!     watcher.rs → reload on SIGHUP / file change, periodic reindex
//! ```
//!
//! # Design Decisions
//! - Packages are immutable once registered; changes publish replacements
//! - Symlinks are never indexed, so nothing outside a package is served

pub mod content;
pub mod loader;
pub mod manifest;
pub mod registry;
pub mod watcher;

pub use content::{ContentEntry, ContentError, ContentHash, ContentIndex};
pub use loader::{load_all, LoadError, LoadReport};
pub use manifest::{Manifest, ManifestError, Mount};
pub use registry::{Package, PackageRegistry, RegistryError, RegistrySnapshot};
pub use watcher::{start_package_watcher, PackageWatcher, ReloadHandle};
