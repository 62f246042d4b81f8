//! Request resolution.
//!
//! # Responsibilities
//! - Map an inbound (host, path) pair to a (package, mount, relative file)
//! - Apply directory-index canonicalization in one place
//! - Return an explicit outcome: a file, a redirect to the slash form of a
//!   directory, `NotFound` or `NoMountMatch`
//!
//! # Precedence
//! Bindings arrive from the registry snapshot already sorted by the
//! specificity comparator (domain scope, prefix depth, registration order),
//! so the first binding that matches is the winner.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::headers::{headers_for, HeaderSet};
use crate::package::content::ContentIndex;
use crate::package::manifest::{Manifest, Mount};
use crate::package::registry::{MountBinding, Package, RegistrySnapshot};
use crate::routing::matcher::{mount_matches, normalize_host};
use crate::routing::path::{InvalidPath, NormalizedPath};

/// Directory index candidates, in lookup order.
pub const INDEX_FILES: [&str; 2] = ["index", "index.html"];

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error(transparent)]
    InvalidPath(#[from] InvalidPath),

    #[error("no mount matches {host}{path}")]
    NoMountMatch { host: String, path: String },

    #[error("{path} not found in package {package}")]
    NotFound { package: String, path: String },
}

impl ResolveError {
    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidPath(_) => "invalid_path",
            Self::NoMountMatch { .. } => "no_mount_match",
            Self::NotFound { .. } => "not_found",
        }
    }
}

/// A request resolved to one file of one package.
#[derive(Debug, Clone)]
pub struct Resolution {
    binding: MountBinding,
    index: Arc<ContentIndex>,
    relative_path: String,
}

impl Resolution {
    pub fn package(&self) -> &Arc<Package> {
        self.binding.package()
    }

    pub fn mount(&self) -> &Mount {
        self.binding.mount()
    }

    /// Canonical package-relative path of the selected file.
    pub fn relative_path(&self) -> &str {
        &self.relative_path
    }

    /// Absolute path of the file for the transport to stream.
    pub fn file_path(&self) -> PathBuf {
        self.index.root().join(&self.relative_path)
    }

    /// Headers the header policy attaches to this file.
    pub fn headers(&self) -> HeaderSet {
        headers_for(self.package().manifest(), self.mount(), &self.relative_path)
    }
}

/// What a request resolved to.
#[derive(Debug, Clone)]
pub enum Target {
    File(Resolution),
    /// A directory requested without its trailing slash. Carries the
    /// location of the slash form.
    Redirect(String),
}

/// Outcome of directory-index canonicalization.
enum Canonical {
    File(String),
    AddSlash,
}

/// Resolve against one registry snapshot.
pub fn resolve(
    snapshot: &RegistrySnapshot,
    host: Option<&str>,
    raw_path: &str,
) -> Result<Target, ResolveError> {
    let path = NormalizedPath::parse(raw_path)?;
    let host = host.and_then(normalize_host);

    let binding = snapshot
        .bindings()
        .iter()
        .find(|b| mount_matches(b.mount(), host.as_deref(), &path))
        .ok_or_else(|| ResolveError::NoMountMatch {
            host: host.clone().unwrap_or_default(),
            path: path.to_string(),
        })?;

    let package = binding.package();
    let index = package.index();
    let remainder = path.strip(binding.mount().prefix.depth());

    let canonical = canonical_target(package.manifest(), &index, remainder, path.has_trailing_slash())
        .ok_or_else(|| ResolveError::NotFound {
            package: package.name().to_string(),
            path: remainder.join("/"),
        })?;

    match canonical {
        Canonical::File(relative_path) => {
            Ok(Target::File(Resolution { binding: binding.clone(), index, relative_path }))
        }
        Canonical::AddSlash => {
            let raw = raw_path.split(['?', '#']).next().unwrap_or_default();
            Ok(Target::Redirect(format!("{raw}/")))
        }
    }
}

/// Pick the file a package-relative request path refers to.
///
/// Explicit manifest routes are consulted first. Otherwise a trailing
/// slash or a final `index` or `index.html` segment select the directory's
/// index file, the first entry of [`INDEX_FILES`] present. A directory
/// named without its trailing slash (including the mount root itself)
/// asks for a redirect, as long as the directory has an index file.
fn canonical_target(
    manifest: &Manifest,
    index: &ContentIndex,
    remainder: &[String],
    trailing_slash: bool,
) -> Option<Canonical> {
    let relative = remainder.join("/");
    if let Some(route) = manifest.route(&relative) {
        return index.contains(&route.target).then(|| Canonical::File(route.target.clone()));
    }

    let (directory, add_slash): (&[String], bool) = match remainder.split_last() {
        None => (remainder, !trailing_slash),
        Some(_) if trailing_slash => (remainder, false),
        Some((last, parent)) if INDEX_FILES.contains(&last.as_str()) => (parent, false),
        Some(_) if index.contains(&relative) => return Some(Canonical::File(relative)),
        Some(_) if index.is_dir(&relative) => (remainder, true),
        Some(_) => return None,
    };

    let directory = directory.join("/");
    let index_file = INDEX_FILES
        .iter()
        .map(|file| if directory.is_empty() { file.to_string() } else { format!("{directory}/{file}") })
        .find(|candidate| index.contains(candidate))?;

    Some(if add_slash { Canonical::AddSlash } else { Canonical::File(index_file) })
}
