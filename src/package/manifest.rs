//! Package manifests.
//!
//! # Data Flow
//! ```text
//! manifest.json (+ operator mounts from the router config)
//!     → ManifestFile (serde, syntactic)
//!     → Manifest::from_file (semantic checks)
//!     → Manifest (validated, immutable)
//! ```
//!
//! A validated manifest always starts with the implicit default mount
//! `/capsium/<name>-<version>/`.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::headers::{HeaderError, HeaderSet};
use crate::routing::path::NormalizedPath;

/// Id of the implicit mount every package gets.
pub const DEFAULT_MOUNT_ID: &str = "default";

/// Path segment under which default mounts live.
pub const DEFAULT_MOUNT_ROOT: &str = "capsium";

/// Reserved namespace, never resolvable as package content.
pub const INTROSPECTION_PREFIX: &str = "/api/v1/introspect";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ManifestError {
    #[error("invalid package name {0:?}")]
    InvalidName(String),

    #[error("invalid version {version:?}: {reason}")]
    InvalidVersion { version: String, reason: String },

    #[error("invalid mount path {path:?}: {reason}")]
    InvalidMountPath { path: String, reason: String },

    #[error("invalid domain {0:?}")]
    InvalidDomain(String),

    #[error("mount {path} for {domain} declared twice")]
    DuplicateMount { domain: String, path: String },

    #[error("mount id {0:?} declared twice")]
    DuplicateMountId(String),

    #[error("header rule references undeclared mount {0:?}")]
    UndeclaredMount(String),

    #[error("malformed header rule: {0}")]
    Header(#[from] HeaderError),

    #[error("invalid route pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("invalid route {path:?} -> {target:?}: {reason}")]
    InvalidRoute { path: String, target: String, reason: String },

    #[error("route {path:?} targets missing file {target:?}")]
    MissingRouteTarget { path: String, target: String },
}

// ---------------------------------------------------------------------------
// On-disk shape
// ---------------------------------------------------------------------------

/// `manifest.json` as written by the packager.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ManifestFile {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub mounts: Vec<MountDecl>,
    #[serde(default)]
    pub headers: Vec<HeaderRuleDecl>,
    #[serde(default)]
    pub routes: Vec<RouteDecl>,
}

/// A custom mount declaration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MountDecl {
    /// Referenced by `mount` header rules. Generated when absent.
    #[serde(default)]
    pub id: Option<String>,
    pub path: String,
    /// Host to bind to; absent or `*` means any host.
    #[serde(default)]
    pub domain: Option<String>,
    /// Headers scoped to this mount.
    #[serde(default)]
    pub headers: IndexMap<String, String>,
    /// Declared cache lifetime, emitted as `Cache-Control: max-age`.
    #[serde(default)]
    pub cache_ttl_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "scope", rename_all = "lowercase")]
pub enum HeaderRuleDecl {
    Package { values: IndexMap<String, String> },
    Mount { mount: String, values: IndexMap<String, String> },
    Route { pattern: String, values: IndexMap<String, String> },
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteDecl {
    pub path: String,
    pub target: String,
}

// ---------------------------------------------------------------------------
// Validated shape
// ---------------------------------------------------------------------------

/// Lowercased host name a mount is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Domain(String);

impl Domain {
    /// Parse a declared domain. `None` means wildcard.
    pub fn parse(raw: &str) -> Result<Option<Self>, ManifestError> {
        let trimmed = raw.trim().trim_end_matches('.');
        if trimmed.is_empty() || trimmed == "*" {
            return Ok(None);
        }
        let valid = trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.');
        if !valid {
            return Err(ManifestError::InvalidDomain(raw.to_string()));
        }
        Ok(Some(Self(trimmed.to_ascii_lowercase())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Normalized mount path, compared segment-wise.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathPrefix {
    segments: Vec<String>,
}

impl PathPrefix {
    pub fn parse(raw: &str) -> Result<Self, ManifestError> {
        let invalid = |reason: &str| ManifestError::InvalidMountPath {
            path: raw.to_string(),
            reason: reason.to_string(),
        };
        if !raw.starts_with('/') {
            return Err(invalid("must start with '/'"));
        }
        let normalized = NormalizedPath::parse(raw).map_err(|e| invalid(e.reason))?;
        let reserved = NormalizedPath::parse(INTROSPECTION_PREFIX).map_err(|e| invalid(e.reason))?;
        if normalized.starts_with(reserved.segments()) {
            return Err(invalid("inside the introspection namespace"));
        }
        Ok(Self { segments: normalized.segments().to_vec() })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Number of segments; the longest-prefix rule compares this.
    pub fn depth(&self) -> usize {
        self.segments.len()
    }
}

impl fmt::Display for PathPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("/");
        }
        write!(f, "/{}/", self.segments.join("/"))
    }
}

/// A (domain, path-prefix) binding exposing a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    pub id: String,
    pub domain: Option<Domain>,
    pub prefix: PathPrefix,
}

impl Mount {
    pub fn is_default(&self) -> bool {
        self.id == DEFAULT_MOUNT_ID
    }

    /// Pattern shown by route introspection: `/app/` or `example.com/app/`.
    pub fn pattern(&self) -> String {
        match &self.domain {
            Some(domain) => format!("{}{}", domain, self.prefix),
            None => self.prefix.to_string(),
        }
    }
}

/// Package-relative path pattern for route-scoped headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutePattern {
    /// Exactly one relative path.
    Exact(String),
    /// Every path starting with the stored prefix (`docs/*` stores `docs/`).
    Prefix(String),
}

impl RoutePattern {
    pub fn parse(raw: &str) -> Result<Self, ManifestError> {
        let invalid = |reason: &str| ManifestError::InvalidPattern {
            pattern: raw.to_string(),
            reason: reason.to_string(),
        };
        let trimmed = raw.trim_start_matches('/');
        let (body, wildcard) = match trimmed.strip_suffix('*') {
            Some(body) => (body, true),
            None => (trimmed, false),
        };
        if body.contains('*') {
            return Err(invalid("'*' is only allowed as the final character"));
        }
        let normalized = NormalizedPath::parse_relative(body).map_err(|e| invalid(e.reason))?;
        let relative = normalized.relative();

        if wildcard {
            if !body.is_empty() && !body.ends_with('/') {
                return Err(invalid("wildcard must follow '/'"));
            }
            let prefix = if relative.is_empty() { String::new() } else { format!("{relative}/") };
            Ok(Self::Prefix(prefix))
        } else {
            Ok(Self::Exact(relative))
        }
    }

    pub fn matches(&self, relative_path: &str) -> bool {
        match self {
            Self::Exact(path) => path == relative_path,
            Self::Prefix(prefix) => relative_path.starts_with(prefix.as_str()),
        }
    }

    /// Ordering key: prefixes by length, then exact matches.
    pub fn specificity(&self) -> (u8, usize) {
        match self {
            Self::Prefix(prefix) => (0, prefix.len()),
            Self::Exact(path) => (1, path.len()),
        }
    }
}

/// Where a header rule applies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderScope {
    Package,
    Mount(String),
    Route(RoutePattern),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderRule {
    pub scope: HeaderScope,
    pub values: HeaderSet,
}

/// Explicit route: a relative request path served from `target`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    pub path: String,
    pub target: String,
}

/// Validated package manifest.
#[derive(Debug, Clone)]
pub struct Manifest {
    pub name: String,
    pub version: semver::Version,
    pub description: Option<String>,
    /// Default mount first, then custom mounts in declaration order.
    pub mounts: Vec<Mount>,
    pub header_rules: Vec<HeaderRule>,
    pub routes: Vec<RouteEntry>,
}

impl Manifest {
    /// Validate a parsed manifest file.
    pub fn from_file(file: ManifestFile) -> Result<Self, ManifestError> {
        validate_name(&file.name)?;
        let version = semver::Version::parse(file.version.trim()).map_err(|e| {
            ManifestError::InvalidVersion { version: file.version.clone(), reason: e.to_string() }
        })?;

        let default_mount = Mount {
            id: DEFAULT_MOUNT_ID.to_string(),
            domain: None,
            prefix: PathPrefix::parse(&format!("/{}/{}-{}/", DEFAULT_MOUNT_ROOT, file.name, version))?,
        };

        let mut mounts = vec![default_mount];
        let mut header_rules = Vec::new();

        for (position, decl) in file.mounts.iter().enumerate() {
            let id = decl.id.clone().unwrap_or_else(|| format!("mount-{}", position + 1));
            if mounts.iter().any(|m| m.id == id) {
                return Err(ManifestError::DuplicateMountId(id));
            }
            let mount = Mount {
                id: id.clone(),
                domain: Domain::parse(decl.domain.as_deref().unwrap_or_default())?,
                prefix: PathPrefix::parse(&decl.path)?,
            };
            if mounts.iter().any(|m| m.domain == mount.domain && m.prefix == mount.prefix) {
                return Err(ManifestError::DuplicateMount {
                    domain: describe_domain(&mount.domain),
                    path: mount.prefix.to_string(),
                });
            }

            let mut values = HeaderSet::new();
            if let Some(ttl) = decl.cache_ttl_secs {
                values.insert("Cache-Control", &format!("max-age={ttl}"))?;
            }
            for (name, value) in &decl.headers {
                values.insert(name, value)?;
            }
            if !values.is_empty() {
                header_rules.push(HeaderRule { scope: HeaderScope::Mount(id), values });
            }
            mounts.push(mount);
        }

        for decl in &file.headers {
            let (scope, values) = match decl {
                HeaderRuleDecl::Package { values } => (HeaderScope::Package, values),
                HeaderRuleDecl::Mount { mount, values } => {
                    if !mounts.iter().any(|m| &m.id == mount) {
                        return Err(ManifestError::UndeclaredMount(mount.clone()));
                    }
                    (HeaderScope::Mount(mount.clone()), values)
                }
                HeaderRuleDecl::Route { pattern, values } => {
                    (HeaderScope::Route(RoutePattern::parse(pattern)?), values)
                }
            };
            let values = HeaderSet::from_pairs(values.iter().map(|(k, v)| (k.as_str(), v.as_str())))?;
            header_rules.push(HeaderRule { scope, values });
        }

        let mut routes = Vec::with_capacity(file.routes.len());
        for decl in &file.routes {
            let invalid = |reason: String| ManifestError::InvalidRoute {
                path: decl.path.clone(),
                target: decl.target.clone(),
                reason,
            };
            let path = NormalizedPath::parse_relative(&decl.path).map_err(|e| invalid(e.to_string()))?;
            let target = NormalizedPath::parse_relative(&decl.target).map_err(|e| invalid(e.to_string()))?;
            if target.is_root() {
                return Err(invalid("target must name a file".to_string()));
            }
            routes.push(RouteEntry { path: path.relative(), target: target.relative() });
        }

        Ok(Self {
            name: file.name,
            version,
            description: file.description,
            mounts,
            header_rules,
            routes,
        })
    }

    pub fn default_mount(&self) -> &Mount {
        &self.mounts[0]
    }

    pub fn mount(&self, id: &str) -> Option<&Mount> {
        self.mounts.iter().find(|m| m.id == id)
    }

    /// Explicit route for a relative request path, if declared.
    pub fn route(&self, relative_path: &str) -> Option<&RouteEntry> {
        self.routes.iter().find(|r| r.path == relative_path)
    }
}

/// Human-readable domain for logs and errors.
pub fn describe_domain(domain: &Option<Domain>) -> String {
    domain.as_ref().map(|d| d.to_string()).unwrap_or_else(|| "*".to_string())
}

fn validate_name(name: &str) -> Result<(), ManifestError> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(ManifestError::InvalidName(name.to_string()))
    }
}
