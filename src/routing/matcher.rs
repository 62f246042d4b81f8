//! Mount matching logic.
//!
//! # Responsibilities
//! - Normalize the Host header (case, port, trailing dot)
//! - Match a mount's domain binding against the host
//! - Match a mount's path prefix against a normalized path, segment-wise
//!
//! # Rules
//! - Host matching is case-insensitive (RFC 9110)
//! - Path matching is case-sensitive
//! - A mount without a domain matches every host, including a missing one

use crate::package::manifest::Mount;
use crate::routing::path::NormalizedPath;

/// Lowercase the host and strip any port and trailing dot.
pub fn normalize_host(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let host = if raw.starts_with('[') {
        // IPv6 literal, keep the brackets.
        match raw.find(']') {
            Some(end) => &raw[..=end],
            None => raw,
        }
    } else {
        match raw.rsplit_once(':') {
            Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) => host,
            _ => raw,
        }
    };
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    if host.is_empty() {
        None
    } else {
        Some(host)
    }
}

/// True if the mount's domain binding accepts `host` (already normalized).
pub fn domain_matches(mount: &Mount, host: Option<&str>) -> bool {
    match (&mount.domain, host) {
        (None, _) => true,
        (Some(domain), Some(host)) => domain.as_str() == host,
        (Some(_), None) => false,
    }
}

/// True if the mount's prefix is a segment prefix of `path`.
pub fn prefix_matches(mount: &Mount, path: &NormalizedPath) -> bool {
    path.starts_with(mount.prefix.segments())
}

/// Both conditions, AND semantics.
pub fn mount_matches(mount: &Mount, host: Option<&str>, path: &NormalizedPath) -> bool {
    domain_matches(mount, host) && prefix_matches(mount, path)
}
