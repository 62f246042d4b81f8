//! Response header policy.
//!
//! # Responsibilities
//! - Collect the header rules that apply to a resolved file
//! - Overlay them from least to most specific scope
//!
//! # Precedence
//! ```text
//! package  <  mount  <  route prefix (shorter < longer)  <  route exact
//! ```
//! Rules of equal specificity apply in declaration order, so a later
//! declaration wins. Nothing is synthesized: only declared headers appear.

use crate::headers::HeaderSet;
use crate::package::manifest::{HeaderScope, Manifest, Mount};

/// Ordering key for a rule; `None` when the rule does not apply.
fn rank(scope: &HeaderScope, mount: &Mount, relative_path: &str) -> Option<(u8, u8, usize)> {
    match scope {
        HeaderScope::Package => Some((0, 0, 0)),
        HeaderScope::Mount(id) if *id == mount.id => Some((1, 0, 0)),
        HeaderScope::Mount(_) => None,
        HeaderScope::Route(pattern) if pattern.matches(relative_path) => {
            let (kind, len) = pattern.specificity();
            Some((2, kind, len))
        }
        HeaderScope::Route(_) => None,
    }
}

/// Compute the headers for `relative_path` served through `mount`.
pub fn headers_for(manifest: &Manifest, mount: &Mount, relative_path: &str) -> HeaderSet {
    let mut applicable: Vec<_> = manifest
        .header_rules
        .iter()
        .filter_map(|rule| rank(&rule.scope, mount, relative_path).map(|key| (key, rule)))
        .collect();
    // Stable sort keeps declaration order among equal keys.
    applicable.sort_by_key(|(key, _)| *key);

    let mut headers = HeaderSet::new();
    for (_, rule) in applicable {
        headers.merge(&rule.values);
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::manifest::ManifestFile;

    fn manifest() -> Manifest {
        let file: ManifestFile = serde_json::from_value(serde_json::json!({
            "name": "site",
            "version": "1.0.0",
            "mounts": [
                {"id": "app", "path": "/app/", "headers": {"X-Frame-Options": "SAMEORIGIN"}},
                {"id": "app-example", "path": "/app/", "domain": "example.com",
                 "headers": {"X-Frame-Options": "DENY", "X-Domain": "example"}}
            ],
            "headers": [
                {"scope": "package", "values": {"X-Frame-Options": "NONE", "X-Level": "package"}},
                {"scope": "route", "pattern": "*", "values": {"X-Level": "all"}},
                {"scope": "route", "pattern": "docs/*", "values": {"X-Level": "docs"}},
                {"scope": "route", "pattern": "docs/a.html", "values": {"X-Level": "exact"}}
            ]
        }))
        .unwrap();
        Manifest::from_file(file).unwrap()
    }

    #[test]
    fn test_mount_overrides_package() {
        let manifest = manifest();
        let headers = headers_for(&manifest, manifest.mount("app").unwrap(), "index.html");
        assert_eq!(headers.get("X-Frame-Options"), Some("SAMEORIGIN"));
        assert_eq!(headers.get("X-Level"), Some("all"));
        assert_eq!(headers.get("X-Domain"), None);
    }

    #[test]
    fn test_domain_mount_has_its_own_headers() {
        let manifest = manifest();
        let headers = headers_for(&manifest, manifest.mount("app-example").unwrap(), "index.html");
        assert_eq!(headers.get("X-Frame-Options"), Some("DENY"));
        assert_eq!(headers.get("X-Domain"), Some("example"));
    }

    #[test]
    fn test_most_specific_route_wins() {
        let manifest = manifest();
        let mount = manifest.default_mount();
        assert_eq!(headers_for(&manifest, mount, "docs/b.html").get("X-Level"), Some("docs"));
        assert_eq!(headers_for(&manifest, mount, "docs/a.html").get("X-Level"), Some("exact"));
        assert_eq!(headers_for(&manifest, mount, "x.html").get("X-Frame-Options"), Some("NONE"));
    }

    #[test]
    fn test_pure_and_no_synthesized_headers() {
        let file: ManifestFile =
            serde_json::from_value(serde_json::json!({"name": "bare", "version": "0.1.0"})).unwrap();
        let bare = Manifest::from_file(file).unwrap();
        assert!(headers_for(&bare, bare.default_mount(), "index.html").is_empty());

        let manifest = manifest();
        let mount = manifest.mount("app").unwrap();
        assert_eq!(headers_for(&manifest, mount, "docs/a.html"), headers_for(&manifest, mount, "docs/a.html"));
    }
}
