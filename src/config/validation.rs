//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, addresses parse)
//! - Check operator mounts (prefix, domain, header syntax)
//! - Detect operator mounts that collide with each other
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: RouterConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system
//! - Collisions with package-declared mounts are caught later, at registration

use std::collections::HashSet;
use std::net::SocketAddr;

use crate::config::schema::{MountConfig, RouterConfig};
use crate::headers::HeaderSet;
use crate::package::manifest::{Domain, PathPrefix};

/// One semantic problem in a config file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field, e.g. `mounts[1].path`.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self { field: field.into(), message: message.into() }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Validate a parsed configuration.
pub fn validate_config(config: &RouterConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("{:?} is not a socket address", config.listener.bind_address),
        ));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }

    if config.packages.package_dir.as_os_str().is_empty() {
        errors.push(ValidationError::new("packages.package_dir", "must not be empty"));
    }

    let observability = &config.observability;
    if observability.metrics_enabled && observability.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("{:?} is not a socket address", observability.metrics_address),
        ));
    }
    if tracing_subscriber::EnvFilter::try_new(&observability.log_level).is_err() {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("{:?} is not a valid filter", observability.log_level),
        ));
    }

    errors.extend(validate_mounts("mounts", &config.mounts));

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate a list of operator mounts; `section` prefixes field names.
pub fn validate_mounts(section: &str, mounts: &[MountConfig]) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();

    for (i, mount) in mounts.iter().enumerate() {
        let field = |name: &str| format!("{section}[{i}].{name}");

        if mount.package.trim().is_empty() {
            errors.push(ValidationError::new(field("package"), "must name a package"));
        }

        let prefix = PathPrefix::parse(&mount.path)
            .map_err(|e| errors.push(ValidationError::new(field("path"), e.to_string())))
            .ok();
        let domain = Domain::parse(mount.domain.as_deref().unwrap_or_default())
            .map_err(|e| errors.push(ValidationError::new(field("domain"), e.to_string())))
            .ok();

        if let Some(ttl) = mount.cache_ttl_secs {
            if ttl > u64::from(u32::MAX) {
                errors.push(ValidationError::new(field("cache_ttl_secs"), "is unreasonably large"));
            }
        }

        let mut headers = HeaderSet::new();
        for (name, value) in &mount.headers {
            if let Err(e) = headers.insert(name, value) {
                errors.push(ValidationError::new(field("headers"), e.to_string()));
            }
        }

        if let (Some(prefix), Some(domain)) = (prefix, domain) {
            let key = (mount.package.clone(), domain, prefix.to_string());
            if !seen.insert(key) {
                errors.push(ValidationError::new(
                    field("path"),
                    format!("{} is mounted twice for this package and domain", prefix),
                ));
            }
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_src: &str) -> RouterConfig {
        toml::from_str(toml_src).unwrap()
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&RouterConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_every_error() {
        let config = parse(
            r#"
            [listener]
            bind_address = "not-an-address"

            [timeouts]
            request_secs = 0

            [[mounts]]
            package = ""
            path = "app"

            [[mounts]]
            package = "site"
            path = "/api/v1/introspect/"
            "#,
        );
        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert!(fields.contains(&"listener.bind_address"));
        assert!(fields.contains(&"timeouts.request_secs"));
        assert!(fields.contains(&"mounts[0].package"));
        assert!(fields.contains(&"mounts[0].path"));
        assert!(fields.contains(&"mounts[1].path"));
    }

    #[test]
    fn test_rejects_bad_headers_and_duplicates() {
        let config = parse(
            r#"
            [[mounts]]
            package = "site"
            path = "/app/"
            headers = { "Bad Name" = "x" }

            [[mounts]]
            package = "site"
            path = "/app"
            "#,
        );
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].field, "mounts[0].headers");
        assert_eq!(errors[1].field, "mounts[1].path");
    }

    #[test]
    fn test_same_path_on_other_domain_is_fine() {
        let config = parse(
            r#"
            [[mounts]]
            package = "site"
            path = "/app/"

            [[mounts]]
            package = "site"
            path = "/app/"
            domain = "example.com"
            "#,
        );
        assert!(validate_config(&config).is_ok());
    }
}
