//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use crate::config::schema::RouterConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Load and validate configuration from a TOML file.
///
/// A relative `packages.package_dir` or `packages.mounts_dir` is taken
/// relative to the directory holding the config file.
pub fn load_config(path: &Path) -> Result<RouterConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    let mut config = parse_config(&content)?;

    if let Some(base) = path.parent() {
        if config.packages.package_dir.is_relative() {
            config.packages.package_dir = base.join(&config.packages.package_dir);
        }
        if let Some(dir) = config.packages.mounts_dir.as_mut() {
            if dir.is_relative() {
                *dir = base.join(&*dir);
            }
        }
    }

    Ok(config)
}

/// Parse and validate configuration from a TOML string.
pub fn parse_config(content: &str) -> Result<RouterConfig, ConfigError> {
    let config: RouterConfig = toml::from_str(content).map_err(ConfigError::Parse)?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_resolves_relative_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("router.toml");
        fs::write(
            &path,
            "[packages]\npackage_dir = \"pkgs\"\nmounts_dir = \"mounts.d\"\n",
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.packages.package_dir, dir.path().join("pkgs"));
        assert_eq!(config.packages.mounts_dir, Some(dir.path().join("mounts.d")));
    }

    #[test]
    fn test_error_kinds() {
        let err = load_config(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));

        let err = parse_config("listener = 3").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));

        let err = parse_config("[timeouts]\nrequest_secs = 0\n").unwrap_err();
        assert!(err.to_string().starts_with("Validation failed: timeouts.request_secs"));
    }
}
