//! Host configuration.

use crate::error::ConfigError;
use serde::Deserialize;

/// Settings for a [`Host`](crate::Host).
///
/// ```toml
/// surface = "main-window"
/// reuse_nodes = true
/// max_depth = 256
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HostConfig {
    /// Reuse nodes across passes. When off, every pass rebuilds all native widgets below the root.
    pub reuse_nodes: bool,
    /// Descriptor nesting limit; deeper subtrees are dropped with a diagnostic.
    pub max_depth: usize,
    /// Name of the hosting surface, used in log spans.
    pub surface: String,
}

impl Default for HostConfig {
    fn default() -> HostConfig {
        HostConfig {
            reuse_nodes: true,
            max_depth: 256,
            surface: "main".into(),
        }
    }
}

impl HostConfig {
    pub fn from_toml_str(s: &str) -> Result<HostConfig, ConfigError> {
        Ok(toml::from_str(s)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_use_defaults() {
        let config = HostConfig::from_toml_str("surface = \"inspector\"").unwrap();
        assert_eq!(config.surface, "inspector");
        assert!(config.reuse_nodes);
        assert_eq!(config.max_depth, 256);
        assert_eq!(HostConfig::from_toml_str("").unwrap(), HostConfig::default());
    }

    #[test]
    fn full_config() {
        let config = HostConfig::from_toml_str(
            r#"
            surface = "sidebar"
            reuse_nodes = false
            max_depth = 16
            "#,
        )
        .unwrap();
        assert!(!config.reuse_nodes);
        assert_eq!(config.max_depth, 16);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(matches!(
            HostConfig::from_toml_str("max_depth = \"deep\""),
            Err(ConfigError::Parse(_))
        ));
        assert!(HostConfig::from_toml_str("reuse = true").is_err());
    }
}
