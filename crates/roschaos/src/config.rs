// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Toolkit configuration.
//!
//! Supports both programmatic and file-based configuration. Command-line
//! flags override file values, which override the `ROS_MASTER_URI`
//! environment value captured at startup.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Environment variable naming the registry address.
pub const MASTER_URI_ENV: &str = "ROS_MASTER_URI";

/// Registry address used when nothing else is configured.
pub const DEFAULT_MASTER_URI: &str = "http://localhost:11311/";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Toolkit configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChaosConfig {
    /// Registry XML-RPC address. `None` falls back to the environment.
    #[serde(default)]
    pub registry_uri: Option<String>,

    /// Caller identity for calls not scoped to a target node.
    #[serde(default = "default_caller_id")]
    pub caller_id: String,

    /// Per-call timeout (seconds).
    #[serde(default = "default_timeout")]
    pub timeout_secs: f64,

    /// Maximum number of mutation calls in flight.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Log level.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_caller_id() -> String {
    "/roschaos".to_string()
}

fn default_timeout() -> f64 {
    3.0
}

fn default_concurrency() -> usize {
    8
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ChaosConfig {
    fn default() -> Self {
        Self {
            registry_uri: None,
            caller_id: default_caller_id(),
            timeout_secs: default_timeout(),
            concurrency: default_concurrency(),
            log_level: default_log_level(),
        }
    }
}

impl ChaosConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(ref uri) = self.registry_uri {
            validate_uri(uri)?;
        }

        if !self.caller_id.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "caller_id must be a global name, got '{}'",
                self.caller_id
            )));
        }

        if !self.timeout_secs.is_finite() || self.timeout_secs <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "timeout_secs must be positive, got {}",
                self.timeout_secs
            )));
        }
        if Duration::try_from_secs_f64(self.timeout_secs).is_err() {
            return Err(ConfigError::Invalid(format!(
                "timeout_secs is out of range, got {}",
                self.timeout_secs
            )));
        }

        if self.concurrency == 0 {
            return Err(ConfigError::Invalid("concurrency must be at least 1".into()));
        }

        Ok(())
    }

    /// Example configuration written by `gen-config`.
    pub fn example() -> Self {
        Self {
            registry_uri: Some(DEFAULT_MASTER_URI.to_string()),
            ..Default::default()
        }
    }

    /// Render as a commented TOML document.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        let body = toml::to_string_pretty(self)?;
        Ok(format!(
            "# roschaos configuration\n# Generated by roschaos gen-config\n\n{}",
            body
        ))
    }

    /// Per-call timeout as a duration.
    ///
    /// Values that do not fit a `Duration` saturate; `validate` rejects them.
    pub fn timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.timeout_secs).unwrap_or(Duration::MAX)
    }

    /// Effective registry address: configured value, then `env_uri`, then the default.
    pub fn resolve_registry_uri(&self, env_uri: Option<String>) -> String {
        self.registry_uri
            .clone()
            .or(env_uri.filter(|uri| !uri.is_empty()))
            .unwrap_or_else(|| DEFAULT_MASTER_URI.to_string())
    }
}

/// Check that a registry or node address is an HTTP URI.
pub fn validate_uri(uri: &str) -> Result<(), ConfigError> {
    let rest = uri
        .strip_prefix("http://")
        .or_else(|| uri.strip_prefix("https://"));
    match rest {
        Some(host) if !host.is_empty() && !host.starts_with('/') => Ok(()),
        _ => Err(ConfigError::Invalid(format!(
            "'{}' is not an http:// address",
            uri
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = ChaosConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.timeout(), Duration::from_secs(3));
        assert_eq!(config.caller_id, "/roschaos");
    }

    #[test]
    fn test_config_validation() {
        let mut config = ChaosConfig {
            caller_id: "roschaos".into(),
            ..Default::default()
        };
        assert!(config.validate().is_err()); // Relative caller id

        config.caller_id = "/roschaos".into();
        config.concurrency = 0;
        assert!(config.validate().is_err());

        config.concurrency = 4;
        config.timeout_secs = 0.0;
        assert!(config.validate().is_err());

        config.timeout_secs = 1.5;
        config.registry_uri = Some("localhost:11311".into());
        assert!(config.validate().is_err());

        config.registry_uri = Some("http://robot:11311/".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_timeout_out_of_range() {
        let config = ChaosConfig {
            timeout_secs: 1e30,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
        assert_eq!(config.timeout(), Duration::MAX);
    }

    #[test]
    fn test_resolve_registry_uri() {
        let config = ChaosConfig::default();
        assert_eq!(config.resolve_registry_uri(None), DEFAULT_MASTER_URI);
        assert_eq!(
            config.resolve_registry_uri(Some("http://env:11311/".into())),
            "http://env:11311/"
        );
        assert_eq!(config.resolve_registry_uri(Some(String::new())), DEFAULT_MASTER_URI);

        let config = ChaosConfig {
            registry_uri: Some("http://file:11311/".into()),
            ..Default::default()
        };
        assert_eq!(
            config.resolve_registry_uri(Some("http://env:11311/".into())),
            "http://file:11311/"
        );
    }

    #[test]
    fn test_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(
            file,
            "registry_uri = \"http://robot:11311/\"\ntimeout_secs = 1.0\nconcurrency = 2"
        )
        .expect("write");

        let config = ChaosConfig::from_file(file.path()).expect("load");
        assert_eq!(config.registry_uri.as_deref(), Some("http://robot:11311/"));
        assert_eq!(config.concurrency, 2);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_config_from_file_invalid() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(file, "concurrency = 0").expect("write");
        assert!(matches!(
            ChaosConfig::from_file(file.path()),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_config_serialization() {
        let config = ChaosConfig {
            registry_uri: Some("http://robot:11311/".into()),
            ..Default::default()
        };
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        assert!(toml_str.contains("registry_uri = \"http://robot:11311/\""));
        assert!(toml_str.contains("concurrency = 8"));
    }

    #[test]
    fn test_example_parses_back() {
        let text = ChaosConfig::example().to_toml().expect("render");
        assert!(text.starts_with("# roschaos configuration"));
        let config: ChaosConfig = toml::from_str(&text).expect("parse");
        assert!(config.validate().is_ok());
        assert_eq!(config.registry_uri.as_deref(), Some(DEFAULT_MASTER_URI));
    }
}
