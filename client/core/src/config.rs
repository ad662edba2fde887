//! Client Configuration
//!
//! Centralized configuration for the streaming client, loaded with the
//! following priority (highest first):
//!
//! 1. Environment variables
//! 2. TOML configuration file at `$XDG_CONFIG_HOME/counsel/config.toml`
//! 3. Default values
//!
//! The service base address is injected here rather than hardcoded at the
//! call sites, so every request shares one configured target.
//!
//! # Environment Variables
//!
//! - `COUNSEL_BASE_URL`: service base address
//! - `COUNSEL_TOP_K`: retrieval depth for new conversations
//! - `COUNSEL_TIMEOUT_SECS`: whole-request timeout in seconds
//!
//! # Example Configuration
//!
//! ```toml
//! base_url = "http://127.0.0.1:8080"
//! top_k = 1
//! timeout_secs = 120
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the config file
    #[error("failed to read config file at {path}: {source}")]
    Read {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("failed to parse TOML config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Optional values as they appear in the TOML file
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct ConfigToml {
    base_url: Option<String>,
    top_k: Option<u32>,
    timeout_secs: Option<u64>,
}

/// Resolved client configuration
#[derive(Clone, Debug, PartialEq)]
pub struct ClientConfig {
    /// Base address of the QA service
    pub base_url: String,
    /// Retrieval depth sent with new-conversation requests
    pub top_k: u32,
    /// Whole-request timeout
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
            top_k: 1,
            timeout: Duration::from_secs(120),
        }
    }
}

impl ClientConfig {
    /// Load configuration from the default file location and the
    /// environment, falling back to defaults.
    ///
    /// A missing config file is not an error; an unreadable or malformed
    /// one is.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match default_config_path() {
            Some(path) if path.exists() => Self::from_file(&path)?,
            _ => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Load configuration from a specific TOML file, then apply
    /// environment overrides.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let file: ConfigToml = toml::from_str(&text)?;

        let defaults = Self::default();
        Ok(Self {
            base_url: file.base_url.unwrap_or(defaults.base_url),
            top_k: file.top_k.unwrap_or(defaults.top_k),
            timeout: file
                .timeout_secs
                .map_or(defaults.timeout, Duration::from_secs),
        })
    }

    /// Create configuration from environment variables over defaults
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Overlay environment variables onto this configuration
    fn apply_env(&mut self) {
        if let Ok(base_url) = std::env::var("COUNSEL_BASE_URL") {
            if !base_url.trim().is_empty() {
                self.base_url = base_url.trim_end_matches('/').to_string();
            }
        }
        if let Some(top_k) = std::env::var("COUNSEL_TOP_K")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.top_k = top_k;
        }
        if let Some(secs) = std::env::var("COUNSEL_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.timeout = Duration::from_secs(secs);
        }
    }
}

/// Default config file path, following the XDG base directory layout
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("counsel").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.base_url, "http://127.0.0.1:8080");
        assert_eq!(config.top_k, 1);
        assert_eq!(config.timeout, Duration::from_secs(120));
    }

    #[test]
    fn test_from_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "base_url = \"http://qa.internal:9000\"").unwrap();
        writeln!(file, "top_k = 3").unwrap();

        let config = ClientConfig::from_file(&path).unwrap();
        assert_eq!(config.base_url, "http://qa.internal:9000");
        assert_eq!(config.top_k, 3);
        // Unspecified values keep their defaults.
        assert_eq!(config.timeout, Duration::from_secs(120));
    }

    // Sole test that touches the process environment; the other tests
    // read only files and defaults, so there is no cross-test race.
    #[test]
    fn test_env_overrides_file_overrides_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "base_url = \"http://file.internal:9000\"").unwrap();
        writeln!(file, "top_k = 3").unwrap();

        std::env::set_var("COUNSEL_BASE_URL", "http://env.internal:7000/");
        std::env::set_var("COUNSEL_TOP_K", "not-a-number");
        std::env::set_var("COUNSEL_TIMEOUT_SECS", "30");

        let mut config = ClientConfig::from_file(&path).unwrap();
        config.apply_env();

        std::env::remove_var("COUNSEL_BASE_URL");
        std::env::remove_var("COUNSEL_TOP_K");
        std::env::remove_var("COUNSEL_TIMEOUT_SECS");

        // Env wins over the file, with the trailing slash normalized.
        assert_eq!(config.base_url, "http://env.internal:7000");
        // An unparseable numeric env value is ignored; the file wins.
        assert_eq!(config.top_k, 3);
        // Env wins over the default when the file is silent.
        assert_eq!(config.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "base_url = [not toml").unwrap();

        let err = ClientConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let err = ClientConfig::from_file(Path::new("/nonexistent/config.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
