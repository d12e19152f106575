//! Configuration management using Figment
//!
//! Configuration is loaded from multiple sources with the following precedence (highest to lowest):
//! 1. Environment variables (prefix: RESQ_, nested keys separated by `__`)
//! 2. Current working directory: ./resq.toml (or an explicit file)
//! 3. Default values
//!
//! ```toml
//! [engine]
//! default_page_size = 50
//! max_page_size = 500
//! search_limit = 20
//!
//! [logging]
//! level = "debug"
//! json = true
//! ```

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Name of the configuration file looked up in the working directory
pub const CONFIG_FILE: &str = "resq.toml";

/// Prefix of configuration environment variables
pub const ENV_PREFIX: &str = "RESQ_";

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Query engine settings
    #[serde(default)]
    pub engine: EngineConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Query engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Page size when the caller gives none
    #[serde(default = "default_page_size")]
    pub default_page_size: usize,

    /// Largest page size a caller may ask for
    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,

    /// Maximum number of search results
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level or filter directive (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
            search_limit: default_search_limit(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl EngineConfig {
    /// Apply the default and maximum page sizes to a caller-supplied limit
    ///
    /// An explicit zero is kept: it asks for an empty page.
    pub fn clamp_limit(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_page_size)
            .min(self.max_page_size)
    }
}

impl Config {
    /// Load configuration from defaults, ./resq.toml and the environment
    pub fn load() -> Result<Self> {
        Self::load_from(CONFIG_FILE)
    }

    /// Load configuration from a specific file
    ///
    /// A missing file is not an error; defaults and environment still apply.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            tracing::debug!("Loading configuration from: {}", path.display());
        }

        let config = Figment::new()
            // Start with defaults
            .merge(Serialized::defaults(Config::default()))
            // Load from config file (if exists)
            .merge(Toml::file(path))
            // Override with environment variables
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;

        Ok(config)
    }
}

fn default_page_size() -> usize {
    crate::query::DEFAULT_PAGE_SIZE
}

fn default_max_page_size() -> usize {
    500
}

fn default_search_limit() -> usize {
    20
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.engine.default_page_size, 50);
        assert_eq!(config.engine.max_page_size, 500);
        assert_eq!(config.engine.search_limit, 20);
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json);
    }

    #[test]
    fn test_clamp_limit() {
        let engine = EngineConfig::default();
        assert_eq!(engine.clamp_limit(None), 50);
        assert_eq!(engine.clamp_limit(Some(10)), 10);
        assert_eq!(engine.clamp_limit(Some(0)), 0);
        assert_eq!(engine.clamp_limit(Some(10_000)), 500);
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[engine]\nsearch_limit = 5\n\n[logging]\nlevel = \"debug\"\njson = true"
        )
        .unwrap();

        let config = Config::load_from(file.path()).unwrap();
        assert_eq!(config.engine.search_limit, 5);
        assert_eq!(config.engine.default_page_size, 50);
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json);
    }

    #[test]
    fn test_load_from_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.engine, EngineConfig::default());
    }

    #[test]
    fn test_invalid_file_is_a_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[engine]\nsearch_limit = \"many\"").unwrap();
        let error = Config::load_from(file.path()).unwrap_err();
        assert!(matches!(error, crate::error::Error::Config(_)));
    }
}
