//! core::config
//!
//! Mapping configuration loading.
//!
//! # Overview
//!
//! A mapping configuration tells the build pipeline which source facts feed
//! which composition addresses, how to render them, and which fallbacks to
//! apply. It is a single TOML document; see [`schema`] for its shape.
//!
//! # Example
//!
//! ```
//! use flatweave::core::config::MappingConfig;
//!
//! let config = MappingConfig::parse(
//!     r#"
//!     [paths."test/context/status"]
//!     maps_to = ["/status"]
//!     suffixes = { "" = "{{maps_to.[0]}}" }
//!     "#,
//! )
//! .unwrap();
//!
//! assert!(config.set_missing_required_to_default());
//! assert_eq!(config.source_keys(), vec!["/status"]);
//! ```

pub mod schema;

pub use schema::{EhrIdConfig, MappingConfig, PathMapping, PathRule, PathSpec};

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("invalid config value: {0}")]
    InvalidValue(String),
}

/// Label used for configs parsed from memory.
const INLINE: &str = "<inline>";

impl MappingConfig {
    /// Read, parse and validate a config file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ReadError` if the file cannot be read,
    /// `ConfigError::ParseError` for malformed TOML or unknown keys, and
    /// `ConfigError::InvalidValue` if validation fails.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::parse_at(&contents, path)
    }

    /// Parse and validate a config held in memory.
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        Self::parse_at(contents, Path::new(INLINE))
    }

    fn parse_at(contents: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }
}
