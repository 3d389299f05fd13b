//! core::config
//!
//! Configuration schema and loading.
//!
//! # Locations
//!
//! Searched in order:
//! 1. `$LATCHWORK_CONFIG` if set
//! 2. `<config_dir>/latchwork/config.toml` (canonical write location)
//!
//! A missing file is not an error; defaults apply.
//!
//! # Example
//!
//! ```
//! use latchwork::core::config::Config;
//! use std::time::Duration;
//!
//! let config = Config::from_toml_str("[lock]\nacquire_retry_interval_ms = 250\n").unwrap();
//! assert_eq!(config.lock().acquire_retry_interval(), Duration::from_millis(250));
//! assert_eq!(config.cache().save_retry_attempts(), 5);
//! ```

pub mod schema;

pub use schema::{CacheConfig, FileConfig, LockConfig, RetryConfig, TrackingConfig};

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable that overrides the config file location.
pub const CONFIG_ENV: &str = "LATCHWORK_CONFIG";

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

    #[error("failed to write config file '{path}': {source}")]
    WriteError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config value: {0}")]
    InvalidValue(String),

    #[error("config directory not found")]
    NoConfigDir,
}

/// Loaded configuration with defaults applied by the section accessors.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Parsed file contents
    pub file: FileConfig,
    /// Path the configuration was loaded from
    loaded_from: Option<PathBuf>,
    cache: CacheConfig,
    lock: LockConfig,
    retry: RetryConfig,
    tracking: TrackingConfig,
}

impl Config {
    /// Build from already-parsed file contents.
    pub fn from_file(file: FileConfig) -> Self {
        Self {
            cache: file.cache.clone().unwrap_or_default(),
            lock: file.lock.clone().unwrap_or_default(),
            retry: file.retry.clone().unwrap_or_default(),
            tracking: file.tracking.clone().unwrap_or_default(),
            file,
            loaded_from: None,
        }
    }

    /// Load configuration from the default locations.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be parsed or
    /// fails validation.
    pub fn load() -> Result<Self, ConfigError> {
        match Self::find_config_file() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load configuration from an explicit path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let file: FileConfig = toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        file.validate()?;

        let mut config = Self::from_file(file);
        config.loaded_from = Some(path.to_path_buf());
        Ok(config)
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let file: FileConfig = toml::from_str(contents).map_err(|e| ConfigError::ParseError {
            path: PathBuf::from("<inline>"),
            message: e.to_string(),
        })?;
        file.validate()?;
        Ok(Self::from_file(file))
    }

    fn find_config_file() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let path = Self::config_path().ok()?;
        path.exists().then_some(path)
    }

    /// Canonical path for the config file.
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        let dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(dir.join("latchwork/config.toml"))
    }

    /// Write a config file atomically (temp file, then rename).
    ///
    /// Creates parent directories if needed.
    pub fn write(path: &Path, file: &FileConfig) -> Result<(), ConfigError> {
        file.validate()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError {
                path: path.to_path_buf(),
                source: e,
            })?;
        }

        let contents =
            toml::to_string_pretty(file).map_err(|e| ConfigError::InvalidValue(e.to_string()))?;

        let temp_path = path.with_extension("toml.tmp");
        let mut out = fs::File::create(&temp_path).map_err(|e| ConfigError::WriteError {
            path: temp_path.clone(),
            source: e,
        })?;
        out.write_all(contents.as_bytes())
            .and_then(|_| out.sync_all())
            .map_err(|e| ConfigError::WriteError {
                path: temp_path.clone(),
                source: e,
            })?;

        fs::rename(&temp_path, path).map_err(|e| ConfigError::WriteError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Cache-aside defaults.
    pub fn cache(&self) -> &CacheConfig {
        &self.cache
    }

    /// Distributed lock defaults.
    pub fn lock(&self) -> &LockConfig {
        &self.lock
    }

    /// Retry helper defaults.
    pub fn retry(&self) -> &RetryConfig {
        &self.retry
    }

    /// Tracking settings.
    pub fn tracking(&self) -> &TrackingConfig {
        &self.tracking
    }

    /// Path the configuration was loaded from, if any.
    pub fn loaded_from(&self) -> Option<&Path> {
        self.loaded_from.as_deref()
    }
}
