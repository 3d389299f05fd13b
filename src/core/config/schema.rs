//! core::config::schema
//!
//! Configuration schema types.
//!
//! Every field is optional in the file; accessors apply the defaults.
//!
//! # Validation
//!
//! Values that bound a loop (lock wait, lock lease, poll interval) must be
//! positive, and the backoff multiplier must be positive.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Default save retry count for cache write-back.
pub const DEFAULT_SAVE_RETRY_ATTEMPTS: u32 = 5;

/// Default linear step between cache write-back retries.
pub const DEFAULT_SAVE_RETRY_INTERVAL_MS: u64 = 10_000;

/// Default lock acquisition poll interval.
pub const DEFAULT_ACQUIRE_RETRY_INTERVAL_MS: u64 = 500;

/// Default lock acquisition wait budget.
pub const DEFAULT_ACQUIRE_MAX_WAIT_MS: u64 = 30_000;

/// Default lock lease.
pub const DEFAULT_LOCK_MAX_TIME_MS: u64 = 180_000;

/// Top-level configuration file.
///
/// # Example
///
/// ```toml
/// [cache]
/// expiry_seconds = 3600
/// save_retry_attempts = 5
/// save_retry_interval_ms = 10000
///
/// [lock]
/// acquire_max_wait_ms = 30000
/// acquire_retry_interval_ms = 500
/// lock_max_time_ms = 180000
///
/// [retry]
/// attempts = 2
/// initial_delay_ms = 500
/// multiplier = 1.0
///
/// [tracking]
/// metric_prefix = "engage"
/// log_try = true
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    /// Cache-aside defaults
    pub cache: Option<CacheConfig>,
    /// Distributed lock defaults
    pub lock: Option<LockConfig>,
    /// Retry helper defaults
    pub retry: Option<RetryConfig>,
    /// Operation tracking settings
    pub tracking: Option<TrackingConfig>,
}

impl FileConfig {
    /// Validate the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(cache) = &self.cache {
            cache.validate()?;
        }
        if let Some(lock) = &self.lock {
            lock.validate()?;
        }
        if let Some(retry) = &self.retry {
            retry.validate()?;
        }
        Ok(())
    }
}

/// Cache-aside executor defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// TTL of written entries (store default when absent)
    pub expiry_seconds: Option<u64>,
    /// Retries of a failed write-back
    pub save_retry_attempts: Option<u32>,
    /// Linear step between write-back retries
    pub save_retry_interval_ms: Option<u64>,
}

impl CacheConfig {
    /// TTL of written entries.
    pub fn expiry(&self) -> Option<Duration> {
        self.expiry_seconds.map(Duration::from_secs)
    }

    /// Retries of a failed write-back.
    pub fn save_retry_attempts(&self) -> u32 {
        self.save_retry_attempts
            .unwrap_or(DEFAULT_SAVE_RETRY_ATTEMPTS)
    }

    /// Linear step between write-back retries.
    pub fn save_retry_interval(&self) -> Duration {
        Duration::from_millis(
            self.save_retry_interval_ms
                .unwrap_or(DEFAULT_SAVE_RETRY_INTERVAL_MS),
        )
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.expiry_seconds == Some(0) {
            return Err(ConfigError::InvalidValue(
                "cache.expiry_seconds must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Distributed lock defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct LockConfig {
    /// Acquisition wait budget
    pub acquire_max_wait_ms: Option<u64>,
    /// Poll interval while the lock is held elsewhere
    pub acquire_retry_interval_ms: Option<u64>,
    /// Lease of an acquired lock
    pub lock_max_time_ms: Option<u64>,
}

impl LockConfig {
    /// Acquisition wait budget.
    pub fn acquire_max_wait(&self) -> Duration {
        Duration::from_millis(
            self.acquire_max_wait_ms
                .unwrap_or(DEFAULT_ACQUIRE_MAX_WAIT_MS),
        )
    }

    /// Poll interval while the lock is held elsewhere.
    pub fn acquire_retry_interval(&self) -> Duration {
        Duration::from_millis(
            self.acquire_retry_interval_ms
                .unwrap_or(DEFAULT_ACQUIRE_RETRY_INTERVAL_MS),
        )
    }

    /// Lease of an acquired lock.
    pub fn lock_max_time(&self) -> Duration {
        Duration::from_millis(self.lock_max_time_ms.unwrap_or(DEFAULT_LOCK_MAX_TIME_MS))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("lock.acquire_max_wait_ms", self.acquire_max_wait_ms),
            ("lock.acquire_retry_interval_ms", self.acquire_retry_interval_ms),
            ("lock.lock_max_time_ms", self.lock_max_time_ms),
        ] {
            if value == Some(0) {
                return Err(ConfigError::InvalidValue(format!(
                    "{} must be positive",
                    name
                )));
            }
        }
        Ok(())
    }
}

/// Retry helper defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    /// Retries after the first attempt
    pub attempts: Option<u32>,
    /// Base delay of the linear backoff
    pub initial_delay_ms: Option<u64>,
    /// Multiplier of the linear backoff
    pub multiplier: Option<f64>,
}

impl RetryConfig {
    /// Retries after the first attempt.
    pub fn attempts(&self) -> u32 {
        self.attempts
            .unwrap_or(crate::core::retry::DEFAULT_RETRY_ATTEMPTS)
    }

    /// Base delay of the linear backoff.
    pub fn initial_delay(&self) -> Duration {
        self.initial_delay_ms
            .map(Duration::from_millis)
            .unwrap_or(crate::core::retry::DEFAULT_INITIAL_DELAY)
    }

    /// Multiplier of the linear backoff.
    pub fn multiplier(&self) -> f64 {
        self.multiplier
            .unwrap_or(crate::core::retry::DEFAULT_MULTIPLIER)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(m) = self.multiplier {
            if !(m.is_finite() && m > 0.0) {
                return Err(ConfigError::InvalidValue(format!(
                    "retry.multiplier must be a positive number, got {}",
                    m
                )));
            }
        }
        Ok(())
    }
}

/// Operation tracking settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct TrackingConfig {
    /// Prefix prepended to every metric name
    pub metric_prefix: Option<String>,
    /// Whether the try stage is logged by default
    pub log_try: Option<bool>,
}

impl TrackingConfig {
    /// Metric prefix, `None` when unset or empty.
    pub fn metric_prefix(&self) -> Option<&str> {
        self.metric_prefix.as_deref().filter(|p| !p.is_empty())
    }

    /// Whether the try stage is logged by default.
    pub fn log_try(&self) -> bool {
        self.log_try.unwrap_or(true)
    }
}
