//! config command - Show or validate the configuration file

use std::path::Path;

use crate::core::config::{
    CacheConfig, Config, FileConfig, LockConfig, RetryConfig, TrackingConfig,
};
use anyhow::{Context as _, Result};

fn load(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Config::load().context("Failed to load config"),
    }
}

/// Every value filled in, defaults included.
fn effective(config: &Config) -> FileConfig {
    let cache = config.cache();
    let lock = config.lock();
    let retry = config.retry();
    let tracking = config.tracking();

    FileConfig {
        cache: Some(CacheConfig {
            expiry_seconds: cache.expiry().map(|d| d.as_secs()),
            save_retry_attempts: Some(cache.save_retry_attempts()),
            save_retry_interval_ms: Some(cache.save_retry_interval().as_millis() as u64),
        }),
        lock: Some(LockConfig {
            acquire_max_wait_ms: Some(lock.acquire_max_wait().as_millis() as u64),
            acquire_retry_interval_ms: Some(lock.acquire_retry_interval().as_millis() as u64),
            lock_max_time_ms: Some(lock.lock_max_time().as_millis() as u64),
        }),
        retry: Some(RetryConfig {
            attempts: Some(retry.attempts()),
            initial_delay_ms: Some(retry.initial_delay().as_millis() as u64),
            multiplier: Some(retry.multiplier()),
        }),
        tracking: Some(TrackingConfig {
            metric_prefix: tracking.metric_prefix().map(str::to_string),
            log_try: Some(tracking.log_try()),
        }),
    }
}

/// Print the effective configuration as TOML.
pub fn show(path: Option<&Path>) -> Result<()> {
    let config = load(path)?;

    match config.loaded_from() {
        Some(source) => println!("# source: {}", source.display()),
        None => println!("# source: defaults"),
    }
    let rendered =
        toml::to_string_pretty(&effective(&config)).context("Failed to render config")?;
    print!("{}", rendered);
    Ok(())
}

/// Load and validate the configuration file.
pub fn check(path: Option<&Path>) -> Result<()> {
    let config = load(path)?;
    match config.loaded_from() {
        Some(source) => println!("{}: ok", source.display()),
        None => match Config::config_path() {
            Ok(canonical) => println!(
                "no config file at {}, defaults apply",
                canonical.display()
            ),
            Err(_) => println!("no config file found, defaults apply"),
        },
    }
    Ok(())
}
