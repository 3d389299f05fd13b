//! core::retry
//!
//! Run an action a bounded number of times with a delay between failures.
//!
//! # Semantics
//!
//! [`get_or_retry`] calls the action at most `attempts + 1` times. After each
//! failure except the last it sleeps for `policy(attempt, &error)`, where
//! `attempt` is the 1-based number of the attempt that just failed. It never
//! panics on the action's behalf: the final outcome is returned as a
//! `Result`, value or last error.
//!
//! [`backoff_retry_policy`] is linear (`initial_delay * attempt * multiplier`).
//!
//! # Example
//!
//! ```
//! use latchwork::core::retry::{get_or_retry, RetryOptions};
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let options = RetryOptions::<String>::fixed(3, Duration::ZERO);
//! let mut calls = 0;
//! let result = get_or_retry(
//!     || {
//!         calls += 1;
//!         let n = calls;
//!         async move { if n < 3 { Err(format!("attempt {n}")) } else { Ok(n) } }
//!     },
//!     &options,
//! )
//! .await;
//! assert_eq!(result, Ok(3));
//! # });
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use super::config::schema::RetryConfig;

/// Default number of retries after the first attempt.
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 2;

/// Default base delay of [`backoff_retry_policy`].
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(500);

/// Default multiplier of [`backoff_retry_policy`].
pub const DEFAULT_MULTIPLIER: f64 = 1.0;

/// Delay before the next attempt, given the failed attempt number and its error.
pub type RetryPolicy<E> = Arc<dyn Fn(u32, &E) -> Duration + Send + Sync>;

/// Callback invoked after every failed attempt.
pub type FailedAttemptCallback<E> = Arc<dyn Fn(u32, &E) + Send + Sync>;

/// Linear backoff: `initial_delay * attempt * multiplier`.
pub fn backoff_retry_policy<E>(initial_delay: Duration, multiplier: f64) -> RetryPolicy<E> {
    Arc::new(move |attempt, _error| initial_delay.mul_f64(f64::from(attempt) * multiplier))
}

/// Constant delay between attempts.
pub fn fixed_retry_policy<E>(interval: Duration) -> RetryPolicy<E> {
    Arc::new(move |_attempt, _error| interval)
}

/// Retry configuration for [`get_or_retry`].
pub struct RetryOptions<E> {
    /// Retries after the first attempt (total calls = `attempts + 1`)
    pub attempts: u32,
    /// Delay policy between attempts
    pub policy: RetryPolicy<E>,
    /// Observer of failed attempts
    pub on_failed_attempt: Option<FailedAttemptCallback<E>>,
}

impl<E> RetryOptions<E> {
    /// Linear backoff options.
    pub fn new(attempts: u32, initial_delay: Duration, multiplier: f64) -> Self {
        Self {
            attempts,
            policy: backoff_retry_policy(initial_delay, multiplier),
            on_failed_attempt: None,
        }
    }

    /// Constant-interval options.
    pub fn fixed(attempts: u32, interval: Duration) -> Self {
        Self {
            attempts,
            policy: fixed_retry_policy(interval),
            on_failed_attempt: None,
        }
    }

    /// Build from configuration.
    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.attempts(),
            config.initial_delay(),
            config.multiplier(),
        )
    }

    /// Replace the delay policy.
    pub fn with_policy(mut self, policy: RetryPolicy<E>) -> Self {
        self.policy = policy;
        self
    }

    /// Observe failed attempts.
    pub fn on_failed_attempt(mut self, callback: FailedAttemptCallback<E>) -> Self {
        self.on_failed_attempt = Some(callback);
        self
    }
}

impl<E> Default for RetryOptions<E> {
    fn default() -> Self {
        Self::new(DEFAULT_RETRY_ATTEMPTS, DEFAULT_INITIAL_DELAY, DEFAULT_MULTIPLIER)
    }
}

impl<E> Clone for RetryOptions<E> {
    fn clone(&self) -> Self {
        Self {
            attempts: self.attempts,
            policy: Arc::clone(&self.policy),
            on_failed_attempt: self.on_failed_attempt.clone(),
        }
    }
}

impl<E> fmt::Debug for RetryOptions<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryOptions")
            .field("attempts", &self.attempts)
            .field("on_failed_attempt", &self.on_failed_attempt.is_some())
            .finish_non_exhaustive()
    }
}

/// Call `action` until it succeeds or `attempts + 1` calls have failed.
pub async fn get_or_retry<T, E, F, Fut>(mut action: F, options: &RetryOptions<E>) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let total = options.attempts.saturating_add(1);
    let mut attempt = 1;
    loop {
        match action().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                if let Some(callback) = &options.on_failed_attempt {
                    callback(attempt, &error);
                }
                if attempt >= total {
                    return Err(error);
                }
                let delay = (options.policy)(attempt, &error);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                attempt += 1;
            }
        }
    }
}
