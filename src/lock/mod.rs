//! lock
//!
//! Lease-based distributed lock over a [`CacheStore`].
//!
//! # Architecture
//!
//! A lock is the key `lock:<key>` holding the value `"locked"`, created with
//! `set_by_key_nx` and a TTL of `lock_max_time`. The lease expires on its own
//! if the holder crashes, so no deadlock is possible. Correctness is bounded
//! by the lease: a computation that outlives `lock_max_time` may overlap with
//! the next holder.
//!
//! # States
//!
//! ```text
//! acquiring ──► acquired ──► create_value() ──► release
//!     │
//!     ├──► timed out      LockTimeout (retryable), create_value() not called
//!     └──► acquire error  LockAcquire (retryable), create_value() not called
//! ```
//!
//! # Invariants
//!
//! - Every successful acquisition is followed by exactly one release, on
//!   both the success and the error path of `create_value`
//! - A release failure is logged and tagged, never surfaced
//! - Without a lock-capable store `create_value` runs unsynchronized
//!
//! # Example
//!
//! ```
//! use latchwork::lock::{LockManager, LockOptions};
//! use latchwork::store::{MemoryStore, StoreOp};
//! use latchwork::track::OperationTracker;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let store = MemoryStore::new();
//! let locks = LockManager::new(Some(Arc::new(store.clone())), OperationTracker::default());
//! let options = LockOptions::new(Duration::from_secs(1), Duration::from_secs(60));
//!
//! let value = locks
//!     .with_distributed_lock("m1-r1", || async { Ok(5) }, &options)
//!     .await
//!     .unwrap();
//!
//! assert_eq!(value, 5);
//! assert_eq!(store.count(StoreOp::Del), 1);
//! # });
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;

use crate::core::config::LockConfig;
use crate::error::{ErrorKind, TrackedError};
use crate::store::{CacheStore, StoreError};
use crate::telemetry::{metadata, Logger, TracingLogger};
use crate::track::stats::TagSet;
use crate::track::{current_operation, OperationTracker, TrackArgs};

/// Operation name of a locked call.
pub const WITH_DISTRIBUTED_LOCK: &str = "with_distributed_lock";

/// Prefix of every lock key in the store.
pub const LOCK_KEY_PREFIX: &str = "lock:";

/// Value stored under a held lock.
pub const LOCKED_VALUE: &str = "locked";

/// Default pause between acquisition attempts (500ms).
pub const DEFAULT_ACQUIRE_RETRY_INTERVAL: Duration = Duration::from_millis(500);

/// Shortest pause between acquisition attempts.
pub const MIN_ACQUIRE_RETRY_INTERVAL: Duration = Duration::from_millis(10);

/// How a lock is acquired and held.
#[derive(Debug, Clone, PartialEq)]
pub struct LockOptions {
    /// Give up acquiring after this long
    pub acquire_max_wait: Duration,
    /// Pause between acquisition attempts
    pub acquire_retry_interval: Duration,
    /// Lease TTL
    pub lock_max_time: Duration,
    /// `cache_group` tag; defaults to the caller's operation name
    pub cache_group: Option<String>,
}

impl LockOptions {
    pub fn new(acquire_max_wait: Duration, lock_max_time: Duration) -> Self {
        Self {
            acquire_max_wait,
            acquire_retry_interval: DEFAULT_ACQUIRE_RETRY_INTERVAL,
            lock_max_time,
            cache_group: None,
        }
    }

    pub fn from_config(config: &LockConfig) -> Self {
        Self {
            acquire_max_wait: config.acquire_max_wait(),
            acquire_retry_interval: config.acquire_retry_interval(),
            lock_max_time: config.lock_max_time(),
            cache_group: None,
        }
    }

    /// Set the pause between acquisition attempts, clamped to
    /// [`MIN_ACQUIRE_RETRY_INTERVAL`].
    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.acquire_retry_interval = interval.max(MIN_ACQUIRE_RETRY_INTERVAL);
        self
    }

    pub fn with_cache_group(mut self, cache_group: impl Into<String>) -> Self {
        self.cache_group = Some(cache_group.into());
        self
    }
}

impl Default for LockOptions {
    fn default() -> Self {
        Self::from_config(&LockConfig::default())
    }
}

enum Acquisition {
    Acquired,
    TimedOut(Duration),
    Failed(StoreError),
}

/// Runs computations under a distributed lock.
#[derive(Clone)]
pub struct LockManager {
    store: Option<Arc<dyn CacheStore>>,
    tracker: OperationTracker,
    logger: Arc<dyn Logger>,
}

impl LockManager {
    pub fn new(store: Option<Arc<dyn CacheStore>>, tracker: OperationTracker) -> Self {
        Self {
            store,
            tracker,
            logger: Arc::new(TracingLogger),
        }
    }

    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    /// Run `create_value` while holding the lock for `key`.
    ///
    /// # Errors
    ///
    /// - [`ErrorKind::LockTimeout`] if the lock was not acquired within
    ///   `acquire_max_wait`
    /// - [`ErrorKind::LockAcquire`] if the store failed during acquisition
    /// - whatever `create_value` returns
    pub async fn with_distributed_lock<T, F, Fut>(
        &self,
        key: &str,
        create_value: F,
        options: &LockOptions,
    ) -> Result<T, TrackedError>
    where
        T: Send + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, TrackedError>>,
    {
        let args = TrackArgs::new(WITH_DISTRIBUTED_LOCK).with_args([key]);
        self.tracker
            .track(args, || self.run_locked(key, create_value, options))
            .await
    }

    async fn run_locked<T, F, Fut>(
        &self,
        key: &str,
        create_value: F,
        options: &LockOptions,
    ) -> Result<T, TrackedError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, TrackedError>>,
    {
        let frame = current_operation();
        let cache_group = options
            .cache_group
            .clone()
            .or_else(|| caller_name(frame.as_deref()))
            .unwrap_or_default();
        let mut tags = TagSet::new(frame);
        tags.set("cache_group", &cache_group);

        let Some(store) = self.store.as_deref().filter(|s| s.supports_locking()) else {
            return create_value().await;
        };

        let lock_key = format!("{}{}", LOCK_KEY_PREFIX, key);
        tags.set("lock_acquired", false);
        match acquire(store, &lock_key, options).await {
            Acquisition::Acquired => tags.set("lock_acquired", true),
            Acquisition::TimedOut(waited) => {
                return Err(ErrorKind::LockTimeout {
                    key: key.to_string(),
                    waited_ms: u64::try_from(waited.as_millis()).unwrap_or(u64::MAX),
                }
                .into());
            }
            Acquisition::Failed(err) => {
                tags.set("lock_acquired_error", true);
                self.logger.info(
                    "lock_acquire_error",
                    &metadata([
                        ("key", Value::from(key)),
                        ("error", Value::from(err.to_string())),
                        ("cache_group", Value::from(cache_group.as_str())),
                    ]),
                );
                return Err(ErrorKind::LockAcquire {
                    key: key.to_string(),
                    message: err.to_string(),
                }
                .into());
            }
        }

        let outcome = create_value().await;

        if let Err(err) = store.del_by_key(&lock_key).await {
            tags.set("lock_release_error", true);
            self.logger.info(
                "lock_release_error",
                &metadata([
                    ("key", Value::from(key)),
                    ("error", Value::from(err.to_string())),
                    ("cache_group", Value::from(cache_group.as_str())),
                ]),
            );
        }

        outcome
    }
}

impl std::fmt::Debug for LockManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockManager")
            .field("store", &self.store.is_some())
            .field("tracker", &self.tracker)
            .finish_non_exhaustive()
    }
}

/// Poll `set_by_key_nx` until it succeeds, fails, or the wait budget is spent.
async fn acquire(store: &dyn CacheStore, lock_key: &str, options: &LockOptions) -> Acquisition {
    let pause = options
        .acquire_retry_interval
        .max(MIN_ACQUIRE_RETRY_INTERVAL);
    let started = Instant::now();
    while started.elapsed() < options.acquire_max_wait {
        match store
            .set_by_key_nx(lock_key, LOCKED_VALUE, options.lock_max_time)
            .await
        {
            Ok(true) => return Acquisition::Acquired,
            Ok(false) => tokio::time::sleep(pause).await,
            Err(err) => return Acquisition::Failed(err),
        }
    }
    Acquisition::TimedOut(started.elapsed())
}

/// Name of the operation that called the current one.
pub(crate) fn caller_name(frame: Option<&crate::track::OperationFrame>) -> Option<String> {
    frame
        .and_then(|f| f.parent())
        .map(|parent| parent.name().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{FailOn, MemoryStore, StoreOp};
    use crate::telemetry::{RecordingLogger, RecordingMetrics};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn manager(store: &MemoryStore) -> LockManager {
        LockManager::new(Some(Arc::new(store.clone())), OperationTracker::default())
    }

    fn options() -> LockOptions {
        LockOptions::new(Duration::from_secs(2), Duration::from_secs(180))
    }

    #[tokio::test(start_paused = true)]
    async fn holds_lock_while_computing() {
        let store = MemoryStore::new();
        let locks = manager(&store);
        let observer = store.clone();

        let held = locks
            .with_distributed_lock(
                "k",
                || async move { Ok(observer.peek("lock:k")) },
                &options(),
            )
            .await
            .unwrap();

        assert_eq!(held.as_deref(), Some(LOCKED_VALUE));
        assert_eq!(store.peek("lock:k"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_when_lock_is_held() {
        let store = MemoryStore::new();
        store.insert("lock:k", LOCKED_VALUE);
        let locks = manager(&store);
        let calls = AtomicU32::new(0);

        let err = locks
            .with_distributed_lock(
                "k",
                || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                },
                &options(),
            )
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(err.is_retryable());
        assert!(matches!(err.kind(), ErrorKind::LockTimeout { waited_ms, .. } if *waited_ms >= 2000));
        // 0, 500, 1000, 1500 ms
        assert_eq!(store.count(StoreOp::SetNx), 4);
        assert_eq!(store.count(StoreOp::Del), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_retry_interval_still_pauses_between_attempts() {
        let store = MemoryStore::new();
        store.insert("lock:k", LOCKED_VALUE);
        let locks = manager(&store);
        let opts = LockOptions::new(Duration::from_millis(100), Duration::from_secs(180))
            .with_retry_interval(Duration::ZERO);
        assert_eq!(opts.acquire_retry_interval, MIN_ACQUIRE_RETRY_INTERVAL);

        let err = locks
            .with_distributed_lock("k", || async { Ok(()) }, &opts)
            .await
            .unwrap_err();

        assert!(matches!(err.kind(), ErrorKind::LockTimeout { .. }));
        // 0, 10, ..., 90 ms
        assert_eq!(store.count(StoreOp::SetNx), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_acquire_attempts_count_against_the_wait() {
        let store = MemoryStore::new().with_latency(Duration::from_millis(1500));
        store.insert("lock:k", LOCKED_VALUE);
        let locks = manager(&store);
        let calls = AtomicU32::new(0);

        let err = locks
            .with_distributed_lock(
                "k",
                || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                },
                &options().with_retry_interval(Duration::from_millis(10)),
            )
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(matches!(err.kind(), ErrorKind::LockTimeout { waited_ms, .. } if *waited_ms >= 3000));
        // answered at 1500 ms, then 3010 ms
        assert_eq!(store.count(StoreOp::SetNx), 2);
        assert_eq!(store.count(StoreOp::Del), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn acquires_once_previous_lease_expires() {
        let store = MemoryStore::new();
        store
            .set_by_key_nx("lock:k", LOCKED_VALUE, Duration::from_millis(1200))
            .await
            .unwrap();
        store.clear_operations();
        let locks = manager(&store);

        let value = locks
            .with_distributed_lock("k", || async { Ok("done") }, &options())
            .await
            .unwrap();

        assert_eq!(value, "done");
        assert_eq!(store.count(StoreOp::SetNx), 4);
    }

    #[tokio::test]
    async fn acquire_error_is_retryable_and_skips_computation() {
        let store = MemoryStore::new().fail_on(FailOn::always(
            StoreOp::SetNx,
            StoreError::Connection("refused".into()),
        ));
        let logger = RecordingLogger::new();
        let locks = manager(&store).with_logger(Arc::new(logger.clone()));

        let err = locks
            .with_distributed_lock("k", || async { Ok(1) }, &options())
            .await
            .unwrap_err();

        assert!(matches!(err.kind(), ErrorKind::LockAcquire { .. }));
        assert!(err.is_retryable());
        assert!(logger.contains("lock_acquire_error"));
        assert_eq!(store.count(StoreOp::Del), 0);
    }

    #[tokio::test]
    async fn release_error_is_swallowed() {
        let store = MemoryStore::new().fail_on(FailOn::always(
            StoreOp::Del,
            StoreError::Timeout("del".into()),
        ));
        let logger = RecordingLogger::new();
        let metrics = RecordingMetrics::new();
        let tracker = OperationTracker::builder()
            .metrics(Arc::new(metrics.clone()))
            .build();
        let locks = LockManager::new(Some(Arc::new(store.clone())), tracker)
            .with_logger(Arc::new(logger.clone()));

        let value = locks
            .with_distributed_lock("k", || async { Ok(3) }, &options())
            .await
            .unwrap();

        assert_eq!(value, 3);
        assert!(logger.contains("lock_release_error"));
        let tags = &metrics.find(WITH_DISTRIBUTED_LOCK)[0].tags;
        assert!(tags.contains(&"lock_release_error:true".to_string()));
        assert!(tags.contains(&"lock_acquired:true".to_string()));
    }

    #[tokio::test]
    async fn bypasses_without_lock_capable_store() {
        let store = MemoryStore::new().with_locking(false);
        let locks = manager(&store);
        let value = locks
            .with_distributed_lock("k", || async { Ok(9) }, &options())
            .await
            .unwrap();
        assert_eq!(value, 9);
        assert!(store.operations().is_empty());

        let none = LockManager::new(None, OperationTracker::default());
        assert_eq!(
            none.with_distributed_lock("k", || async { Ok(1) }, &options())
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn cache_group_defaults_to_caller() {
        let metrics = RecordingMetrics::new();
        let tracker = OperationTracker::builder()
            .metrics(Arc::new(metrics.clone()))
            .build();
        let locks = LockManager::new(None, tracker.clone());
        let options = options();

        tracker
            .track("send_message", || {
                locks.with_distributed_lock("k", || async { Ok(()) }, &options)
            })
            .await
            .unwrap();

        let tags = &metrics.find(WITH_DISTRIBUTED_LOCK)[0].tags;
        assert!(tags.contains(&"cache_group:send_message".to_string()));
    }
}
