//! cache::executor
//!
//! Cache-aside execution of a computation keyed by a string.
//!
//! # Flow
//!
//! ```text
//! no store ─────────────────────────────────────────────► create_value()
//! read key ──► read error ──► StoreUnavailable (retryable)
//!          ──► absent + lock options ──► lock "cache:<key>" ──► recurse without lock
//!          ──► present ──► parse error ──► miss
//!                      ──► ignored ──────► miss
//!                      ──► cached error ─► return error
//!                      ──► cached value ─► return value
//! miss ──► create_value() ──► stringify ──► save (retried, best effort) ──► outcome
//! ```
//!
//! # Tags and logs
//!
//! The `get_or_add_cache` operation is tagged with `cache_group`,
//! `cache_hit` and whichever of `cached_error`, `cache_reading_error`,
//! `cache_parsing_error`, `cache_ignored`, `cache_stringify_error` and
//! `cache_saving_error` apply. The `cache_*` events are also logged at info
//! level, and `cache_hit` / `cache_miss` counters are emitted.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::core::config::CacheConfig;
use crate::core::retry::{get_or_retry, RetryOptions};
use crate::error::{ErrorKind, TrackedError};
use crate::lock::{caller_name, LockManager, LockOptions};
use crate::store::CacheStore;
use crate::telemetry::{metadata, Logger, Metadata, Metrics, StatsMethod};
use crate::track::stats::{metric_name, TagSet};
use crate::track::{current_operation, BoxFuture, OperationTracker, TrackArgs};

use super::serializer::{CacheSerializer, DefaultSerializer};

/// Operation name of a cached call.
pub const GET_OR_ADD_CACHE: &str = "get_or_add_cache";

/// Prefix of the lock scope guarding a cache key.
pub const CACHE_LOCK_PREFIX: &str = "cache:";

/// Called with the key and the last error when a cache write gave up.
pub type OnSaveFailed = Arc<dyn Fn(&str, &TrackedError) + Send + Sync>;

/// How a computation is cached.
pub struct CacheOptions<T> {
    /// `cache_group` tag; defaults to the caller's operation name
    pub cache_group: Option<String>,
    pub serializer: Arc<dyn CacheSerializer<T>>,
    /// Entry TTL; the store default when `None`
    pub expiry: Option<Duration>,
    /// Serialize recomputation of a missing key
    pub lock: Option<LockOptions>,
    /// Retry of the cache write
    pub save_retry: RetryOptions<TrackedError>,
    pub on_save_failed: Option<OnSaveFailed>,
}

impl<T> CacheOptions<T>
where
    T: Serialize + DeserializeOwned + 'static,
{
    /// Options with the [`DefaultSerializer`] and default cache settings.
    pub fn new() -> Self {
        Self::from_config(&CacheConfig::default())
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::with_serializer(Arc::new(DefaultSerializer), config)
    }
}

impl<T> Default for CacheOptions<T>
where
    T: Serialize + DeserializeOwned + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> CacheOptions<T> {
    pub fn with_serializer(serializer: Arc<dyn CacheSerializer<T>>, config: &CacheConfig) -> Self {
        Self {
            cache_group: None,
            serializer,
            expiry: config.expiry(),
            lock: None,
            save_retry: RetryOptions::new(
                config.save_retry_attempts(),
                config.save_retry_interval(),
                1.0,
            ),
            on_save_failed: None,
        }
    }

    pub fn cache_group(mut self, cache_group: impl Into<String>) -> Self {
        self.cache_group = Some(cache_group.into());
        self
    }

    pub fn expiry(mut self, expiry: Duration) -> Self {
        self.expiry = Some(expiry);
        self
    }

    pub fn lock(mut self, lock: LockOptions) -> Self {
        self.lock = Some(lock);
        self
    }

    pub fn save_retry(mut self, save_retry: RetryOptions<TrackedError>) -> Self {
        self.save_retry = save_retry;
        self
    }

    pub fn on_save_failed<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, &TrackedError) + Send + Sync + 'static,
    {
        self.on_save_failed = Some(Arc::new(f));
        self
    }
}

impl<T> Clone for CacheOptions<T> {
    fn clone(&self) -> Self {
        Self {
            cache_group: self.cache_group.clone(),
            serializer: Arc::clone(&self.serializer),
            expiry: self.expiry,
            lock: self.lock.clone(),
            save_retry: self.save_retry.clone(),
            on_save_failed: self.on_save_failed.clone(),
        }
    }
}

impl<T> std::fmt::Debug for CacheOptions<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheOptions")
            .field("cache_group", &self.cache_group)
            .field("expiry", &self.expiry)
            .field("lock", &self.lock)
            .field("save_retry", &self.save_retry)
            .field("on_save_failed", &self.on_save_failed.is_some())
            .finish_non_exhaustive()
    }
}

/// Cache-aside executor.
#[derive(Clone)]
pub struct CacheExecutor {
    store: Option<Arc<dyn CacheStore>>,
    tracker: OperationTracker,
    locks: LockManager,
    logger: Arc<dyn Logger>,
    metrics: Arc<dyn Metrics>,
    metric_prefix: Option<String>,
}

impl CacheExecutor {
    pub fn new(
        store: Option<Arc<dyn CacheStore>>,
        tracker: OperationTracker,
        logger: Arc<dyn Logger>,
        metrics: Arc<dyn Metrics>,
    ) -> Self {
        let locks =
            LockManager::new(store.clone(), tracker.clone()).with_logger(Arc::clone(&logger));
        Self {
            store,
            tracker,
            locks,
            logger,
            metrics,
            metric_prefix: None,
        }
    }

    pub fn with_metric_prefix(mut self, prefix: Option<String>) -> Self {
        self.metric_prefix = prefix.filter(|p| !p.is_empty());
        self
    }

    /// The lock manager used for cache scoped locks.
    pub fn locks(&self) -> &LockManager {
        &self.locks
    }

    /// Return the cached outcome of `key`, or compute and cache it.
    ///
    /// # Errors
    ///
    /// - [`ErrorKind::StoreUnavailable`] if the cache could not be read
    /// - lock errors when `options.lock` is set and the lock is not acquired
    /// - a previously cached error, replayed
    /// - whatever `create_value` returns
    ///
    /// Cache write failures never fail the call.
    pub fn get_or_add_cache<'a, T, F, Fut>(
        &'a self,
        key: &'a str,
        create_value: F,
        options: &'a CacheOptions<T>,
    ) -> BoxFuture<'a, Result<T, TrackedError>>
    where
        T: Send + 'static,
        F: FnOnce() -> Fut + Send + 'a,
        Fut: Future<Output = Result<T, TrackedError>> + Send + 'a,
    {
        Box::pin(async move {
            let args = TrackArgs::new(GET_OR_ADD_CACHE).with_args([key]);
            self.tracker
                .track(args, move || self.lookup(key, create_value, options))
                .await
        })
    }

    async fn lookup<T, F, Fut>(
        &self,
        key: &str,
        create_value: F,
        options: &CacheOptions<T>,
    ) -> Result<T, TrackedError>
    where
        T: Send + 'static,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T, TrackedError>> + Send,
    {
        let frame = current_operation();
        let cache_group = options
            .cache_group
            .clone()
            .or_else(|| caller_name(frame.as_deref()))
            .unwrap_or_default();
        let mut tags = TagSet::new(frame);
        tags.set("cache_group", &cache_group);
        tags.set("cache_hit", false);

        let Some(store) = self.store.as_deref() else {
            return create_value().await;
        };

        let cached = match store.get_by_key(key).await {
            Ok(cached) => cached.filter(|v| !v.is_empty()),
            Err(err) => {
                tags.set("cache_reading_error", true);
                self.log_event(
                    "cache_reading_error",
                    key,
                    &cache_group,
                    [("error", Value::from(err.to_string()))],
                );
                return Err(ErrorKind::StoreUnavailable(format!(
                    "failed to read cache key '{}': {}",
                    key, err
                ))
                .into());
            }
        };

        let Some(cached) = cached else {
            if let Some(lock) = &options.lock {
                return self
                    .recompute_locked(key, create_value, options, lock, &cache_group)
                    .await;
            }
            return self
                .recompute(store, key, create_value, options, tags, &cache_group)
                .await;
        };

        match options.serializer.parse(&cached) {
            Ok(Some(outcome)) => {
                tags.set("cache_hit", true);
                tags.set("cached_error", outcome.is_err());
                self.incr("cache_hit", &tags);
                return outcome;
            }
            Ok(None) => {
                tags.set("cache_ignored", true);
                self.log_event(
                    "cache_ignored",
                    key,
                    &cache_group,
                    [("value", Value::from(cached))],
                );
            }
            Err(err) => {
                tags.set("cache_parsing_error", true);
                self.log_event(
                    "cache_parsing_error",
                    key,
                    &cache_group,
                    [
                        ("value", Value::from(cached)),
                        ("error", Value::from(err.to_string())),
                    ],
                );
            }
        }

        self.recompute(store, key, create_value, options, tags, &cache_group)
            .await
    }

    /// Take the cache lock, then look the key up again without locking.
    async fn recompute_locked<T, F, Fut>(
        &self,
        key: &str,
        create_value: F,
        options: &CacheOptions<T>,
        lock: &LockOptions,
        cache_group: &str,
    ) -> Result<T, TrackedError>
    where
        T: Send + 'static,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T, TrackedError>> + Send,
    {
        let mut unlocked = options.clone();
        unlocked.lock = None;
        unlocked.cache_group = Some(cache_group.to_string());

        let mut lock = lock.clone();
        if lock.cache_group.is_none() {
            lock.cache_group = Some(cache_group.to_string());
        }

        let scope = format!("{}{}", CACHE_LOCK_PREFIX, key);
        self.locks
            .with_distributed_lock(
                &scope,
                move || async move { self.get_or_add_cache(key, create_value, &unlocked).await },
                &lock,
            )
            .await
    }

    async fn recompute<T, F, Fut>(
        &self,
        store: &dyn CacheStore,
        key: &str,
        create_value: F,
        options: &CacheOptions<T>,
        mut tags: TagSet,
        cache_group: &str,
    ) -> Result<T, TrackedError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, TrackedError>>,
    {
        tags.set("cache_hit", false);
        self.incr("cache_miss", &tags);
        self.log_event("cache_miss", key, cache_group, []);

        let outcome = create_value().await;

        match options.serializer.stringify(&outcome) {
            Ok(Some(serialized)) => {
                let saved = get_or_retry(
                    || async {
                        store
                            .set_by_key(key, &serialized, options.expiry)
                            .await
                            .map_err(TrackedError::from)
                    },
                    &options.save_retry,
                )
                .await;
                if let Err(err) = saved {
                    tags.set("cache_saving_error", true);
                    self.log_event(
                        "cache_saving_error",
                        key,
                        cache_group,
                        [("error", Value::from(err.to_string()))],
                    );
                    if let Some(on_save_failed) = &options.on_save_failed {
                        on_save_failed(key, &err);
                    }
                }
            }
            Ok(None) => {}
            Err(err) => {
                tags.set("cache_stringify_error", true);
                self.log_event(
                    "cache_stringify_error",
                    key,
                    cache_group,
                    [("error", Value::from(err.to_string()))],
                );
            }
        }

        outcome
    }

    fn incr(&self, name: &str, tags: &TagSet) {
        let metric = metric_name(self.metric_prefix.as_deref(), name, None);
        self.metrics
            .emit(StatsMethod::Incr, &metric, 1.0, &tags.merged());
    }

    fn log_event<const N: usize>(
        &self,
        event: &str,
        key: &str,
        cache_group: &str,
        extra: [(&str, Value); N],
    ) {
        let mut fields: Metadata = metadata([
            ("key", Value::from(key)),
            ("cache_group", Value::from(cache_group)),
        ]);
        fields.extend(extra.into_iter().map(|(k, v)| (k.to_string(), v)));
        self.logger.info(event, &fields);
    }
}

impl std::fmt::Debug for CacheExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheExecutor")
            .field("store", &self.store.is_some())
            .field("metric_prefix", &self.metric_prefix)
            .finish_non_exhaustive()
    }
}
