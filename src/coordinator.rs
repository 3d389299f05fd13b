//! coordinator
//!
//! The object call sites hold: one store, one tracker, one configuration.
//!
//! # Example
//!
//! ```
//! use latchwork::coordinator::Coordinator;
//! use latchwork::store::MemoryStore;
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let coordinator = Coordinator::builder()
//!     .store(Arc::new(MemoryStore::new()))
//!     .build();
//!
//! let options = coordinator.cache_options::<String>();
//! let first = coordinator
//!     .get_or_add_cache("greeting", || async { Ok("hello".to_string()) }, &options)
//!     .await
//!     .unwrap();
//! let second = coordinator
//!     .get_or_add_cache("greeting", || async { Ok("ignored".to_string()) }, &options)
//!     .await
//!     .unwrap();
//!
//! assert_eq!(first, "hello");
//! assert_eq!(second, "hello");
//! # });
//! ```

use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::cache::{CacheExecutor, CacheOptions};
use crate::core::config::Config;
use crate::core::retry::RetryOptions;
use crate::error::TrackedError;
use crate::lock::LockOptions;
use crate::store::CacheStore;
use crate::telemetry::{Logger, Metrics, TracingLogger, TracingMetrics};
use crate::track::{BoxFuture, OperationTracker, TrackArgs};

/// Entry point for cached, locked and tracked execution.
#[derive(Debug, Clone)]
pub struct Coordinator {
    config: Config,
    tracker: OperationTracker,
    cache: CacheExecutor,
}

impl Coordinator {
    pub fn builder() -> CoordinatorBuilder {
        CoordinatorBuilder::default()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn tracker(&self) -> &OperationTracker {
        &self.tracker
    }

    /// Cache options from the `[cache]` section, with the default serializer.
    pub fn cache_options<T>(&self) -> CacheOptions<T>
    where
        T: Serialize + DeserializeOwned + 'static,
    {
        CacheOptions::from_config(self.config.cache())
    }

    /// Lock options from the `[lock]` section.
    pub fn lock_options(&self) -> LockOptions {
        LockOptions::from_config(self.config.lock())
    }

    /// Retry options from the `[retry]` section.
    pub fn retry_options<E>(&self) -> RetryOptions<E> {
        RetryOptions::from_config(self.config.retry())
    }

    /// See [`CacheExecutor::get_or_add_cache`].
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
        self.cache.get_or_add_cache(key, create_value, options)
    }

    /// See [`LockManager::with_distributed_lock`](crate::lock::LockManager::with_distributed_lock).
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
        self.cache
            .locks()
            .with_distributed_lock(key, create_value, options)
            .await
    }

    /// Track an async call.
    pub async fn track<T, F, Fut>(&self, args: impl Into<TrackArgs>, f: F) -> Result<T, TrackedError>
    where
        T: Send + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, TrackedError>>,
    {
        self.tracker.track(args, f).await
    }

    /// Track a synchronous call.
    pub fn track_sync<T, F>(&self, args: impl Into<TrackArgs>, f: F) -> Result<T, TrackedError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, TrackedError>,
    {
        self.tracker.track_sync(args, f)
    }
}

/// Builder for [`Coordinator`].
pub struct CoordinatorBuilder {
    store: Option<Arc<dyn CacheStore>>,
    logger: Arc<dyn Logger>,
    metrics: Arc<dyn Metrics>,
    config: Config,
}

impl Default for CoordinatorBuilder {
    fn default() -> Self {
        Self {
            store: None,
            logger: Arc::new(TracingLogger),
            metrics: Arc::new(TracingMetrics),
            config: Config::default(),
        }
    }
}

impl CoordinatorBuilder {
    /// Without a store, caching and locking are bypassed.
    pub fn store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn metrics(mut self, metrics: Arc<dyn Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Coordinator {
        let tracking = self.config.tracking();
        let tracker = OperationTracker::builder()
            .config(tracking)
            .logger(Arc::clone(&self.logger))
            .metrics(Arc::clone(&self.metrics))
            .build();
        let cache = CacheExecutor::new(
            self.store,
            tracker.clone(),
            self.logger,
            self.metrics,
        )
        .with_metric_prefix(tracking.metric_prefix().map(str::to_string));

        Coordinator {
            config: self.config,
            tracker,
            cache,
        }
    }
}
