//! track::tracker
//!
//! The operation tracker: default hooks plus logging and stats, ready to
//! wrap call sites.
//!
//! # Example
//!
//! ```
//! use latchwork::track::{current_operation, OperationTracker, TrackArgs};
//! use latchwork::telemetry::RecordingLogger;
//! use std::sync::Arc;
//!
//! let logger = RecordingLogger::new();
//! let tracker = OperationTracker::builder()
//!     .logger(Arc::new(logger.clone()))
//!     .build();
//!
//! let value = tracker
//!     .track_sync("lookup", || {
//!         if let Some(op) = current_operation() {
//!             op.add_tag("source:memory");
//!         }
//!         Ok(42)
//!     })
//!     .unwrap();
//!
//! assert_eq!(value, 42);
//! assert_eq!(logger.messages()[0], "lookup starting...");
//! ```

use std::future::Future;
use std::sync::Arc;

use crate::core::config::TrackingConfig;
use crate::error::TrackedError;
use crate::telemetry::{Logger, Metrics, TracingLogger, TracingMetrics};

use super::context::{OperationContext, TrackArgs};
use super::engine::{Hook, HookEngine, Invocation};
use super::hooks::default_hooks;
use super::logger::LoggerHook;
use super::stats::StatsHook;

/// Wraps callables in tracked operations.
#[derive(Clone, Debug)]
pub struct OperationTracker {
    engine: HookEngine,
}

impl OperationTracker {
    pub fn builder() -> TrackerBuilder {
        TrackerBuilder::default()
    }

    /// Tracker logging and emitting metrics through `tracing`.
    pub fn from_config(config: &TrackingConfig) -> Self {
        Self::builder().config(config).build()
    }

    /// Track an async callable.
    pub async fn track<T, F, Fut>(&self, args: impl Into<TrackArgs>, f: F) -> Result<T, TrackedError>
    where
        T: Send + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, TrackedError>>,
    {
        self.engine
            .run(OperationContext::new(args.into()), f)
            .await
    }

    /// Track a synchronous callable.
    pub fn track_sync<T, F>(&self, args: impl Into<TrackArgs>, f: F) -> Result<T, TrackedError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, TrackedError>,
    {
        self.engine.run_sync(OperationContext::new(args.into()), f)
    }

    /// Track a callable that may complete now or later; the returned
    /// invocation has the same form as the callable's.
    pub fn track_invocation<'a, T, F>(&'a self, args: impl Into<TrackArgs>, f: F) -> Invocation<'a, T>
    where
        T: Send + 'static,
        F: FnOnce() -> Invocation<'a, T>,
    {
        self.engine.invoke(OperationContext::new(args.into()), f)
    }

    pub fn engine(&self) -> &HookEngine {
        &self.engine
    }
}

impl Default for OperationTracker {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Builder for [`OperationTracker`].
pub struct TrackerBuilder {
    logger: Arc<dyn Logger>,
    metrics: Arc<dyn Metrics>,
    metric_prefix: Option<String>,
    log_try: bool,
    hooks: Vec<Arc<dyn Hook>>,
    engine: Option<Box<dyn FnOnce(HookEngine) -> HookEngine>>,
}

impl Default for TrackerBuilder {
    fn default() -> Self {
        Self {
            logger: Arc::new(TracingLogger),
            metrics: Arc::new(TracingMetrics),
            metric_prefix: None,
            log_try: true,
            hooks: Vec::new(),
            engine: None,
        }
    }
}

impl TrackerBuilder {
    pub fn logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn metrics(mut self, metrics: Arc<dyn Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metric_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.metric_prefix = Some(prefix.into()).filter(|p: &String| !p.is_empty());
        self
    }

    pub fn log_try(mut self, log_try: bool) -> Self {
        self.log_try = log_try;
        self
    }

    /// Apply `[tracking]` settings.
    pub fn config(mut self, config: &TrackingConfig) -> Self {
        self.metric_prefix = config.metric_prefix().map(str::to_string);
        self.log_try = config.log_try();
        self
    }

    /// Add a custom hook.
    pub fn hook(mut self, hook: Arc<dyn Hook>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Post-process the assembled engine (e.g. to install a hook error
    /// translator).
    pub fn configure_engine(
        mut self,
        f: impl FnOnce(HookEngine) -> HookEngine + 'static,
    ) -> Self {
        self.engine = Some(Box::new(f));
        self
    }

    pub fn build(self) -> OperationTracker {
        let mut hooks = default_hooks();
        hooks.push(Arc::new(LoggerHook::new(self.logger, self.log_try)));
        hooks.push(Arc::new(StatsHook::new(self.metrics, self.metric_prefix)));
        hooks.extend(self.hooks);

        let mut engine = HookEngine::new(hooks);
        if let Some(configure) = self.engine {
            engine = configure(engine);
        }
        OperationTracker { engine }
    }
}
