//! track::context
//!
//! Per-invocation operation state.
//!
//! # Design
//!
//! Each tracked call owns an [`OperationContext`]. The parts other code may
//! need after or outside the call (name, parent link, tags, logs, finally
//! callbacks) live in a shared [`OperationFrame`]. The frame is what child
//! operations link to as their parent and what [`current_operation`] hands
//! out to code running inside the call.
//!
//! The current operation is task-local. Every tracked call scopes its own
//! frame around the wrapped callable, so two logical chains running on the
//! same worker never see each other's frames. A task spawned from inside a
//! tracked call starts a new chain.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::time::Instant;
use uuid::Uuid;

use crate::error::{ErrorKind, TrackedError};
use crate::telemetry::{Metadata, StatsMethod};

/// Separator between operation names in a path.
pub const PATH_SEPARATOR: &str = " > ";

tokio::task_local! {
    static CURRENT_OPERATION: Arc<OperationFrame>;
}

/// The frame of the innermost tracked call on this task, if any.
pub fn current_operation() -> Option<Arc<OperationFrame>> {
    CURRENT_OPERATION.try_with(Arc::clone).ok()
}

pub(crate) fn scope_sync<R>(frame: Arc<OperationFrame>, f: impl FnOnce() -> R) -> R {
    CURRENT_OPERATION.sync_scope(frame, f)
}

pub(crate) async fn scope<F: std::future::Future>(frame: Arc<OperationFrame>, fut: F) -> F::Output {
    CURRENT_OPERATION.scope(frame, fut).await
}

/// Add a log line to the current operation, only if it ends with an error.
///
/// Does nothing outside a tracked call.
pub fn log_on_error<F>(message: F)
where
    F: FnOnce(&OperationContext) -> String + Send + 'static,
{
    if let Some(frame) = current_operation() {
        frame.on_finally(move |ctx| {
            if ctx.error().is_some() {
                ctx.frame().add_log(message(ctx));
            }
        });
    }
}

/// Lifecycle stage of a tracked call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Try,
    Success,
    Catch,
    Finally,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Try => "try",
            Stage::Success => "success",
            Stage::Catch => "catch",
            Stage::Finally => "finally",
        };
        f.write_str(s)
    }
}

/// Callback run when an operation reaches its finally stage.
pub type FinallyCallback = Box<dyn FnOnce(&OperationContext) + Send>;

/// Replacement for an error raised inside a tracked call.
#[derive(Debug, Default)]
pub struct ErrorSubstitute {
    /// Error to surface instead; the original becomes its underlying error
    pub error: Option<TrackedError>,
    /// Tags to attach to the surfaced error
    pub tags: Vec<String>,
}

/// Prepares an error before it is logged and returned.
pub type OnError =
    Arc<dyn Fn(&TrackedError, &OperationContext) -> Option<ErrorSubstitute> + Send + Sync>;

/// Per-stage log override; `None` keeps the default.
pub type ShouldLog = Arc<dyn Fn(&OperationContext) -> Option<bool> + Send + Sync>;

/// Per-sample stats override; `None` keeps the default.
pub type ShouldStats = Arc<dyn Fn(&StatsEvent<'_>) -> Option<bool> + Send + Sync>;

/// Observer of the finally stage.
pub type OnFinally = Arc<dyn Fn(&OperationContext) + Send + Sync>;

/// Which stats sample is about to be emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsEventKind {
    Try,
    Catch,
    Finally,
    Duration,
}

/// A stats sample offered to [`TrackArgs::should_stats`].
pub struct StatsEvent<'a> {
    pub event: StatsEventKind,
    pub context: &'a OperationContext,
    pub method: StatsMethod,
    pub metric: &'a str,
    pub value: f64,
    pub tags: &'a [String],
}

/// How a single call is tracked.
#[derive(Clone, Default)]
pub struct TrackArgs {
    /// Operation name used in log messages and metric names
    pub operation: String,
    /// Captured call arguments (added to log metadata)
    pub args: Vec<String>,
    pub on_error: Option<OnError>,
    pub should_log: Option<ShouldLog>,
    pub should_stats: Option<ShouldStats>,
    pub on_finally: Option<OnFinally>,
}

impl TrackArgs {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            ..Default::default()
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&TrackedError, &OperationContext) -> Option<ErrorSubstitute> + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(f));
        self
    }

    pub fn should_log<F>(mut self, f: F) -> Self
    where
        F: Fn(&OperationContext) -> Option<bool> + Send + Sync + 'static,
    {
        self.should_log = Some(Arc::new(f));
        self
    }

    pub fn should_stats<F>(mut self, f: F) -> Self
    where
        F: Fn(&StatsEvent<'_>) -> Option<bool> + Send + Sync + 'static,
    {
        self.should_stats = Some(Arc::new(f));
        self
    }

    pub fn on_finally<F>(mut self, f: F) -> Self
    where
        F: Fn(&OperationContext) + Send + Sync + 'static,
    {
        self.on_finally = Some(Arc::new(f));
        self
    }
}

impl From<&str> for TrackArgs {
    fn from(operation: &str) -> Self {
        TrackArgs::new(operation)
    }
}

impl From<String> for TrackArgs {
    fn from(operation: String) -> Self {
        TrackArgs::new(operation)
    }
}

impl fmt::Debug for TrackArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackArgs")
            .field("operation", &self.operation)
            .field("args", &self.args)
            .field("on_error", &self.on_error.is_some())
            .field("should_log", &self.should_log.is_some())
            .field("should_stats", &self.should_stats.is_some())
            .field("on_finally", &self.on_finally.is_some())
            .finish()
    }
}

#[derive(Default)]
struct Annotations {
    tags: Vec<String>,
    logs: Vec<String>,
    log_metadata: Metadata,
    on_finally: Vec<FinallyCallback>,
}

/// Shared, annotatable part of an operation.
pub struct OperationFrame {
    id: Uuid,
    name: String,
    parent: OnceLock<Arc<OperationFrame>>,
    annotations: Mutex<Annotations>,
}

impl OperationFrame {
    fn new(name: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            parent: OnceLock::new(),
            annotations: Mutex::new(Annotations::default()),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<&Arc<OperationFrame>> {
        self.parent.get()
    }

    /// Link the parent. Only the first link sticks.
    pub(crate) fn set_parent(&self, parent: Arc<OperationFrame>) {
        let _ = self.parent.set(parent);
    }

    /// Frames from the root of the chain down to this one.
    pub fn stack(&self) -> Vec<&OperationFrame> {
        let mut stack = vec![self];
        let mut current = self;
        while let Some(parent) = current.parent.get() {
            current = parent;
            stack.push(current);
        }
        stack.reverse();
        stack
    }

    /// Operation names from the root, joined with [`PATH_SEPARATOR`].
    pub fn path(&self) -> String {
        self.stack()
            .iter()
            .map(|f| f.name())
            .collect::<Vec<_>>()
            .join(PATH_SEPARATOR)
    }

    pub fn add_tag(&self, tag: impl Into<String>) {
        self.lock().tags.push(tag.into());
    }

    pub fn add_tags<I, S>(&self, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lock().tags.extend(tags.into_iter().map(Into::into));
    }

    /// Tags appended so far, in order.
    pub fn tags(&self) -> Vec<String> {
        self.lock().tags.clone()
    }

    pub fn add_log(&self, message: impl Into<String>) {
        self.lock().logs.push(message.into());
    }

    pub fn logs(&self) -> Vec<String> {
        self.lock().logs.clone()
    }

    pub fn add_log_metadata(&self, key: impl Into<String>, value: Value) {
        self.lock().log_metadata.insert(key.into(), value);
    }

    pub fn log_metadata(&self) -> Metadata {
        self.lock().log_metadata.clone()
    }

    /// Run `callback` once the operation reaches its finally stage.
    pub fn on_finally<F>(&self, callback: F)
    where
        F: FnOnce(&OperationContext) + Send + 'static,
    {
        self.lock().on_finally.push(Box::new(callback));
    }

    pub(crate) fn take_finally_callbacks(&self) -> Vec<FinallyCallback> {
        std::mem::take(&mut self.lock().on_finally)
    }

    fn lock(&self) -> MutexGuard<'_, Annotations> {
        self.annotations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl fmt::Debug for OperationFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationFrame")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("parent", &self.parent.get().map(|p| p.name()))
            .finish_non_exhaustive()
    }
}

/// State of one tracked invocation as it moves through its stages.
pub struct OperationContext {
    frame: Arc<OperationFrame>,
    stage: Stage,
    args: Arc<TrackArgs>,
    result: Option<Box<dyn Any + Send>>,
    error: Option<TrackedError>,
    started: Instant,
    started_at: DateTime<Utc>,
    duration: Option<Duration>,
}

impl OperationContext {
    pub fn new(args: TrackArgs) -> Self {
        Self {
            frame: Arc::new(OperationFrame::new(args.operation.clone())),
            stage: Stage::Try,
            args: Arc::new(args),
            result: None,
            error: None,
            started: Instant::now(),
            started_at: Utc::now(),
            duration: None,
        }
    }

    pub fn frame(&self) -> &Arc<OperationFrame> {
        &self.frame
    }

    pub fn operation(&self) -> &str {
        self.frame.name()
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub(crate) fn set_stage(&mut self, stage: Stage) {
        self.stage = stage;
    }

    pub fn args(&self) -> &Arc<TrackArgs> {
        &self.args
    }

    pub fn error(&self) -> Option<&TrackedError> {
        self.error.as_ref()
    }

    /// Replace (or with `None`, clear) the error the call will surface.
    pub fn set_error(&mut self, error: Option<TrackedError>) {
        self.error = error;
    }

    pub fn take_error(&mut self) -> Option<TrackedError> {
        self.error.take()
    }

    /// The successful result, if it has type `T`.
    pub fn result<T: 'static>(&self) -> Option<&T> {
        self.result.as_ref().and_then(|r| r.downcast_ref::<T>())
    }

    pub fn has_result(&self) -> bool {
        self.result.is_some()
    }

    pub(crate) fn set_result<T: Send + 'static>(&mut self, value: T) {
        self.result = Some(Box::new(value));
    }

    /// Restart the clock.
    pub fn mark_started(&mut self) {
        self.started = Instant::now();
        self.started_at = Utc::now();
    }

    /// Stop the clock.
    pub fn mark_finished(&mut self) {
        self.duration = Some(self.started.elapsed());
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }

    pub fn duration_ms(&self) -> Option<u64> {
        self.duration
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    /// Convert the final state into the caller-visible outcome.
    pub(crate) fn into_outcome<T: 'static>(self) -> Result<T, TrackedError> {
        if let Some(error) = self.error {
            return Err(error);
        }
        let operation = self.frame.name().to_string();
        match self.result.map(|r| r.downcast::<T>()) {
            Some(Ok(value)) => Ok(*value),
            Some(Err(_)) => Err(ErrorKind::Hook {
                hook: "engine".to_string(),
                stage: Stage::Finally.to_string(),
                message: format!("result of '{}' was replaced with another type", operation),
            }
            .into()),
            None => Err(ErrorKind::Hook {
                hook: "engine".to_string(),
                stage: Stage::Finally.to_string(),
                message: format!("error of '{}' was suppressed without a result", operation),
            }
            .into()),
        }
    }
}

impl fmt::Debug for OperationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationContext")
            .field("frame", &self.frame)
            .field("stage", &self.stage)
            .field("error", &self.error)
            .field("has_result", &self.result.is_some())
            .field("duration", &self.duration)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_is_root_first() {
        let root = OperationContext::new(TrackArgs::new("perform"));
        let child = OperationContext::new(TrackArgs::new("send"));
        let leaf = OperationContext::new(TrackArgs::new("request"));
        child.frame().set_parent(Arc::clone(root.frame()));
        leaf.frame().set_parent(Arc::clone(child.frame()));

        assert_eq!(leaf.frame().path(), "perform > send > request");
        assert_eq!(root.frame().path(), "perform");
        assert_eq!(leaf.frame().stack().len(), 3);
    }

    #[test]
    fn parent_link_is_set_once() {
        let a = OperationContext::new(TrackArgs::new("a"));
        let b = OperationContext::new(TrackArgs::new("b"));
        let c = OperationContext::new(TrackArgs::new("c"));
        c.frame().set_parent(Arc::clone(a.frame()));
        c.frame().set_parent(Arc::clone(b.frame()));
        assert_eq!(c.frame().parent().map(|p| p.name()), Some("a"));
    }

    #[test]
    fn annotations_accumulate() {
        let ctx = OperationContext::new(TrackArgs::new("op"));
        ctx.frame().add_tag("a:1");
        ctx.frame().add_tags(["b:2", "c"]);
        ctx.frame().add_log("first");
        ctx.frame().add_log_metadata("key", Value::from("k1"));

        assert_eq!(ctx.frame().tags(), vec!["a:1", "b:2", "c"]);
        assert_eq!(ctx.frame().logs(), vec!["first"]);
        assert_eq!(ctx.frame().log_metadata()["key"], "k1");
    }

    #[test]
    fn outcome_prefers_error() {
        let mut ctx = OperationContext::new(TrackArgs::new("op"));
        ctx.set_result(5_u32);
        ctx.set_error(Some(TrackedError::integration("bad", "400", Some(400))));
        let outcome: Result<u32, _> = ctx.into_outcome();
        assert_eq!(outcome.unwrap_err().message(), "bad");
    }

    #[test]
    fn suppressed_error_without_result_is_hook_error() {
        let ctx = OperationContext::new(TrackArgs::new("op"));
        let outcome: Result<u32, _> = ctx.into_outcome();
        let err = outcome.unwrap_err();
        assert_eq!(err.class_name(), "HookError");
        assert!(err.message().contains("suppressed"));
    }

    #[test]
    fn result_downcasts_by_type() {
        let mut ctx = OperationContext::new(TrackArgs::new("op"));
        ctx.set_result("value".to_string());
        assert_eq!(ctx.result::<String>().map(String::as_str), Some("value"));
        assert!(ctx.result::<u32>().is_none());
        let outcome: Result<u32, _> = ctx.into_outcome();
        assert!(outcome.is_err());
    }

    #[test]
    fn no_current_operation_outside_scope() {
        assert!(current_operation().is_none());
    }

    #[test]
    fn sync_scope_exposes_frame() {
        let ctx = OperationContext::new(TrackArgs::new("scoped"));
        let name = scope_sync(Arc::clone(ctx.frame()), || {
            current_operation().map(|f| f.name().to_string())
        });
        assert_eq!(name.as_deref(), Some("scoped"));
        assert!(current_operation().is_none());
    }

    #[test]
    fn track_args_debug_hides_closures() {
        let args = TrackArgs::new("op").should_log(|_| Some(false));
        let debug = format!("{:?}", args);
        assert!(debug.contains("should_log: true"));
        assert!(debug.contains("on_error: false"));
    }
}
