//! track::stats
//!
//! Hook that turns an operation into metrics.
//!
//! # Metrics
//!
//! | Metric             | Method    | Emitted by default |
//! |--------------------|-----------|--------------------|
//! | `<name>.try`       | incr      | no                 |
//! | `<name>.catch`     | incr      | no                 |
//! | `<name>`           | incr      | yes                |
//! | `<name>.duration`  | histogram | yes                |
//!
//! `<name>` is the operation name behind the configured prefix. A call's
//! `should_stats` can switch any sample on or off.
//!
//! # Tags
//!
//! On finally the hook appends `error:true|false` and, for failures,
//! `error_operation`, `error_class` and the error's own tags to the frame.
//! The completion samples carry every frame tag, merged so each key appears
//! once with its last value.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::telemetry::{Metrics, StatsMethod};

use super::context::{OperationContext, OperationFrame, StatsEvent, StatsEventKind};
use super::engine::{Hook, HookResult};

/// Emits operation counters and duration histograms.
pub struct StatsHook {
    metrics: Arc<dyn Metrics>,
    prefix: Option<String>,
}

impl StatsHook {
    pub fn new(metrics: Arc<dyn Metrics>, prefix: Option<String>) -> Self {
        Self { metrics, prefix }
    }
}

impl Hook for StatsHook {
    fn name(&self) -> &str {
        "stats"
    }

    fn on_try(&self, ctx: &mut OperationContext) -> HookResult {
        let metric = metric_name(self.prefix.as_deref(), ctx.operation(), Some("try"));
        let tags = merge_tags(ctx.frame().tags());
        emit(&*self.metrics, ctx, StatsEventKind::Try, StatsMethod::Incr, &metric, 1.0, &tags, false);
        Ok(None)
    }

    fn on_catch(&self, ctx: &mut OperationContext) -> HookResult {
        let metric = metric_name(self.prefix.as_deref(), ctx.operation(), Some("catch"));
        let tags = merge_tags(ctx.frame().tags());
        emit(&*self.metrics, ctx, StatsEventKind::Catch, StatsMethod::Incr, &metric, 1.0, &tags, false);
        Ok(None)
    }

    fn on_finally(&self, ctx: &mut OperationContext) -> HookResult {
        let frame = ctx.frame();
        frame.add_tag(format!("error:{}", ctx.error().is_some()));
        if let Some(error) = ctx.error() {
            let operation = error
                .tracked()
                .map(|t| t.operation.clone())
                .unwrap_or_else(|| ctx.operation().to_string());
            frame.add_tag(format!("error_operation:{}", operation));
            frame.add_tag(format!("error_class:{}", error.class_name()));
            frame.add_tags(error.tags().iter().cloned());
        }

        let metrics = Arc::clone(&self.metrics);
        let prefix = self.prefix.clone();
        Ok(Some(Box::new(move |ctx: &OperationContext| {
            let tags = merge_tags(ctx.frame().tags());
            let metric = metric_name(prefix.as_deref(), ctx.operation(), None);
            emit(&*metrics, ctx, StatsEventKind::Finally, StatsMethod::Incr, &metric, 1.0, &tags, true);

            if let Some(ms) = ctx.duration_ms() {
                let metric = metric_name(prefix.as_deref(), ctx.operation(), Some("duration"));
                emit(
                    &*metrics,
                    ctx,
                    StatsEventKind::Duration,
                    StatsMethod::Histogram,
                    &metric,
                    ms as f64,
                    &tags,
                    true,
                );
            }
        })))
    }
}

/// `[<prefix>.]<operation>[.<suffix>]`.
pub fn metric_name(prefix: Option<&str>, operation: &str, suffix: Option<&str>) -> String {
    let mut name = String::new();
    if let Some(prefix) = prefix.filter(|p| !p.is_empty()) {
        name.push_str(prefix);
        name.push('.');
    }
    name.push_str(operation);
    if let Some(suffix) = suffix {
        name.push('.');
        name.push_str(suffix);
    }
    name
}

/// Merge `key:value` tags so each key appears once.
///
/// A key keeps the position of its first occurrence and the value of its
/// last. A tag without `:` is a bare key.
///
/// ```
/// use latchwork::track::stats::merge_tags;
///
/// let merged = merge_tags(["cache_hit:false", "cache_group:g", "cache_hit:true", "bare"]);
/// assert_eq!(merged, vec!["cache_hit:true", "cache_group:g", "bare"]);
/// ```
pub fn merge_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut order: Vec<String> = Vec::new();
    let mut values: HashMap<String, Option<String>> = HashMap::new();

    for tag in tags {
        let tag = tag.as_ref();
        let (key, value) = match tag.split_once(':') {
            Some((k, v)) => (k, Some(v.to_string())),
            None => (tag, None),
        };
        if !values.contains_key(key) {
            order.push(key.to_string());
        }
        values.insert(key.to_string(), value);
    }

    order
        .into_iter()
        .map(|key| match values.remove(&key).flatten() {
            Some(value) if !value.is_empty() => format!("{}:{}", key, value),
            _ => key,
        })
        .collect()
}

/// `key:value` tags a call site keeps for its own counters, mirrored onto an
/// operation frame so they also reach the operation's finally metrics.
#[derive(Debug, Default)]
pub struct TagSet {
    tags: Vec<String>,
    frame: Option<Arc<OperationFrame>>,
}

impl TagSet {
    pub fn new(frame: Option<Arc<OperationFrame>>) -> Self {
        Self {
            tags: Vec::new(),
            frame,
        }
    }

    pub fn set(&mut self, key: &str, value: impl fmt::Display) {
        let tag = format!("{}:{}", key, value);
        if let Some(frame) = &self.frame {
            frame.add_tag(tag.clone());
        }
        self.tags.push(tag);
    }

    /// Tags merged by key, last value wins.
    pub fn merged(&self) -> Vec<String> {
        merge_tags(&self.tags)
    }
}

#[allow(clippy::too_many_arguments)]
fn emit(
    metrics: &dyn Metrics,
    ctx: &OperationContext,
    event: StatsEventKind,
    method: StatsMethod,
    metric: &str,
    value: f64,
    tags: &[String],
    default: bool,
) {
    let enabled = ctx
        .args()
        .should_stats
        .as_ref()
        .and_then(|f| {
            f(&StatsEvent {
                event,
                context: ctx,
                method,
                metric,
                value,
                tags,
            })
        })
        .unwrap_or(default);
    if enabled {
        metrics.emit(method, metric, value, tags);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TrackedError;
    use crate::telemetry::RecordingMetrics;
    use crate::track::context::{current_operation, ErrorSubstitute, TrackArgs};
    use crate::track::engine::HookEngine;
    use crate::track::hooks::default_hooks;

    fn engine(metrics: &RecordingMetrics, prefix: Option<&str>) -> HookEngine {
        let mut hooks = default_hooks();
        hooks.push(Arc::new(StatsHook::new(
            Arc::new(metrics.clone()),
            prefix.map(str::to_string),
        )));
        HookEngine::new(hooks)
    }

    #[test]
    fn success_emits_counter_and_histogram() {
        let metrics = RecordingMetrics::new();
        let engine = engine(&metrics, None);

        engine
            .run_sync(OperationContext::new(TrackArgs::new("send")), || Ok(()))
            .unwrap();

        let records = metrics.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].metric, "send");
        assert_eq!(records[0].method, StatsMethod::Incr);
        assert_eq!(records[0].tags, vec!["error:false"]);
        assert_eq!(records[1].metric, "send.duration");
        assert_eq!(records[1].method, StatsMethod::Histogram);
    }

    #[test]
    fn failure_tags_error_details() {
        let metrics = RecordingMetrics::new();
        let engine = engine(&metrics, Some("engage"));
        let args = TrackArgs::new("send").on_error(|_e, _ctx| {
            Some(ErrorSubstitute {
                error: None,
                tags: vec!["reason:rejected".into()],
            })
        });

        let _: Result<(), _> = engine.run_sync(OperationContext::new(args), || {
            Err(TrackedError::integration("bad", "400", Some(400)))
        });

        let counter = metrics.find("engage.send");
        assert_eq!(counter.len(), 1);
        assert_eq!(
            counter[0].tags,
            vec![
                "error:true",
                "error_operation:send",
                "error_class:IntegrationError",
                "reason:rejected",
            ]
        );
        assert_eq!(metrics.find("engage.send.duration").len(), 1);
    }

    #[test]
    fn parent_reports_child_as_error_operation() {
        let metrics = RecordingMetrics::new();
        let engine = engine(&metrics, None);

        let _: Result<(), _> = engine.run_sync(OperationContext::new(TrackArgs::new("parent")), || {
            engine.run_sync(OperationContext::new(TrackArgs::new("child")), || {
                Err(TrackedError::integration("bad", "400", Some(400)))
            })
        });

        let parent = metrics.find("parent");
        assert!(parent[0].tags.contains(&"error_operation:child".to_string()));
    }

    #[test]
    fn appended_tags_merge_last_wins() {
        let metrics = RecordingMetrics::new();
        let engine = engine(&metrics, None);

        engine
            .run_sync(OperationContext::new(TrackArgs::new("cache")), || {
                if let Some(frame) = current_operation() {
                    frame.add_tag("cache_hit:false");
                    frame.add_tag("cache_group:g1");
                    frame.add_tag("cache_hit:true");
                }
                Ok(())
            })
            .unwrap();

        assert_eq!(
            metrics.find("cache")[0].tags,
            vec!["cache_hit:true", "cache_group:g1", "error:false"]
        );
    }

    #[test]
    fn try_and_catch_counters_are_opt_in() {
        let metrics = RecordingMetrics::new();
        let engine = engine(&metrics, None);
        let args = TrackArgs::new("op").should_stats(|event| match event.event {
            StatsEventKind::Try | StatsEventKind::Catch => Some(true),
            StatsEventKind::Duration => Some(false),
            StatsEventKind::Finally => None,
        });

        let _: Result<(), _> = engine.run_sync(OperationContext::new(args), || {
            Err(TrackedError::integration("x", "500", Some(500)))
        });

        let names: Vec<_> = metrics.records().into_iter().map(|r| r.metric).collect();
        assert_eq!(names, vec!["op.try", "op.catch", "op"]);
    }

    #[test]
    fn metric_names() {
        assert_eq!(metric_name(None, "send", None), "send");
        assert_eq!(metric_name(Some(""), "send", Some("try")), "send.try");
        assert_eq!(metric_name(Some("engage"), "send", Some("duration")), "engage.send.duration");
    }

    #[test]
    fn tag_set_mirrors_onto_frame() {
        let ctx = OperationContext::new(TrackArgs::new("op"));
        let mut tags = TagSet::new(Some(Arc::clone(ctx.frame())));
        tags.set("cache_hit", false);
        tags.set("cache_group", "g");
        tags.set("cache_hit", true);

        assert_eq!(tags.merged(), vec!["cache_hit:true", "cache_group:g"]);
        assert_eq!(ctx.frame().tags().len(), 3);
    }

    #[test]
    fn merge_tags_handles_bare_and_empty_values() {
        assert_eq!(merge_tags(["a", "b:", "a:1"]), vec!["a:1", "b"]);
        assert!(merge_tags(Vec::<String>::new()).is_empty());
    }
}
