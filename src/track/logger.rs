//! track::logger
//!
//! Hook that turns an operation into log lines.
//!
//! # Messages
//!
//! ```text
//! perform > send starting...
//! perform > send succeeded after 12 ms
//! perform > send failed after 12 ms. IntegrationError: Bad Request. Underlying error: ...
//! ```
//!
//! The finally line is assembled in a cleanup, after every finally hook
//! (including the frame's finally callbacks) has had a chance to add logs.
//! Parts are joined with `". "`. A failed operation logs at error level with
//! the serialized error in the metadata.

use std::sync::Arc;

use serde_json::Value;

use crate::error::TrackedError;
use crate::telemetry::{Logger, Metadata};

use super::context::{OperationContext, Stage};
use super::engine::{Hook, HookResult};

/// Logs the start and completion of every tracked call.
pub struct LoggerHook {
    logger: Arc<dyn Logger>,
    log_try: bool,
}

impl LoggerHook {
    /// `log_try` is the default for the try line; the finally line is
    /// logged unless the call's `should_log` says otherwise.
    pub fn new(logger: Arc<dyn Logger>, log_try: bool) -> Self {
        Self { logger, log_try }
    }
}

impl Hook for LoggerHook {
    fn name(&self) -> &str {
        "logger"
    }

    fn on_try(&self, ctx: &mut OperationContext) -> HookResult {
        if should_log(ctx, self.log_try) {
            let message = format!("{} starting...", ctx.frame().path());
            self.logger.info(&message, &log_metadata(ctx));
        }
        Ok(None)
    }

    fn on_finally(&self, _ctx: &mut OperationContext) -> HookResult {
        let logger = Arc::clone(&self.logger);
        Ok(Some(Box::new(move |ctx: &OperationContext| {
            if !should_log(ctx, true) {
                return;
            }
            let message = completion_message(ctx);
            let mut metadata = log_metadata(ctx);
            match ctx.error() {
                Some(error) => {
                    if let Ok(value) = serde_json::to_value(error) {
                        metadata.insert("error".to_string(), value);
                    }
                    logger.error(&message, &metadata);
                }
                None => logger.info(&message, &metadata),
            }
        })))
    }
}

fn should_log(ctx: &OperationContext, default: bool) -> bool {
    ctx.args()
        .should_log
        .as_ref()
        .and_then(|f| f(ctx))
        .unwrap_or(default)
}

fn log_metadata(ctx: &OperationContext) -> Metadata {
    let mut metadata = ctx.frame().log_metadata();
    let args = &ctx.args().args;
    if !args.is_empty() && ctx.stage() == Stage::Try {
        metadata.insert(
            "args".to_string(),
            Value::Array(args.iter().cloned().map(Value::String).collect()),
        );
    }
    metadata
}

/// Full finally line for an operation.
pub fn completion_message(ctx: &OperationContext) -> String {
    let path = ctx.frame().path();
    let outcome = if ctx.error().is_some() {
        "failed"
    } else {
        "succeeded"
    };
    let mut parts = vec![match ctx.duration_ms() {
        Some(ms) => format!("{} {} after {} ms", path, outcome, ms),
        None => format!("{} {}", path, outcome),
    }];

    if let Some(error) = ctx.error() {
        parts.push(error_message(error));
        let raised_here = error.tracked().is_some_and(|t| t.id == ctx.frame().id());
        if let (true, Some(underlying)) = (raised_here, error.underlying()) {
            parts.push(format!("Underlying error: {}", error_message(underlying)));
        }
    }

    parts.extend(ctx.frame().logs());
    parts.retain(|p| !p.is_empty());
    parts.join(". ")
}

/// `"<Class>: <message>"`.
pub fn error_message(error: &TrackedError) -> String {
    format!("{}: {}", error.class_name(), error.message())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::{LogLevel, RecordingLogger};
    use crate::track::context::{current_operation, ErrorSubstitute, TrackArgs};
    use crate::track::engine::HookEngine;
    use crate::track::hooks::default_hooks;

    fn engine(logger: &RecordingLogger, log_try: bool) -> HookEngine {
        let mut hooks = default_hooks();
        hooks.push(Arc::new(LoggerHook::new(Arc::new(logger.clone()), log_try)));
        HookEngine::new(hooks)
    }

    #[test]
    fn logs_start_and_success() {
        let logger = RecordingLogger::new();
        let engine = engine(&logger, true);

        engine
            .run_sync(OperationContext::new(TrackArgs::new("send")), || Ok(1))
            .unwrap();

        let messages = logger.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0], "send starting...");
        assert!(messages[1].starts_with("send succeeded after "));
        assert!(messages[1].ends_with(" ms"));
    }

    #[test]
    fn logs_failure_at_error_level_with_class() {
        let logger = RecordingLogger::new();
        let engine = engine(&logger, true);

        let _: Result<(), _> = engine.run_sync(OperationContext::new(TrackArgs::new("send")), || {
            Err(TrackedError::integration("Bad Request", "400", Some(400)))
        });

        let records = logger.records();
        let last = records.last().expect("finally log");
        assert_eq!(last.level, LogLevel::Error);
        assert!(last.message.contains("send failed after"));
        assert!(last.message.contains("IntegrationError: Bad Request"));
        assert_eq!(last.metadata["error"]["kind"]["type"], "integration");
    }

    #[test]
    fn underlying_error_logged_only_where_raised() {
        let logger = RecordingLogger::new();
        let engine = engine(&logger, false);
        let child_args = TrackArgs::new("child").on_error(|_err, _ctx| {
            Some(ErrorSubstitute {
                error: Some(TrackedError::integration("wrapped", "W", Some(400))),
                tags: Vec::new(),
            })
        });

        let _: Result<(), _> = engine.run_sync(OperationContext::new(TrackArgs::new("parent")), || {
            engine.run_sync(OperationContext::new(child_args), || {
                Err(TrackedError::integration("root cause", "R", None))
            })
        });

        let messages = logger.messages();
        assert_eq!(messages.len(), 2);
        assert!(messages[0].starts_with("parent > child failed"));
        assert!(messages[0].contains("Underlying error: IntegrationError: root cause"));
        assert!(messages[1].starts_with("parent failed"));
        assert!(!messages[1].contains("Underlying error"));
    }

    #[test]
    fn should_log_can_silence_stages() {
        let logger = RecordingLogger::new();
        let engine = engine(&logger, true);

        let silent = TrackArgs::new("quiet").should_log(|_| Some(false));
        engine.run_sync(OperationContext::new(silent), || Ok(())).unwrap();
        assert!(logger.records().is_empty());

        let finally_only =
            TrackArgs::new("op").should_log(|ctx| Some(ctx.stage() == Stage::Finally));
        engine
            .run_sync(OperationContext::new(finally_only), || Ok(()))
            .unwrap();
        let messages = logger.messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].starts_with("op succeeded"));
    }

    #[test]
    fn try_line_follows_default() {
        let logger = RecordingLogger::new();
        let engine = engine(&logger, false);
        engine
            .run_sync(OperationContext::new(TrackArgs::new("op")), || Ok(()))
            .unwrap();
        assert_eq!(logger.records().len(), 1);
    }

    #[test]
    fn frame_logs_and_metadata_are_included() {
        let logger = RecordingLogger::new();
        let engine = engine(&logger, false);

        let _: Result<(), _> = engine.run_sync(OperationContext::new(TrackArgs::new("op")), || {
            if let Some(frame) = current_operation() {
                frame.add_log_metadata("key", Value::from("m1-r1"));
                frame.on_finally(|ctx| {
                    if ctx.error().is_some() {
                        ctx.frame().add_log("some extra info about error");
                    }
                });
            }
            Err(TrackedError::integration("boom", "500", Some(500)))
        });

        let record = logger.records().pop().expect("record");
        assert!(record.message.ends_with("some extra info about error"));
        assert_eq!(record.metadata["key"], "m1-r1");
    }

    #[test]
    fn log_on_error_only_logs_failures() {
        use crate::track::context::log_on_error;

        let logger = RecordingLogger::new();
        let engine = engine(&logger, false);

        engine
            .run_sync(OperationContext::new(TrackArgs::new("ok")), || {
                log_on_error(|_| "customArgs".to_string());
                Ok(())
            })
            .unwrap();
        assert!(!logger.contains("customArgs"));

        let _: Result<(), _> = engine.run_sync(OperationContext::new(TrackArgs::new("bad")), || {
            log_on_error(|ctx| format!("{} customArgs", ctx.operation()));
            Err(TrackedError::integration("x", "400", Some(400)))
        });
        assert!(logger.contains("bad customArgs"));
    }
}
