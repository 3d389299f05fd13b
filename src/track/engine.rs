//! track::engine
//!
//! Hook composition engine.
//!
//! # Lifecycle
//!
//! ```text
//! try ──► f() ──► success | catch ──► finally ──► try cleanups (reverse)
//! ```
//!
//! Hooks run in ascending priority order, stable on registration order.
//! Any hook callback may return a cleanup. Cleanups returned during
//! `success`, `catch` and `finally` run in reverse right after that stage's
//! hooks. Cleanups returned during `try` are held until `finally` is done and
//! then run in reverse, so the first hook to open a scope is the last to
//! close it.
//!
//! A hook error goes through the `on_hook_error` translator, which may
//! absorb it (`None`) or pass on a possibly different error. An error that is
//! passed on stops the remaining hooks of the call and is returned in place
//! of the call's own outcome. Collected cleanups still run.
//!
//! # Sync and async
//!
//! [`HookEngine::run_sync`] drives a plain closure to completion on the
//! calling thread. [`HookEngine::run`] awaits a future. [`HookEngine::invoke`]
//! takes a callable returning an [`Invocation`] and hands back an invocation
//! of the same form: a ready outcome stays ready, a pending one stays
//! pending.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::{ErrorKind, TrackedError};

use super::context::{scope, scope_sync, OperationContext, Stage};

/// Boxed, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Deferred work returned by a hook stage.
pub type Cleanup = Box<dyn FnOnce(&OperationContext) + Send>;

/// What a hook stage returns.
pub type HookResult = Result<Option<Cleanup>, TrackedError>;

/// Remaps or absorbs a hook failure. Receives the error, the hook name and
/// the context (whose stage is the failing stage).
pub type HookErrorTranslator =
    Arc<dyn Fn(TrackedError, &str, &OperationContext) -> Option<TrackedError> + Send + Sync>;

/// A cross-cutting behaviour attached to every tracked call.
///
/// All stage callbacks default to doing nothing.
pub trait Hook: Send + Sync {
    /// Name used in hook error reports.
    fn name(&self) -> &str;

    /// Lower runs earlier.
    fn priority(&self) -> i32 {
        0
    }

    fn on_try(&self, _ctx: &mut OperationContext) -> HookResult {
        Ok(None)
    }

    fn on_success(&self, _ctx: &mut OperationContext) -> HookResult {
        Ok(None)
    }

    fn on_catch(&self, _ctx: &mut OperationContext) -> HookResult {
        Ok(None)
    }

    fn on_finally(&self, _ctx: &mut OperationContext) -> HookResult {
        Ok(None)
    }
}

/// Build a hook failure.
pub fn hook_error(hook: &str, stage: Stage, message: impl Into<String>) -> TrackedError {
    ErrorKind::Hook {
        hook: hook.to_string(),
        stage: stage.to_string(),
        message: message.into(),
    }
    .into()
}

/// Outcome of a callable that may or may not have completed yet.
pub enum Invocation<'a, T> {
    Ready(Result<T, TrackedError>),
    Pending(BoxFuture<'a, Result<T, TrackedError>>),
}

impl<'a, T: Send + 'a> Invocation<'a, T> {
    pub fn is_pending(&self) -> bool {
        matches!(self, Invocation::Pending(_))
    }

    /// The outcome, if already available.
    pub fn ready(self) -> Option<Result<T, TrackedError>> {
        match self {
            Invocation::Ready(outcome) => Some(outcome),
            Invocation::Pending(_) => None,
        }
    }

    /// Await the outcome whichever form it is in.
    pub fn into_future(self) -> BoxFuture<'a, Result<T, TrackedError>> {
        match self {
            Invocation::Ready(outcome) => Box::pin(std::future::ready(outcome)),
            Invocation::Pending(fut) => fut,
        }
    }
}

impl<T> fmt::Debug for Invocation<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Invocation::Ready(Ok(_)) => f.write_str("Ready(Ok)"),
            Invocation::Ready(Err(error)) => f.debug_tuple("Ready").field(error).finish(),
            Invocation::Pending(_) => f.write_str("Pending"),
        }
    }
}

/// Runs callables through a fixed, priority-sorted set of hooks.
#[derive(Clone)]
pub struct HookEngine {
    hooks: Vec<Arc<dyn Hook>>,
    on_hook_error: Option<HookErrorTranslator>,
}

impl HookEngine {
    pub fn new(mut hooks: Vec<Arc<dyn Hook>>) -> Self {
        // Vec::sort_by_key is stable.
        hooks.sort_by_key(|h| h.priority());
        Self {
            hooks,
            on_hook_error: None,
        }
    }

    pub fn with_hook_error_translator<F>(mut self, translator: F) -> Self
    where
        F: Fn(TrackedError, &str, &OperationContext) -> Option<TrackedError>
            + Send
            + Sync
            + 'static,
    {
        self.on_hook_error = Some(Arc::new(translator));
        self
    }

    /// Hook names in execution order.
    pub fn hook_names(&self) -> Vec<&str> {
        self.hooks.iter().map(|h| h.name()).collect()
    }

    /// Track a synchronous callable.
    pub fn run_sync<T, F>(&self, mut ctx: OperationContext, f: F) -> Result<T, TrackedError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, TrackedError>,
    {
        let try_cleanups = self.begin(&mut ctx)?;
        let outcome = scope_sync(Arc::clone(ctx.frame()), f);
        self.complete(ctx, try_cleanups, outcome)
    }

    /// Track an asynchronous callable.
    pub async fn run<T, F, Fut>(&self, mut ctx: OperationContext, f: F) -> Result<T, TrackedError>
    where
        T: Send + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, TrackedError>>,
    {
        let try_cleanups = self.begin(&mut ctx)?;
        let frame = Arc::clone(ctx.frame());
        let fut = scope_sync(Arc::clone(&frame), f);
        let outcome = scope(frame, fut).await;
        self.complete(ctx, try_cleanups, outcome)
    }

    /// Track a callable whose outcome may be ready or pending, preserving
    /// which one it is.
    pub fn invoke<'a, T, F>(&'a self, mut ctx: OperationContext, f: F) -> Invocation<'a, T>
    where
        T: Send + 'static,
        F: FnOnce() -> Invocation<'a, T>,
    {
        let try_cleanups = match self.begin(&mut ctx) {
            Ok(cleanups) => cleanups,
            Err(error) => return Invocation::Ready(Err(error)),
        };
        let frame = Arc::clone(ctx.frame());
        match scope_sync(Arc::clone(&frame), f) {
            Invocation::Ready(outcome) => {
                Invocation::Ready(self.complete(ctx, try_cleanups, outcome))
            }
            Invocation::Pending(fut) => Invocation::Pending(Box::pin(async move {
                let outcome = scope(frame, fut).await;
                self.complete(ctx, try_cleanups, outcome)
            })),
        }
    }

    /// Run the try stage, keeping its cleanups for later.
    fn begin(&self, ctx: &mut OperationContext) -> Result<Vec<Cleanup>, TrackedError> {
        ctx.set_stage(Stage::Try);
        let (cleanups, result) = self.collect_stage(ctx, Stage::Try);
        match result {
            Ok(()) => Ok(cleanups),
            Err(error) => {
                run_cleanups(cleanups, ctx);
                Err(error)
            }
        }
    }

    fn complete<T: Send + 'static>(
        &self,
        mut ctx: OperationContext,
        try_cleanups: Vec<Cleanup>,
        outcome: Result<T, TrackedError>,
    ) -> Result<T, TrackedError> {
        let stage = match outcome {
            Ok(value) => {
                ctx.set_result(value);
                Stage::Success
            }
            Err(error) => {
                ctx.set_error(Some(error));
                Stage::Catch
            }
        };

        let staged = self
            .run_stage(&mut ctx, stage)
            .and_then(|()| self.run_stage(&mut ctx, Stage::Finally));

        run_cleanups(try_cleanups, &ctx);

        staged?;
        ctx.into_outcome()
    }

    fn run_stage(&self, ctx: &mut OperationContext, stage: Stage) -> Result<(), TrackedError> {
        ctx.set_stage(stage);
        let (cleanups, result) = self.collect_stage(ctx, stage);
        run_cleanups(cleanups, ctx);
        result
    }

    fn collect_stage(
        &self,
        ctx: &mut OperationContext,
        stage: Stage,
    ) -> (Vec<Cleanup>, Result<(), TrackedError>) {
        let mut cleanups = Vec::new();
        for hook in &self.hooks {
            let result = match stage {
                Stage::Try => hook.on_try(ctx),
                Stage::Success => hook.on_success(ctx),
                Stage::Catch => hook.on_catch(ctx),
                Stage::Finally => hook.on_finally(ctx),
            };
            match result {
                Ok(Some(cleanup)) => cleanups.push(cleanup),
                Ok(None) => {}
                Err(error) => {
                    let translated = match &self.on_hook_error {
                        Some(translate) => translate(error, hook.name(), ctx),
                        None => Some(error),
                    };
                    if let Some(error) = translated {
                        return (cleanups, Err(error));
                    }
                }
            }
        }
        (cleanups, Ok(()))
    }
}

impl fmt::Debug for HookEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookEngine")
            .field("hooks", &self.hook_names())
            .field("on_hook_error", &self.on_hook_error.is_some())
            .finish()
    }
}

fn run_cleanups(cleanups: Vec<Cleanup>, ctx: &OperationContext) {
    for cleanup in cleanups.into_iter().rev() {
        cleanup(ctx);
    }
}
