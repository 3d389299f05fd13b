//! track::hooks
//!
//! Default hooks every tracker installs.
//!
//! | Hook            | Priority | Does                                          |
//! |-----------------|----------|-----------------------------------------------|
//! | `DurationHook`  | -1000    | starts the clock on try, stops it on finally  |
//! | `ErrorHandler`  | -900     | substitutes and decorates errors on catch     |
//! | `TreeHook`      | -800     | links the parent operation on try             |
//! | `FinallyHooks`  | 1000     | runs the accumulated finally callbacks        |
//!
//! Logger and stats hooks sit at the default priority 0, between the tree
//! link and the finally callbacks.

use std::sync::Arc;

use crate::error::TrackedAt;

use super::context::{current_operation, OperationContext};
use super::engine::{Hook, HookResult};

pub const DURATION_PRIORITY: i32 = -1000;
pub const ERROR_HANDLER_PRIORITY: i32 = -900;
pub const TREE_PRIORITY: i32 = -800;
pub const FINALLY_HOOKS_PRIORITY: i32 = 1000;

/// Times the operation.
///
/// Runs first, so its try scope wraps every other hook.
#[derive(Debug, Default)]
pub struct DurationHook;

impl Hook for DurationHook {
    fn name(&self) -> &str {
        "duration"
    }

    fn priority(&self) -> i32 {
        DURATION_PRIORITY
    }

    fn on_try(&self, ctx: &mut OperationContext) -> HookResult {
        ctx.mark_started();
        Ok(None)
    }

    fn on_finally(&self, ctx: &mut OperationContext) -> HookResult {
        ctx.mark_finished();
        Ok(None)
    }
}

/// Prepares errors raised by the wrapped callable.
///
/// An error already tracked by a child operation passes through untouched.
/// Otherwise the call's `on_error` may substitute it (the original becomes
/// the substitute's underlying error) and add tags, and the error is stamped
/// with the operation it surfaced in.
#[derive(Debug, Default)]
pub struct ErrorHandler;

impl Hook for ErrorHandler {
    fn name(&self) -> &str {
        "error_handler"
    }

    fn priority(&self) -> i32 {
        ERROR_HANDLER_PRIORITY
    }

    fn on_catch(&self, ctx: &mut OperationContext) -> HookResult {
        let Some(mut error) = ctx.take_error() else {
            return Ok(None);
        };
        if error.tracked().is_some() {
            ctx.set_error(Some(error));
            return Ok(None);
        }

        let args = Arc::clone(ctx.args());
        if let Some(substitute) = args.on_error.as_ref().and_then(|f| f(&error, ctx)) {
            if let Some(replacement) = substitute.error {
                error = replacement.with_underlying(error);
            }
            error = error.with_tags(substitute.tags);
        }

        let frame = ctx.frame();
        error.attach(TrackedAt {
            id: frame.id(),
            operation: frame.name().to_string(),
            path: frame.path(),
        });
        ctx.set_error(Some(error));
        Ok(None)
    }
}

/// Links the operation to the one it was called from.
#[derive(Debug, Default)]
pub struct TreeHook;

impl Hook for TreeHook {
    fn name(&self) -> &str {
        "tree"
    }

    fn priority(&self) -> i32 {
        TREE_PRIORITY
    }

    fn on_try(&self, ctx: &mut OperationContext) -> HookResult {
        if let Some(parent) = current_operation() {
            if !Arc::ptr_eq(&parent, ctx.frame()) {
                ctx.frame().set_parent(parent);
            }
        }
        Ok(None)
    }
}

/// Runs the call's `on_finally` and the callbacks appended to its frame.
///
/// Runs last, so callbacks see every tag and log added before them.
#[derive(Debug, Default)]
pub struct FinallyHooks;

impl Hook for FinallyHooks {
    fn name(&self) -> &str {
        "finally_hooks"
    }

    fn priority(&self) -> i32 {
        FINALLY_HOOKS_PRIORITY
    }

    fn on_finally(&self, ctx: &mut OperationContext) -> HookResult {
        if let Some(on_finally) = &ctx.args().on_finally {
            on_finally(ctx);
        }
        for callback in ctx.frame().take_finally_callbacks() {
            callback(ctx);
        }
        Ok(None)
    }
}

/// The default hooks, in no particular order (the engine sorts them).
pub fn default_hooks() -> Vec<Arc<dyn Hook>> {
    vec![
        Arc::new(ErrorHandler),
        Arc::new(TreeHook),
        Arc::new(DurationHook),
        Arc::new(FinallyHooks),
    ]
}
