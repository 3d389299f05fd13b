//! track
//!
//! Operation tracking: every tracked call runs through a fixed, priority
//! sorted set of hooks that time it, link it to its parent, log it and turn
//! it into metrics.
//!
//! # Modules
//!
//! - [`engine`] - Hook composition engine (try/success/catch/finally)
//! - [`context`] - Per-call state and the task-scoped current operation
//! - [`hooks`] - Default hooks (duration, error handler, tree, finally)
//! - [`logger`] - Logger hook
//! - [`stats`] - Stats hook
//! - [`tracker`] - [`OperationTracker`], the assembled facade

pub mod context;
pub mod engine;
pub mod hooks;
pub mod logger;
pub mod stats;
pub mod tracker;

pub use context::{
    current_operation, log_on_error, ErrorSubstitute, OperationContext, OperationFrame, Stage,
    StatsEvent, StatsEventKind, TrackArgs, PATH_SEPARATOR,
};
pub use engine::{hook_error, BoxFuture, Cleanup, Hook, HookEngine, HookResult, Invocation};
pub use tracker::{OperationTracker, TrackerBuilder};
