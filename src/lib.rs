//! Latchwork - keyed cache-aside execution with distributed leases and
//! operation tracking
//!
//! Latchwork is the coordination layer call sites wrap their side-effectful
//! work in. It runs a computation at most once concurrently per key across
//! workers sharing a key-value store, caches its outcome (value or
//! non-retryable error), and instruments every step with logs, metrics and
//! parent/child tracing, for sync and async callables alike.
//!
//! # Architecture
//!
//! Leaves first:
//!
//! - [`error`] - Error taxonomy and the tracked-error decoration
//! - [`core`] - Retry helper, status classifier, cached-outcome codec, config
//! - [`telemetry`] - Logging and metrics collaborators
//! - [`store`] - Key-value store abstraction and in-memory store
//! - [`track`] - Hook composition engine and operation tracker
//! - [`lock`] - Lease-based distributed lock
//! - [`cache`] - Cache-aside executor and serializers
//! - [`coordinator`] - The facade call sites hold
//! - [`cli`] - The `latch` command-line tool
//!
//! # Guarantees
//!
//! 1. At most one concurrent computation per key while its lease is held
//! 2. Every acquired lock is released exactly once
//! 3. Store failures surface as retryable errors, never as silent recomputes
//! 4. Cache writes never fail the computation they store

pub mod cache;
pub mod cli;
pub mod coordinator;
pub mod core;
pub mod error;
pub mod lock;
pub mod store;
pub mod telemetry;
pub mod track;

pub use coordinator::{Coordinator, CoordinatorBuilder};
pub use error::{ErrorKind, TrackedError};
