//! core
//!
//! Leaf building blocks with no tracking or store dependencies.
//!
//! # Modules
//!
//! - [`retry`] - Bounded retry with a pluggable delay policy
//! - [`status`] - Retryability classification of HTTP-like statuses
//! - [`outcome`] - Compact string codec for cached outcomes
//! - [`config`] - Configuration schema and loading

pub mod config;
pub mod outcome;
pub mod retry;
pub mod status;
