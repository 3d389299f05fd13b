//! store
//!
//! Key-value store abstraction backing the cache and the distributed lock.
//!
//! # Modules
//!
//! - [`traits`] - The `CacheStore` trait and its error type
//! - [`memory`] - In-memory implementation with failure injection

pub mod memory;
pub mod traits;

pub use memory::{FailOn, MemoryStore, StoreOperation};
pub use traits::{CacheStore, StoreError, StoreOp};
