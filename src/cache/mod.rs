//! cache
//!
//! Cache-aside execution over a [`CacheStore`](crate::store::CacheStore).
//!
//! A cache miss, a corrupted entry, an ignored entry and a cached error are
//! handled as four distinct cases. Writes are best effort; reads that fail
//! surface a retryable error instead of recomputing.
//!
//! # Modules
//!
//! - [`executor`] - `CacheExecutor` and `CacheOptions`
//! - [`serializer`] - `CacheSerializer` and the built-in serializers

pub mod executor;
pub mod serializer;

pub use executor::{CacheExecutor, CacheOptions, OnSaveFailed, CACHE_LOCK_PREFIX, GET_OR_ADD_CACHE};
pub use serializer::{CacheSerializer, DefaultSerializer, OutcomeSerializer};
