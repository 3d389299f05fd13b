//! store::traits
//!
//! The remote key-value store the cache and lock layers are built on.
//!
//! # Design
//!
//! Every call is remote I/O and may fail. Locks only need two atomic
//! primitives from the store: `set_by_key_nx` (create-if-absent with a TTL)
//! and `del_by_key`. No multi-key transactions are assumed.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Errors reported by a store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The store could not be reached.
    #[error("store connection failed: {0}")]
    Connection(String),

    /// The store did not answer in time.
    #[error("store operation timed out: {0}")]
    Timeout(String),

    /// The store rejected the command.
    #[error("store command failed: {0}")]
    Command(String),
}

/// Operations a store exposes, used to target failure injection and counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Get,
    Set,
    SetNx,
    Del,
}

/// Remote key-value store with TTL support.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; one store is shared by every
/// concurrent call on a coordinator.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Read a value; `None` if absent or expired.
    async fn get_by_key(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a value, with the store default TTL when `ttl` is `None`.
    async fn set_by_key(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError>;

    /// Atomically create `key` if it does not exist.
    ///
    /// Returns `true` if this call created it.
    async fn set_by_key_nx(&self, key: &str, value: &str, ttl: Duration)
        -> Result<bool, StoreError>;

    /// Delete a key, returning the number of keys removed.
    async fn del_by_key(&self, key: &str) -> Result<u64, StoreError>;

    /// Whether `set_by_key_nx` gives mutual exclusion across processes.
    fn supports_locking(&self) -> bool {
        true
    }
}
