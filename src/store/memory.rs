//! store::memory
//!
//! In-process store for tests and single-node use.
//!
//! # Design
//!
//! Entries live in a map behind `Arc<Mutex<...>>` so clones share state.
//! Expiry is checked lazily on access against `tokio::time::Instant`, so a
//! paused test clock drives it. Every call is recorded, and failures can be
//! injected per operation, optionally for a limited number of calls.
//!
//! # Example
//!
//! ```
//! use latchwork::store::{CacheStore, MemoryStore, StoreOp};
//!
//! # tokio_test::block_on(async {
//! let store = MemoryStore::new();
//! store.set_by_key("k", "v", None).await.unwrap();
//! assert_eq!(store.get_by_key("k").await.unwrap().as_deref(), Some("v"));
//! assert_eq!(store.count(StoreOp::Set), 1);
//! # });
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use super::traits::{CacheStore, StoreError, StoreOp};

/// In-memory TTL store.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryStoreInner>>,
}

#[derive(Debug)]
struct MemoryStoreInner {
    entries: HashMap<String, Entry>,
    fail_on: Vec<FailOn>,
    operations: Vec<StoreOperation>,
    supports_locking: bool,
    latency: Option<Duration>,
}

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

/// Failure injection rule.
#[derive(Debug, Clone)]
pub struct FailOn {
    /// Operation to fail
    pub op: StoreOp,
    /// Error to return
    pub error: StoreError,
    /// Number of calls to fail; `None` fails forever
    pub remaining: Option<u32>,
}

impl FailOn {
    /// Fail every call of `op`.
    pub fn always(op: StoreOp, error: StoreError) -> Self {
        Self {
            op,
            error,
            remaining: None,
        }
    }

    /// Fail the next `times` calls of `op`.
    pub fn times(op: StoreOp, error: StoreError, times: u32) -> Self {
        Self {
            op,
            error,
            remaining: Some(times),
        }
    }
}

/// Recorded call for test verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOperation {
    Get {
        key: String,
    },
    Set {
        key: String,
        value: String,
        ttl: Option<Duration>,
    },
    SetNx {
        key: String,
        value: String,
        ttl: Duration,
    },
    Del {
        key: String,
    },
}

impl StoreOperation {
    /// Which operation this call was.
    pub fn op(&self) -> StoreOp {
        match self {
            StoreOperation::Get { .. } => StoreOp::Get,
            StoreOperation::Set { .. } => StoreOp::Set,
            StoreOperation::SetNx { .. } => StoreOp::SetNx,
            StoreOperation::Del { .. } => StoreOp::Del,
        }
    }
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MemoryStoreInner {
                entries: HashMap::new(),
                fail_on: Vec::new(),
                operations: Vec::new(),
                supports_locking: true,
                latency: None,
            })),
        }
    }

    /// Add a failure rule. Rules are checked in insertion order.
    pub fn fail_on(self, rule: FailOn) -> Self {
        self.lock().fail_on.push(rule);
        self
    }

    /// Remove all failure rules.
    pub fn clear_fail_on(&self) {
        self.lock().fail_on.clear();
    }

    /// Report whether this store can back a distributed lock.
    pub fn with_locking(self, supported: bool) -> Self {
        self.lock().supports_locking = supported;
        self
    }

    /// Sleep before answering every call.
    pub fn with_latency(self, latency: Duration) -> Self {
        self.lock().latency = Some(latency);
        self
    }

    /// Seed a value without recording a call.
    pub fn insert(&self, key: impl Into<String>, value: impl Into<String>) {
        self.lock().entries.insert(
            key.into(),
            Entry {
                value: value.into(),
                expires_at: None,
            },
        );
    }

    /// Peek at a live value without recording a call.
    pub fn peek(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        self.lock()
            .entries
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.value.clone())
    }

    /// All recorded calls.
    pub fn operations(&self) -> Vec<StoreOperation> {
        self.lock().operations.clone()
    }

    /// Number of recorded calls of `op`.
    pub fn count(&self, op: StoreOp) -> usize {
        self.lock()
            .operations
            .iter()
            .filter(|o| o.op() == op)
            .count()
    }

    /// Clear recorded calls.
    pub fn clear_operations(&self) {
        self.lock().operations.clear();
    }

    fn lock(&self) -> MutexGuard<'_, MemoryStoreInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record the call, wait out any latency, then apply failure rules.
    async fn begin(&self, operation: StoreOperation) -> Result<(), StoreError> {
        let op = operation.op();
        let latency = {
            let mut inner = self.lock();
            inner.operations.push(operation);
            inner.latency
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut inner = self.lock();
        let Some(index) = inner.fail_on.iter().position(|r| r.op == op) else {
            return Ok(());
        };
        let rule = &mut inner.fail_on[index];
        let error = rule.error.clone();
        let remaining = rule.remaining;
        match remaining {
            None => {}
            Some(n) if n > 1 => rule.remaining = Some(n - 1),
            Some(_) => {
                inner.fail_on.remove(index);
            }
        }
        Err(error)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get_by_key(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.begin(StoreOperation::Get {
            key: key.to_string(),
        })
        .await?;

        let now = Instant::now();
        let mut inner = self.lock();
        match inner.entries.get(key) {
            Some(entry) if entry.is_live(now) => Ok(Some(entry.value.clone())),
            Some(_) => {
                inner.entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_by_key(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError> {
        self.begin(StoreOperation::Set {
            key: key.to_string(),
            value: value.to_string(),
            ttl,
        })
        .await?;

        let expires_at = ttl.map(|t| Instant::now() + t);
        self.lock().entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(true)
    }

    async fn set_by_key_nx(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        self.begin(StoreOperation::SetNx {
            key: key.to_string(),
            value: value.to_string(),
            ttl,
        })
        .await?;

        let now = Instant::now();
        let mut inner = self.lock();
        if inner.entries.get(key).is_some_and(|e| e.is_live(now)) {
            return Ok(false);
        }
        inner.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Some(now + ttl),
            },
        );
        Ok(true)
    }

    async fn del_by_key(&self, key: &str) -> Result<u64, StoreError> {
        self.begin(StoreOperation::Del {
            key: key.to_string(),
        })
        .await?;

        let now = Instant::now();
        let removed = self.lock().entries.remove(key);
        Ok(u64::from(removed.is_some_and(|e| e.is_live(now))))
    }

    fn supports_locking(&self) -> bool {
        self.lock().supports_locking
    }
}
