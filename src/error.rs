//! error
//!
//! Error taxonomy shared by every latchwork surface.
//!
//! # Design
//!
//! [`ErrorKind`] names what went wrong. [`TrackedError`] decorates a kind with
//! the operation it surfaced in, the error it replaced, and tags that should
//! follow it into metrics. The decoration fields are declared up front. The
//! operation snapshot is skipped when serializing, so an error serialized into
//! a log payload carries only its own fields.
//!
//! # Retryability
//!
//! Store and lock failures are always retryable so upstream redelivery can
//! treat them uniformly. Computation failures ([`ErrorKind::Integration`])
//! honour an explicit retry flag and otherwise classify their HTTP-like status.
//!
//! # Example
//!
//! ```
//! use latchwork::error::{ErrorKind, TrackedError};
//!
//! let err = TrackedError::integration("Bad Request", "400", Some(400));
//! assert!(!err.is_retryable());
//! assert_eq!(err.class_name(), "IntegrationError");
//!
//! let err: TrackedError = ErrorKind::StoreUnavailable("connection reset".into()).into();
//! assert!(err.is_retryable());
//! ```

use std::fmt;

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::core::status::is_retryable_status;
use crate::store::StoreError;

/// What went wrong.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "type", content = "detail", rename_all = "snake_case")]
pub enum ErrorKind {
    /// The cache/lock store could not be reached or answered with an error.
    #[error("cache store unavailable: {0}")]
    StoreUnavailable(String),

    /// Lock acquisition exceeded its wait budget.
    #[error("timeout while acquiring lock '{key}' after {waited_ms} ms")]
    LockTimeout {
        /// Logical key the lock guards
        key: String,
        /// How long acquisition was attempted
        waited_ms: u64,
    },

    /// The store failed while a lock was being acquired.
    #[error("failed to acquire lock '{key}': {message}")]
    LockAcquire {
        /// Logical key the lock guards
        key: String,
        /// Store failure description
        message: String,
    },

    /// Failure of the wrapped computation (or one replayed from cache).
    #[error("{message}")]
    Integration {
        /// Human readable message
        message: String,
        /// Short machine code (e.g. "400", "ETIMEDOUT")
        code: String,
        /// HTTP-like status, if known
        status: Option<u16>,
        /// Explicit retry decision; classified from `status` when absent
        retry: Option<bool>,
    },

    /// An instrumentation hook failed.
    #[error("hook '{hook}' failed during {stage}: {message}")]
    Hook {
        /// Hook name
        hook: String,
        /// Lifecycle stage the hook was running
        stage: String,
        /// Failure description
        message: String,
    },

    /// A value could not be serialized or deserialized.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl ErrorKind {
    /// Stable class label used in log messages and `error_class` tags.
    pub fn class_name(&self) -> &'static str {
        match self {
            ErrorKind::StoreUnavailable(_) => "StoreUnavailableError",
            ErrorKind::LockTimeout { .. } => "LockTimeoutError",
            ErrorKind::LockAcquire { .. } => "LockAcquireError",
            ErrorKind::Integration { .. } => "IntegrationError",
            ErrorKind::Hook { .. } => "HookError",
            ErrorKind::Serialization(_) => "SerializationError",
        }
    }
}

/// Where a tracked error surfaced.
///
/// A snapshot rather than a reference: the operation context is discarded
/// once its call completes, while the error may travel much further.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedAt {
    /// Id of the operation context
    pub id: Uuid,
    /// Operation name
    pub operation: String,
    /// Dotted-path of the operation chain (root first)
    pub path: String,
}

/// An error decorated with tracking information.
#[derive(Debug, Clone, Serialize)]
pub struct TrackedError {
    kind: ErrorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    underlying: Option<Box<TrackedError>>,
    #[serde(skip)]
    tracked: Option<TrackedAt>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tags: Vec<String>,
}

impl TrackedError {
    /// Wrap a bare error kind.
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            underlying: None,
            tracked: None,
            tags: Vec::new(),
        }
    }

    /// Computation failure with status-based retry classification.
    pub fn integration(
        message: impl Into<String>,
        code: impl Into<String>,
        status: Option<u16>,
    ) -> Self {
        Self::new(ErrorKind::Integration {
            message: message.into(),
            code: code.into(),
            status,
            retry: None,
        })
    }

    /// Force the retry decision of an integration error.
    ///
    /// Other kinds keep their fixed classification.
    pub fn with_retry(mut self, retry: bool) -> Self {
        if let ErrorKind::Integration { retry: r, .. } = &mut self.kind {
            *r = Some(retry);
        }
        self
    }

    /// Record the error this one replaces.
    pub fn with_underlying(mut self, underlying: TrackedError) -> Self {
        self.underlying = Some(Box::new(underlying));
        self
    }

    /// Append tags that follow the error into metrics.
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub(crate) fn attach(&mut self, at: TrackedAt) {
        self.tracked = Some(at);
    }

    /// The error kind.
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// The error this one replaced, if any.
    pub fn underlying(&self) -> Option<&TrackedError> {
        self.underlying.as_deref()
    }

    /// The operation this error surfaced in, if it passed through a tracker.
    pub fn tracked(&self) -> Option<&TrackedAt> {
        self.tracked.as_ref()
    }

    /// Tags attached to the error.
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Class label of the underlying kind.
    pub fn class_name(&self) -> &'static str {
        self.kind.class_name()
    }

    /// The error message (without class prefix).
    pub fn message(&self) -> String {
        self.kind.to_string()
    }

    /// HTTP-like status of an integration error.
    pub fn status(&self) -> Option<u16> {
        match &self.kind {
            ErrorKind::Integration { status, .. } => *status,
            _ => None,
        }
    }

    /// Machine code of an integration error.
    pub fn code(&self) -> Option<&str> {
        match &self.kind {
            ErrorKind::Integration { code, .. } => Some(code),
            _ => None,
        }
    }

    /// Whether the caller may safely retry the whole operation.
    pub fn is_retryable(&self) -> bool {
        match &self.kind {
            ErrorKind::StoreUnavailable(_)
            | ErrorKind::LockTimeout { .. }
            | ErrorKind::LockAcquire { .. } => true,
            ErrorKind::Integration { retry, status, .. } => {
                retry.unwrap_or_else(|| is_retryable_status(*status))
            }
            ErrorKind::Hook { .. } | ErrorKind::Serialization(_) => false,
        }
    }
}

impl fmt::Display for TrackedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.kind.fmt(f)
    }
}

impl std::error::Error for TrackedError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.underlying
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

impl From<ErrorKind> for TrackedError {
    fn from(kind: ErrorKind) -> Self {
        TrackedError::new(kind)
    }
}

impl From<StoreError> for TrackedError {
    fn from(err: StoreError) -> Self {
        TrackedError::new(ErrorKind::StoreUnavailable(err.to_string()))
    }
}

impl From<serde_json::Error> for TrackedError {
    fn from(err: serde_json::Error) -> Self {
        TrackedError::new(ErrorKind::Serialization(err.to_string()))
    }
}
