//! core::outcome
//!
//! Compact string codec for cached computation outcomes.
//!
//! # Wire Format
//!
//! ```text
//! 0:-:<status>                          success
//! 1:-:<status>:-:<message>:-:<code>     error
//! ```
//!
//! The delimiter is `:-:`. Decoding rejects payloads with fewer than two
//! parts, error payloads with fewer than four parts, unknown type codes and
//! non-numeric statuses, each with its own [`OutcomeParseError`] variant.
//! The error code is taken from the last part, so a message may itself
//! contain the delimiter. Extra parts after a success status are ignored.
//!
//! # Example
//!
//! ```
//! use latchwork::core::outcome::CachedOutcome;
//!
//! let outcome = CachedOutcome::Error {
//!     status: 400,
//!     message: "Bad Request".into(),
//!     code: "400".into(),
//! };
//! let encoded = outcome.encode();
//! assert_eq!(encoded, "1:-:400:-:Bad Request:-:400");
//! assert_eq!(CachedOutcome::decode(&encoded).unwrap(), outcome);
//! ```

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

/// Separator between encoded parts.
pub const DELIMITER: &str = ":-:";

const SUCCESS_TYPE: &str = "0";
const ERROR_TYPE: &str = "1";

/// Outcome of a computation as it is persisted in the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CachedOutcome {
    /// The computation succeeded with a status.
    Success {
        /// HTTP-like status
        status: u16,
    },
    /// The computation failed with a non-retryable error.
    Error {
        /// HTTP-like status
        status: u16,
        /// Error message
        message: String,
        /// Error code
        code: String,
    },
}

/// Errors from decoding a cached outcome string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OutcomeParseError {
    /// The payload has fewer than two parts.
    #[error("cached outcome '{0}' has fewer than 2 parts")]
    TooFewParts(String),

    /// An error payload has fewer than four parts.
    #[error("cached error outcome '{0}' has fewer than 4 parts")]
    IncompleteError(String),

    /// The type code is neither success nor error.
    #[error("unknown cached outcome type '{0}'")]
    UnknownType(String),

    /// The status is not a valid number.
    #[error("invalid status '{0}' in cached outcome")]
    InvalidStatus(String),
}

impl CachedOutcome {
    /// Status carried by the outcome.
    pub fn status(&self) -> u16 {
        match self {
            CachedOutcome::Success { status } | CachedOutcome::Error { status, .. } => *status,
        }
    }

    /// Whether this is an error outcome.
    pub fn is_error(&self) -> bool {
        matches!(self, CachedOutcome::Error { .. })
    }

    /// Encode into the delimited wire form.
    pub fn encode(&self) -> String {
        match self {
            CachedOutcome::Success { status } => {
                format!("{SUCCESS_TYPE}{DELIMITER}{status}")
            }
            CachedOutcome::Error {
                status,
                message,
                code,
            } => format!(
                "{ERROR_TYPE}{DELIMITER}{status}{DELIMITER}{message}{DELIMITER}{code}"
            ),
        }
    }

    /// Decode from the delimited wire form.
    pub fn decode(input: &str) -> Result<Self, OutcomeParseError> {
        let mut parts = input.splitn(3, DELIMITER);
        let (Some(kind), Some(status)) = (parts.next(), parts.next()) else {
            return Err(OutcomeParseError::TooFewParts(input.to_string()));
        };
        let rest = parts.next();

        match kind {
            SUCCESS_TYPE => Ok(CachedOutcome::Success {
                status: parse_status(status)?,
            }),
            ERROR_TYPE => {
                let (message, code) = rest
                    .and_then(|r| r.rsplit_once(DELIMITER))
                    .ok_or_else(|| OutcomeParseError::IncompleteError(input.to_string()))?;
                Ok(CachedOutcome::Error {
                    status: parse_status(status)?,
                    message: message.to_string(),
                    code: code.to_string(),
                })
            }
            other => Err(OutcomeParseError::UnknownType(other.to_string())),
        }
    }
}

fn parse_status(raw: &str) -> Result<u16, OutcomeParseError> {
    raw.trim()
        .parse()
        .map_err(|_| OutcomeParseError::InvalidStatus(raw.to_string()))
}

impl fmt::Display for CachedOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for CachedOutcome {
    type Err = OutcomeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}
