//! cache::serializer
//!
//! Turning computation outcomes into cache entries and back.
//!
//! # Contract
//!
//! `stringify` returns `Ok(None)` for outcomes that must not be cached.
//! `parse` returns `Ok(None)` for entries that should be ignored (treated
//! like a miss) and `Err` for corrupted entries. Both errors are handled by
//! the executor and never reach its caller.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::core::outcome::CachedOutcome;
use crate::error::{ErrorKind, TrackedError};

/// Converts between outcomes and cached strings.
pub trait CacheSerializer<T>: Send + Sync {
    /// Serialize an outcome, or decline with `None`.
    fn stringify(&self, outcome: &Result<T, TrackedError>) -> Result<Option<String>, TrackedError>;

    /// Parse a cached string into a value or a replayable error.
    fn parse(&self, cached: &str) -> Result<Option<Result<T, TrackedError>>, TrackedError>;
}

/// JSON envelope serializer.
///
/// Values are stored as `{"value": <json>}`. Errors are stored as
/// `{"error": "<cached outcome>"}`, and only when they are not retryable and
/// carry a status. Replayed errors come back as non-retryable integration
/// errors with the original status, message and code.
///
/// ```
/// use latchwork::cache::{CacheSerializer, DefaultSerializer};
/// use latchwork::error::TrackedError;
///
/// let serializer = DefaultSerializer;
/// let stored = CacheSerializer::<u32>::stringify(
///     &serializer,
///     &Err(TrackedError::integration("Bad Request", "400", Some(400))),
/// )
/// .unwrap();
/// assert_eq!(stored.as_deref(), Some(r#"{"error":"1:-:400:-:Bad Request:-:400"}"#));
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultSerializer;

impl<T> CacheSerializer<T> for DefaultSerializer
where
    T: Serialize + DeserializeOwned,
{
    fn stringify(&self, outcome: &Result<T, TrackedError>) -> Result<Option<String>, TrackedError> {
        let (field, content) = match outcome {
            Ok(value) => ("value", serde_json::to_value(value)?),
            Err(error) => match cacheable_error(error) {
                Some(cached) => ("error", Value::String(cached.encode())),
                None => return Ok(None),
            },
        };
        let mut envelope = Map::new();
        envelope.insert(field.to_string(), content);
        Ok(Some(serde_json::to_string(&envelope)?))
    }

    fn parse(&self, cached: &str) -> Result<Option<Result<T, TrackedError>>, TrackedError> {
        let mut envelope: Map<String, Value> = serde_json::from_str(cached)?;

        if let Some(error) = envelope.remove("error").filter(|e| !e.is_null()) {
            let encoded = error.as_str().ok_or_else(|| {
                TrackedError::from(ErrorKind::Serialization(
                    "cached error is not a string".to_string(),
                ))
            })?;
            return replay(encoded).map(|e| Some(Err(e)));
        }

        match envelope.remove("value") {
            Some(value) => Ok(Some(Ok(serde_json::from_value(value)?))),
            None => Ok(None),
        }
    }
}

/// Serializer for status-only results, storing the bare cached outcome.
///
/// `Ok(status)` is stored as `0:-:<status>`; cacheable errors as
/// `1:-:<status>:-:<message>:-:<code>`.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutcomeSerializer;

impl CacheSerializer<u16> for OutcomeSerializer {
    fn stringify(&self, outcome: &Result<u16, TrackedError>) -> Result<Option<String>, TrackedError> {
        Ok(match outcome {
            Ok(status) => Some(CachedOutcome::Success { status: *status }.encode()),
            Err(error) => cacheable_error(error).map(|cached| cached.encode()),
        })
    }

    fn parse(&self, cached: &str) -> Result<Option<Result<u16, TrackedError>>, TrackedError> {
        match decode(cached)? {
            CachedOutcome::Success { status } => Ok(Some(Ok(status))),
            outcome => Ok(Some(Err(into_error(outcome)))),
        }
    }
}

/// The cached form of an error, if it may be cached.
fn cacheable_error(error: &TrackedError) -> Option<CachedOutcome> {
    if error.is_retryable() {
        return None;
    }
    let status = error.status()?;
    Some(CachedOutcome::Error {
        status,
        message: error.message(),
        code: error
            .code()
            .map(str::to_string)
            .unwrap_or_else(|| status.to_string()),
    })
}

fn decode(cached: &str) -> Result<CachedOutcome, TrackedError> {
    CachedOutcome::decode(cached)
        .map_err(|e| TrackedError::from(ErrorKind::Serialization(e.to_string())))
}

fn replay(encoded: &str) -> Result<TrackedError, TrackedError> {
    match decode(encoded)? {
        CachedOutcome::Success { .. } => Err(ErrorKind::Serialization(format!(
            "cached error '{}' decodes to a success",
            encoded
        ))
        .into()),
        outcome => Ok(into_error(outcome)),
    }
}

fn into_error(outcome: CachedOutcome) -> TrackedError {
    match outcome {
        CachedOutcome::Error {
            status,
            message,
            code,
        } => TrackedError::integration(message, code, Some(status)).with_retry(false),
        CachedOutcome::Success { status } => {
            TrackedError::integration("unexpected cached success", status.to_string(), Some(status))
                .with_retry(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Profile {
        id: String,
        score: u32,
    }

    fn stringify<T: Serialize + DeserializeOwned>(outcome: &Result<T, TrackedError>) -> Option<String> {
        CacheSerializer::<T>::stringify(&DefaultSerializer, outcome).unwrap()
    }

    fn parse<T: Serialize + DeserializeOwned>(
        cached: &str,
    ) -> Result<Option<Result<T, TrackedError>>, TrackedError> {
        CacheSerializer::<T>::parse(&DefaultSerializer, cached)
    }

    #[test]
    fn value_envelope() {
        let profile = Profile {
            id: "u1".into(),
            score: 7,
        };
        let stored = stringify(&Ok(profile.clone())).unwrap();
        assert_eq!(stored, r#"{"value":{"id":"u1","score":7}}"#);

        let parsed = parse::<Profile>(&stored).unwrap().unwrap().unwrap();
        assert_eq!(parsed, profile);
    }

    #[test]
    fn null_value_is_still_a_value() {
        let stored = stringify(&Ok(())).unwrap();
        assert_eq!(stored, r#"{"value":null}"#);
        assert!(matches!(parse::<()>(&stored), Ok(Some(Ok(())))));
    }

    #[test]
    fn retryable_errors_are_not_cached() {
        let retryable = TrackedError::integration("down", "503", Some(503));
        assert_eq!(stringify::<u32>(&Err(retryable)), None);

        let forced = TrackedError::integration("bad", "400", Some(400)).with_retry(true);
        assert_eq!(stringify::<u32>(&Err(forced)), None);
    }

    #[test]
    fn errors_without_status_are_not_cached() {
        let no_status = TrackedError::integration("odd", "X", None).with_retry(false);
        assert_eq!(stringify::<u32>(&Err(no_status)), None);

        let hook = TrackedError::from(ErrorKind::Hook {
            hook: "h".into(),
            stage: "try".into(),
            message: "m".into(),
        });
        assert_eq!(stringify::<u32>(&Err(hook)), None);
    }

    #[test]
    fn cached_error_replays_as_non_retryable() {
        let original = TrackedError::integration("Bad Request", "INVALID_PHONE", Some(400));
        let stored = stringify::<u32>(&Err(original)).unwrap();

        let replayed = parse::<u32>(&stored).unwrap().unwrap().unwrap_err();
        assert_eq!(replayed.message(), "Bad Request");
        assert_eq!(replayed.code(), Some("INVALID_PHONE"));
        assert_eq!(replayed.status(), Some(400));
        assert!(!replayed.is_retryable());
    }

    #[test]
    fn empty_envelope_is_ignored() {
        assert!(matches!(parse::<u32>("{}"), Ok(None)));
        assert!(matches!(parse::<u32>(r#"{"error":null}"#), Ok(None)));
    }

    #[test]
    fn corrupted_entries_fail() {
        assert!(parse::<u32>("not json").is_err());
        assert!(parse::<u32>(r#"{"value":"text"}"#).is_err());
        assert!(parse::<u32>(r#"{"error":"1:-:400"}"#).is_err());
        assert!(parse::<u32>(r#"{"error":"0:-:200"}"#).is_err());
        assert!(parse::<u32>(r#"{"error":5}"#).is_err());
    }

    #[test]
    fn outcome_serializer_uses_bare_codec() {
        let serializer = OutcomeSerializer;
        assert_eq!(serializer.stringify(&Ok(202)).unwrap().as_deref(), Some("0:-:202"));
        assert!(matches!(serializer.parse("0:-:202"), Ok(Some(Ok(202)))));

        let err = TrackedError::integration("Not Found", "404", Some(404));
        let stored = serializer.stringify(&Err(err)).unwrap().unwrap();
        assert_eq!(stored, "1:-:404:-:Not Found:-:404");
        let replayed = serializer.parse(&stored).unwrap().unwrap().unwrap_err();
        assert_eq!(replayed.status(), Some(404));

        assert!(serializer.parse("garbage").is_err());
    }
}
