//! core::status
//!
//! Retryability classification of HTTP-like status codes.
//!
//! The default rule looks at the hundreds digit: 2xx and 4xx are final,
//! everything else (3xx, 5xx, unknown) is worth retrying. A handful of
//! statuses are overridden explicitly: 408, 423 and 429 are transient client
//! errors, 501 will never start working on its own.

/// Statuses that are retryable regardless of their class.
pub const RETRYABLE_OVERRIDES: &[u16] = &[408, 423, 429];

/// Statuses that are final regardless of their class.
pub const NOT_RETRYABLE_OVERRIDES: &[u16] = &[501];

/// Classify a status with the default overrides.
///
/// # Example
///
/// ```
/// use latchwork::core::status::is_retryable_status;
///
/// assert!(is_retryable_status(Some(429)));
/// assert!(!is_retryable_status(Some(400)));
/// assert!(!is_retryable_status(Some(501)));
/// assert!(is_retryable_status(Some(500)));
/// assert!(is_retryable_status(None));
/// ```
pub fn is_retryable_status(status: Option<u16>) -> bool {
    match status {
        None => true,
        Some(s) if RETRYABLE_OVERRIDES.contains(&s) => true,
        Some(s) if NOT_RETRYABLE_OVERRIDES.contains(&s) => false,
        Some(s) => !matches!(s / 100, 2 | 4),
    }
}
