//! Remote Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::io::Error as IoError;
use std::time::Duration;

/// A remote error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for remote operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally:
///
/// - **Transient** ([`is_retryable()`](Self::is_retryable)): try again later.
/// - **Fatal** ([`is_fatal()`](Self::is_fatal)): stop talking to this service.
/// - Everything else is permanent for the request that caused it.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The request did not complete in time.
    #[display("request timed out")]
    Timeout,
    /// Quota exceeded (HTTP 429 or equivalent).
    #[display("rate limited")]
    RateLimited(#[error(not(source))] Option<Duration>),
    /// The service failed on its side (HTTP 500/502/503 or equivalent).
    #[display("service unavailable: {_0}")]
    Unavailable(#[error(not(source))] String),
    /// Connection-level failure.
    #[display("network error: {_0}")]
    Network(#[error(not(source))] String),
    /// Credentials missing, expired or rejected.
    #[display("unauthenticated: {_0}")]
    Unauthenticated(#[error(not(source))] String),
    /// Credentials are valid but not allowed to do this.
    #[display("permission denied: {_0}")]
    PermissionDenied(#[error(not(source))] String),
    /// The addressed file or record does not exist.
    #[display("not found: {_0}")]
    NotFound(#[error(not(source))] String),
    /// The request was malformed or failed validation.
    #[display("rejected: {_0}")]
    Rejected(#[error(not(source))] String),
    /// Underlying I/O error
    #[display("I/O error: {_0}")]
    Io(IoError),
    /// Data read back from the service could not be understood.
    #[display("invalid data: {_0}")]
    InvalidData(#[error(not(source))] String),
}
impl From<IoError> for ErrorKind {
    fn from(err: IoError) -> Self {
        Self::Io(err)
    }
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout | Self::RateLimited(_) | Self::Unavailable(_) | Self::Network(_) | Self::Io(_))
    }

    /// Returns `true` if no further request can succeed with the current
    /// credentials.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Unauthenticated(_) | Self::PermissionDenied(_))
    }

    /// Server-suggested delay before the next attempt, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited(after) => *after,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_kinds_are_retryable() {
        assert!(ErrorKind::Timeout.is_retryable());
        assert!(ErrorKind::RateLimited(None).is_retryable());
        assert!(ErrorKind::Unavailable("502".into()).is_retryable());
        assert!(ErrorKind::Network("reset".into()).is_retryable());
    }

    #[test]
    fn test_permanent_kinds() {
        for kind in [ErrorKind::NotFound("6602".into()), ErrorKind::Rejected("schema".into())] {
            assert!(!kind.is_retryable());
            assert!(!kind.is_fatal());
        }
    }

    #[test]
    fn test_fatal_kinds() {
        assert!(ErrorKind::Unauthenticated("expired".into()).is_fatal());
        assert!(ErrorKind::PermissionDenied("folder".into()).is_fatal());
        assert!(!ErrorKind::Unauthenticated("expired".into()).is_retryable());
    }

    #[test]
    fn test_retry_after() {
        let after = Duration::from_secs(3);
        assert_eq!(ErrorKind::RateLimited(Some(after)).retry_after(), Some(after));
        assert_eq!(ErrorKind::Timeout.retry_after(), None);
    }
}
