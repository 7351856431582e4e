//! Storage Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::io::Error as IoError;
use std::path::PathBuf;

/// A storage error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Object does not exist
    #[display("object not found: {_0}")]
    NotFound(#[error(not(source))] String),
    /// Credentials were rejected outright.
    #[display("unauthenticated: {_0}")]
    Unauthenticated(#[error(not(source))] String),
    /// Credentials are valid but lack access to the key or bucket.
    #[display("permission denied: {_0}")]
    PermissionDenied(#[error(not(source))] String),
    /// Underlying I/O error
    #[display("I/O error: {_0}")]
    Io(IoError),
    /// Network-related error (S3 connections, etc.)
    #[display("network error: {_0}")]
    Network(#[error(not(source))] String),
    /// The store asked us to slow down.
    #[display("throttled: {_0}")]
    Throttled(#[error(not(source))] String),
    /// The store took too long to answer.
    #[display("request timed out")]
    Timeout,
    /// Key contains invalid characters or escapes root
    #[display("invalid key: {_0}")]
    InvalidKey(#[error(not(source))] String),
    /// The store's root is relative, or is not a directory.
    #[display("invalid store root: {}", _0.display())]
    InvalidRoot(#[error(not(source))] PathBuf),
    /// Backend-specific error
    #[display("backend error: {_0}")]
    BackendError(#[error(not(source))] String),
}
impl From<IoError> for ErrorKind {
    fn from(err: IoError) -> Self {
        Self::Io(err)
    }
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Network(_) | Self::Throttled(_) | Self::Timeout | Self::BackendError(_))
    }

    /// Returns `true` if no further request to this store can succeed with
    /// the current credentials.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Unauthenticated(_) | Self::PermissionDenied(_))
    }
}
