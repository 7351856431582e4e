//! Engine Error Types
//!
//! Per-file failures never surface here: they are recorded on the file's
//! progress record. Only what stops a whole run does.

use derive_more::{Display, Error};

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Credentials were rejected by a collaborator; nothing else can succeed.
    #[display("fatal: {_0}")]
    Fatal(#[error(not(source))] String),
    /// The source folder could not be listed.
    #[display("could not list source folder: {_0}")]
    Listing(#[error(not(source))] String),
    /// Progress could not be persisted.
    #[display("could not save progress")]
    Progress,
    #[display("invalid rate limit: {_0}")]
    RateLimit(#[error(not(source))] String),
    /// A file id was dispatched that the progress store does not track.
    #[display("untracked file: {_0}")]
    UntrackedFile(#[error(not(source))] String),
}

impl ErrorKind {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Listing(_) | Self::Progress)
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }
}
