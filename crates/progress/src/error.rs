use derive_more::{Display, Error};
use std::io::Error as IoError;

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("I/O error: {_0}")]
    Io(IoError),
    /// The snapshot exists but cannot be read back; it is never overwritten.
    #[display("progress file is corrupt: {_0}")]
    Corrupt(#[error(not(source))] String),
    /// The snapshot on disk was saved for a different folder.
    #[display("progress file {path} belongs to folder {found:?}, not {expected:?}")]
    ForeignRun { path: String, expected: String, found: String },
    #[display("could not serialize progress")]
    Serialize,
    #[display("no migration run found for folder: {_0}")]
    RunNotFound(#[error(not(source))] String),
}
impl From<IoError> for ErrorKind {
    fn from(err: IoError) -> Self {
        Self::Io(err)
    }
}

impl ErrorKind {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}
