use derive_more::{Display, Error};
use std::path::PathBuf;

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("configuration file not found: {}", _0.display())]
    NotFound(#[error(not(source))] PathBuf),
    #[display("unsupported configuration file format: {}", _0.display())]
    UnsupportedFormat(#[error(not(source))] PathBuf),
    #[display("could not load configuration")]
    Load,
    #[display("invalid configuration: {_0}")]
    Invalid(#[error(not(source))] String),
    #[display("could not determine a home directory for default paths")]
    NoHomeDirectory,
}

impl ErrorKind {
    pub fn is_retryable(&self) -> bool {
        false
    }
}
