use derive_more::{Display, Error};

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("could not load configuration")]
    Config,
    #[display("{_0} is not configured")]
    Missing(#[error(not(source))] &'static str),
    #[display("built without support for {_0}")]
    Unsupported(#[error(not(source))] &'static str),
    #[display("could not set up the {_0}")]
    Setup(#[error(not(source))] &'static str),
    #[display("could not read or write migration progress")]
    Progress,
    #[display("migration stopped")]
    Migration,
}
