//! Source client trait and implementations.
//!
//! The source is where the files being migrated live. It is the slow,
//! quota-limited side of a migration: the engine gates every call made
//! through this trait behind its rate limiter.

mod local;
#[cfg(feature = "mock")]
mod mock;

pub use self::local::LocalSource;
#[cfg(feature = "mock")]
pub use self::mock::MockSource;
use crate::error::Result;
use async_trait::async_trait;
use futures::{Stream, TryStreamExt};
use std::pin::Pin;

pub type SourceFileStream<'a> = Pin<Box<dyn Stream<Item = Result<SourceFile>> + Send + 'a>>;

/// A file as listed by the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Opaque, source-assigned and unique within a folder listing.
    pub id: String,
    /// Filename including its extension.
    pub name: String,
    /// Location of the file inside the listed folder, for display only.
    pub path: String,
    pub size: u64,
}

/// Unified interface for file sources.
///
/// # Examples
///
/// ```
/// use futures::TryStreamExt;
/// # use ferry_remote::{SourceClient, error::Result};
/// # async fn example(source: &dyn SourceClient) -> Result<()> {
/// let mut listing = source.list_stream("photos");
/// while let Some(file) = listing.try_next().await? {
///     let bytes = source.download(&file.id).await?;
///     println!("{}: {} bytes", file.name, bytes.len());
/// }
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait SourceClient: Send + Sync {
    /// Name of the configured source (used for logging only).
    fn name(&self) -> &str;

    /// List every file below a folder, recursively.
    ///
    /// Default implementation of this method is to collect all the results
    /// from [`list_stream()`](Self::list_stream) into a [`Vec`] before
    /// returning.
    async fn list(&self, folder: &str) -> Result<Vec<SourceFile>> {
        self.list_stream(folder).try_collect().await
    }

    /// Stream every file below a folder, recursively, as it is discovered.
    ///
    /// Asking for a folder that does not exist yields an empty stream.
    fn list_stream<'a>(&'a self, folder: &'a str) -> SourceFileStream<'a>;

    /// Download the full content of a file.
    async fn download(&self, file_id: &str) -> Result<Vec<u8>>;
}
