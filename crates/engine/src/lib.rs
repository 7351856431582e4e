//! Migration orchestration.
//!
//! An [`Engine`] drives every file of a source folder through
//! classification, identifier lookup, download, upload and linking-record
//! creation, under bounded concurrency. Per-file progress lives in a
//! [`ProgressTracker`](ferry_progress::ProgressTracker) so an interrupted run
//! can be resumed without redoing finished work.
//!
//! - [`Engine::scan()`] registers the files of a folder without processing
//!   them.
//! - [`Engine::migrate()`] scans, then processes every file not finished yet.
//! - [`Engine::resume()`] processes every unfinished file of a saved run,
//!   without listing the source again.

pub mod error;
pub mod limiter;
mod pipeline;
pub mod retry;
mod stream;

pub use crate::limiter::RateLimiter;
pub use crate::retry::RetryPolicy;
pub use crate::stream::{MigrationEvent, ScanReport};
use ferry_remote::{RecordsHandle, SourceHandle};
use ferry_storage::StoreHandle;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct Options {
    /// Files processed at the same time.
    pub concurrency: usize,
    pub retry: RetryPolicy,
    /// Budget for each lookup, record creation or existence check.
    pub metadata_timeout: Duration,
    /// Budget for each listing, download or upload.
    pub transfer_timeout: Duration,
    /// Classify and look identifiers up, but never download, upload or
    /// create anything.
    pub dry_run: bool,
    /// Treat files whose records already exist as completed.
    pub skip_existing: bool,
    /// Visibility flag given to created linking records.
    pub public: bool,
}
impl Default for Options {
    fn default() -> Self {
        Self {
            concurrency: 10,
            retry: RetryPolicy::default(),
            metadata_timeout: Duration::from_secs(30),
            transfer_timeout: Duration::from_secs(300),
            dry_run: false,
            skip_existing: false,
            public: false,
        }
    }
}

pub struct Engine {
    source: SourceHandle,
    store: StoreHandle,
    records: RecordsHandle,
    limiter: RateLimiter,
    options: Options,
    cancel: CancellationToken,
}

impl Engine {
    pub fn new(
        source: SourceHandle,
        store: StoreHandle,
        records: RecordsHandle,
        limiter: RateLimiter,
        options: Options,
    ) -> Self {
        Self { source, store, records, limiter, options, cancel: CancellationToken::new() }
    }

    /// Use an externally owned cancellation token, such as one cancelled on
    /// Ctrl-C.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Cancelling this token stops new files from being started.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn options(&self) -> &Options {
        &self.options
    }
}
