#![allow(dead_code)]

use ferry_engine::error::Result;
use ferry_engine::{Engine, MigrationEvent, Options, RateLimiter, RetryPolicy};
use ferry_progress::{FileRecord, MigrationRun, ProgressTracker};
use ferry_remote::records::MockRecords;
use ferry_remote::source::MockSource;
use ferry_storage::backend::MockStore;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;

pub const FOLDER: &str = "folder";

pub fn options() -> Options {
    Options {
        concurrency: 4,
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        },
        metadata_timeout: Duration::from_secs(5),
        transfer_timeout: Duration::from_secs(5),
        ..Options::default()
    }
}

pub struct Harness {
    pub source: Arc<MockSource>,
    pub store: Arc<MockStore>,
    pub records: Arc<MockRecords>,
}

impl Harness {
    pub fn new(source: MockSource, records: MockRecords) -> Self {
        Self { source: Arc::new(source), store: Arc::new(MockStore::default()), records: Arc::new(records) }
    }

    pub fn with_store(mut self, store: MockStore) -> Self {
        self.store = Arc::new(store);
        self
    }

    pub fn engine(&self, options: Options) -> Engine {
        let limiter = RateLimiter::new(1000.0, 100).unwrap();
        Engine::new(self.source.clone(), self.store.clone(), self.records.clone(), limiter, options)
    }
}

pub fn id(filename: &str) -> String {
    format!("{FOLDER}/{filename}")
}

pub fn tracker() -> ProgressTracker {
    ProgressTracker::ephemeral(MigrationRun::new(FOLDER))
}

pub async fn collect(stream: impl futures::Stream<Item = Result<MigrationEvent>>) -> Vec<Result<MigrationEvent>> {
    stream.collect().await
}

/// Every event, panicking on errors.
pub async fn events(stream: impl futures::Stream<Item = Result<MigrationEvent>>) -> Vec<MigrationEvent> {
    collect(stream).await.into_iter().map(|event| event.unwrap()).collect()
}

/// Processed records, in completion order.
pub fn processed(events: &[MigrationEvent]) -> Vec<(String, FileRecord)> {
    events
        .iter()
        .filter_map(|event| match event {
            MigrationEvent::Processed { file_id, record } => Some((file_id.clone(), record.clone())),
            _ => None,
        })
        .collect()
}
