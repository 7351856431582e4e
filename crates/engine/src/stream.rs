use crate::Engine;
use crate::error::{ErrorKind, Result};
use crate::pipeline::{Call, Interrupt};
use async_stream::stream;
use exn::ResultExt;
use ferry_mapper::{Pattern, classify};
use ferry_progress::{FileRecord, FileStatus, ProgressTracker, Summary};
use ferry_remote::SourceFile;
use futures::stream::FuturesUnordered;
use futures::{Stream, StreamExt};
use std::collections::VecDeque;
use tracing::instrument;

/// What a scan found in a source folder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Files listed.
    pub total: usize,
    /// Files tracked for the first time.
    pub new: usize,
    pub single: usize,
    pub multiple: usize,
    pub range: usize,
    pub invalid: usize,
}
impl ScanReport {
    fn count(&mut self, pattern: Pattern) {
        match pattern {
            Pattern::Single => self.single += 1,
            Pattern::Multiple => self.multiple += 1,
            Pattern::Range => self.range += 1,
            Pattern::Invalid => self.invalid += 1,
        }
        self.total += 1;
    }
}

/// Progress events emitted by [`Engine::migrate()`] and [`Engine::resume()`].
///
/// Events follow a strict ordering:
/// 1. [`Started`](Self::Started): exactly once.
/// 2. [`Scanned`](Self::Scanned): once, for migrations only.
/// 3. [`DiscoveryComplete`](Self::DiscoveryComplete): exactly once, with the
///    number of files about to be processed.
/// 4. [`Processed`](Self::Processed): zero or more times, one per file.
/// 5. [`Complete`](Self::Complete) or [`Interrupted`](Self::Interrupted):
///    exactly once, signalling the stream is finished.
///
/// A fatal error terminates the stream with an `Err` instead of step 5, once
/// files already being processed have finished.
#[derive(Debug, Clone)]
pub enum MigrationEvent {
    Started,
    Scanned(ScanReport),
    DiscoveryComplete(u64),
    Processed { file_id: String, record: FileRecord },
    /// Every file was processed.
    Complete(Summary),
    /// The run was cancelled before every file was processed.
    Interrupted(Summary),
}

impl Engine {
    /// Register every file of a folder that is not tracked yet.
    ///
    /// New files start as `pending`, or `needs_review` when their name
    /// cannot be classified. Files already tracked are left untouched.
    #[instrument(skip(self, tracker))]
    pub async fn scan(&self, folder: &str, tracker: &ProgressTracker) -> Result<ScanReport> {
        let files = self.list(folder).await?;
        let mut report = ScanReport::default();
        for file in &files {
            let classification = classify(&file.name);
            report.count(classification.pattern);
            let mut record = FileRecord::new(&file.name, &file.path);
            record.identifiers = classification.identifiers.clone();
            if !classification.is_valid() {
                record.status = FileStatus::NeedsReview;
                record.error = classification.error.clone();
            }
            if tracker.register(&file.id, record).await {
                report.new += 1;
            }
        }
        tracker.set_total_files(files.len()).await;
        tracker.save().await.or_raise(|| ErrorKind::Progress)?;
        tracing::info!(
            total = report.total,
            new = report.new,
            single = report.single,
            multiple = report.multiple,
            range = report.range,
            invalid = report.invalid,
            "scan complete"
        );
        Ok(report)
    }

    /// List a folder, retrying the whole listing on transient failures.
    async fn list(&self, folder: &str) -> Result<Vec<SourceFile>> {
        let mut attempts = 0;
        let call = Call::source("list", self.options.transfer_timeout);
        match self.retrying(&mut attempts, call, move || self.source.list(folder)).await {
            Ok(files) => Ok(files),
            Err(Interrupt::Fatal(message)) => exn::bail!(ErrorKind::Fatal(message)),
            Err(Interrupt::GiveUp(message) | Interrupt::Exhausted(message) | Interrupt::Cancelled(message)) => {
                exn::bail!(ErrorKind::Listing(message))
            },
        }
    }

    /// Scan a folder, then process every file that is not finished yet.
    pub fn migrate<'a>(
        &'a self,
        folder: &'a str,
        tracker: &'a ProgressTracker,
    ) -> impl Stream<Item = Result<MigrationEvent>> + 'a {
        stream!({
            yield Ok(MigrationEvent::Started);
            let report = match self.scan(folder, tracker).await {
                Ok(report) => report,
                Err(e) => {
                    yield Err(e);
                    return;
                },
            };
            yield Ok(MigrationEvent::Scanned(report));
            let ids = tracker.resumable_ids().await;
            for await event in self.process_all(ids, tracker) {
                yield event;
            }
        })
    }

    /// Process every unfinished file of a saved run: `pending`, `downloaded`,
    /// `uploaded`, and `failed` files that still have retries left.
    pub fn resume<'a>(&'a self, tracker: &'a ProgressTracker) -> impl Stream<Item = Result<MigrationEvent>> + 'a {
        stream!({
            yield Ok(MigrationEvent::Started);
            let ids = tracker.resumable_ids().await;
            for await event in self.process_all(ids, tracker) {
                yield event;
            }
        })
    }

    fn process_all<'a>(
        &'a self,
        ids: Vec<String>,
        tracker: &'a ProgressTracker,
    ) -> impl Stream<Item = Result<MigrationEvent>> + 'a {
        stream!({
            // Infallible: a usize (either 32- or 64-bit) will always fit in a u64.
            yield Ok(MigrationEvent::DiscoveryComplete(u64::try_from(ids.len()).unwrap_or(0)));

            let dispatch = move |file_id: String| async move {
                let result = self.process_file(&file_id, tracker).await;
                (file_id, result)
            };
            let mut queue: VecDeque<String> = ids.into();
            let mut processing = FuturesUnordered::new();
            while processing.len() < self.options.concurrency.max(1) && !self.cancel.is_cancelled() {
                match queue.pop_front() {
                    Some(file_id) => processing.push(dispatch(file_id)),
                    None => break,
                }
            }

            let mut fatal = None;
            while let Some((file_id, result)) = processing.next().await {
                match result {
                    Ok(record) => {
                        yield Ok(MigrationEvent::Processed { file_id, record });
                    },
                    Err(err) => {
                        // No new file may start once the run has to stop.
                        self.cancel.cancel();
                        if fatal.is_none() {
                            fatal = Some(err);
                        } else {
                            tracing::error!(file_id = %file_id, "{}", &*err);
                        }
                    },
                }
                if !self.cancel.is_cancelled()
                    && let Some(next) = queue.pop_front()
                {
                    processing.push(dispatch(next));
                }
            }

            let saved = tracker.save().await;
            if let Some(err) = fatal {
                yield Err(err);
                return;
            }
            if let Err(err) = saved {
                let err: Result<MigrationEvent> = Err(err).or_raise(|| ErrorKind::Progress);
                yield err;
                return;
            }
            let summary = tracker.summary().await;
            match self.cancel.is_cancelled() {
                true => {
                    tracing::warn!(remaining = queue.len(), "migration interrupted");
                    yield Ok(MigrationEvent::Interrupted(summary));
                },
                false => {
                    tracing::info!(
                        completed = summary.completed,
                        partial = summary.partial,
                        orphan = summary.orphan,
                        needs_review = summary.needs_review,
                        failed = summary.failed,
                        "migration complete"
                    );
                    yield Ok(MigrationEvent::Complete(summary));
                },
            }
        })
    }
}
