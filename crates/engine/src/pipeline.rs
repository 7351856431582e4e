//! The per-file pipeline.
//!
//! Steps run strictly in order for one file: classify, resolve identifiers,
//! download, upload, create linking records. Each collaborator call retries
//! transient failures against the file's attempt budget; the record is
//! upserted after every step so a resumed run picks up where this one left
//! off.

use crate::Engine;
use crate::error::{ErrorKind, Result};
use crate::retry::{Classify, Outcome, Step};
use exn::ResultExt;
use ferry_mapper::{classify, storage_key};
use ferry_progress::{FileRecord, FileStatus, ProgressTracker};
use std::future::Future;
use std::time::Duration;
use tracing::instrument;

const NO_RECORDS_CREATED: &str = "Failed to create any linking records";
const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Why a collaborator call stopped being retried.
pub(crate) enum Interrupt {
    /// Permanent failure of this request only.
    GiveUp(String),
    /// Transient failures used up the attempt budget.
    Exhausted(String),
    /// Credentials were rejected.
    Fatal(String),
    /// The run was cancelled while waiting to retry.
    Cancelled(String),
}

/// How a collaborator call is made.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Call {
    action: &'static str,
    timeout: Duration,
    /// Wait for a rate limiter token before every attempt.
    rate_limited: bool,
}
impl Call {
    /// A call to the rate-limited source.
    pub(crate) fn source(action: &'static str, timeout: Duration) -> Self {
        Self { action, timeout, rate_limited: true }
    }

    /// A call to the object store or the record service.
    pub(crate) fn service(action: &'static str, timeout: Duration) -> Self {
        Self { action, timeout, rate_limited: false }
    }
}

impl Engine {
    /// Make a call until it succeeds, fails permanently, or the attempt
    /// budget runs out. Only transient failures (timeouts included) consume
    /// attempts.
    pub(crate) async fn retrying<T, K, F, Fut>(
        &self,
        attempts: &mut u32,
        call: Call,
        mut operation: F,
    ) -> std::result::Result<T, Interrupt>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, exn::Exn<K>>>,
        K: Classify + std::error::Error + Send + Sync + 'static,
    {
        loop {
            if call.rate_limited {
                self.limiter.acquire().await;
            }
            let (outcome, message, retry_after) = match tokio::time::timeout(call.timeout, operation()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(err)) => {
                    let kind: &K = &err;
                    (kind.outcome(), format!("{} failed: {kind}", call.action), kind.retry_after())
                },
                Err(_) => {
                    let message = format!("{} timed out after {:?}", call.action, call.timeout);
                    (Outcome::Transient, message, None)
                },
            };
            if outcome == Outcome::Transient {
                *attempts += 1;
            }
            match self.options.retry.next_step(*attempts, outcome) {
                Step::Abort => return Err(Interrupt::Fatal(message)),
                Step::GiveUp => return Err(Interrupt::GiveUp(message)),
                Step::Exhausted => return Err(Interrupt::Exhausted(message)),
                Step::Retry => {
                    let delay = self.options.retry.delay(*attempts, retry_after);
                    tracing::warn!(attempt = *attempts, ?delay, "{message}, retrying");
                    tokio::select! {
                        () = tokio::time::sleep(delay) => {},
                        () = self.cancel.cancelled() => return Err(Interrupt::Cancelled(message)),
                    }
                },
            }
        }
    }

    /// Run one file through the pipeline and return its final record.
    ///
    /// Failures of the file itself are recorded on it; an error is only
    /// returned when the whole run has to stop.
    #[instrument(level = "debug", skip(self, tracker), fields(filename = tracing::field::Empty))]
    pub(crate) async fn process_file(&self, file_id: &str, tracker: &ProgressTracker) -> Result<FileRecord> {
        let mut record = tracker
            .get(file_id)
            .await
            .ok_or_else(|| exn::Exn::from(ErrorKind::UntrackedFile(file_id.to_string())))?;
        tracing::Span::current().record("filename", record.filename.as_str());
        // Every dispatch gets a fresh budget.
        record.attempts = 0;

        if self.options.skip_existing && !self.options.dry_run && record.is_fully_linked() {
            tracing::debug!("every identifier is already linked");
            record.transition(FileStatus::Completed);
            return self.finish(tracker, file_id, record).await;
        }

        let classification = classify(&record.filename);
        record.identifiers = classification.identifiers.clone();
        let Some(media_type) = classification.media_type().filter(|_| classification.is_valid()) else {
            record.transition(FileStatus::NeedsReview);
            record.error = classification.error.clone();
            return self.finish(tracker, file_id, record).await;
        };

        // Identifier resolution.
        for &identifier in &classification.identifiers {
            if record.resolved_targets.contains_key(&identifier) {
                continue;
            }
            let call = Call::service("lookup", self.options.metadata_timeout);
            let lookup =
                self.retrying(&mut record.attempts, call, move || self.records.find_by_identifier(identifier)).await;
            match lookup {
                Ok(Some(target)) => {
                    tracing::debug!(identifier, target = %target, "identifier resolved");
                    record.resolved_targets.insert(identifier, target);
                },
                Ok(None) => tracing::debug!(identifier, "identifier not found"),
                Err(Interrupt::GiveUp(message)) => tracing::debug!(identifier, "{message}"),
                Err(interrupt) => return self.interrupted(tracker, file_id, record, interrupt).await,
            }
        }
        let unresolved: Vec<u64> =
            record.identifiers.iter().filter(|id| !record.resolved_targets.contains_key(*id)).copied().collect();
        let first_target = record.identifiers.iter().find_map(|id| record.resolved_targets.get(id)).cloned();
        let Some(first_target) = first_target else {
            record.transition(FileStatus::Orphan);
            record.error = Some(format!("No target found for identifiers: {}", join(&unresolved)));
            return self.finish(tracker, file_id, record).await;
        };

        if self.options.dry_run {
            record.touch();
            return self.finish(tracker, file_id, record).await;
        }

        let key = storage_key(&first_target, &record.filename);
        if self.options.skip_existing
            && let Some(done) = self.skip_if_linked(tracker, file_id, &mut record, &key).await?
        {
            return Ok(done);
        }

        // Transfer, at most once per file.
        let object_url = match record.object_url.clone() {
            Some(url) => url,
            None => {
                let call = Call::source("download", self.options.transfer_timeout);
                let download = self
                    .retrying(&mut record.attempts, call, move || self.source.download(file_id))
                    .await;
                let data = match download {
                    Ok(data) => data,
                    Err(interrupt) => return self.interrupted(tracker, file_id, record, interrupt).await,
                };
                record.transition(FileStatus::Downloaded);
                self.persist(tracker, file_id, &record).await?;

                let content_type = classification.content_type().unwrap_or(FALLBACK_CONTENT_TYPE);
                let (key, data) = (key.as_str(), data.as_slice());
                let call = Call::service("upload", self.options.transfer_timeout);
                let upload =
                    self.retrying(&mut record.attempts, call, move || self.store.put(key, data, content_type)).await;
                let url = match upload {
                    Ok(url) => url,
                    Err(interrupt) => return self.interrupted(tracker, file_id, record, interrupt).await,
                };
                tracing::debug!(key, url = %url, "object uploaded");
                record.object_url = Some(url.clone());
                record.transition(FileStatus::Uploaded);
                self.persist(tracker, file_id, &record).await?;
                url
            },
        };

        // One linking record per resolved identifier.
        let pending: Vec<(u64, String)> = record
            .identifiers
            .iter()
            .filter(|id| !record.created_records.contains_key(*id))
            .filter_map(|id| record.resolved_targets.get(id).map(|target| (*id, target.clone())))
            .collect();
        let mut unlinked = Vec::new();
        for (identifier, target) in pending {
            let (target, url, public) = (target.as_str(), object_url.as_str(), self.options.public);
            let call = Call::service("create record", self.options.metadata_timeout);
            let created = self
                .retrying(&mut record.attempts, call, move || self.records.create(target, url, media_type, public))
                .await;
            match created {
                Ok(record_id) => {
                    tracing::debug!(identifier, record_id = %record_id, "linking record created");
                    record.created_records.insert(identifier, record_id);
                    self.persist(tracker, file_id, &record).await?;
                },
                Err(Interrupt::GiveUp(message)) => {
                    tracing::warn!(identifier, "{message}");
                    unlinked.push(identifier);
                },
                Err(interrupt) => return self.interrupted(tracker, file_id, record, interrupt).await,
            }
        }

        let fully_linked = record.resolved_targets.keys().all(|id| record.created_records.contains_key(id));
        if record.created_records.is_empty() {
            record.fail(NO_RECORDS_CREATED, true);
        } else if unresolved.is_empty() && fully_linked {
            record.transition(FileStatus::Completed);
        } else {
            record.transition(FileStatus::Partial);
            record.error = Some(describe_partial(&unresolved, &unlinked));
        }
        self.finish(tracker, file_id, record).await
    }

    /// With skip-existing, a file whose object is already referenced by a
    /// linking record is completed without any transfer. Check failures that
    /// are not fatal fall through to normal processing.
    async fn skip_if_linked(
        &self,
        tracker: &ProgressTracker,
        file_id: &str,
        record: &mut FileRecord,
        key: &str,
    ) -> Result<Option<FileRecord>> {
        let expected = match &record.object_url {
            Some(url) => url.clone(),
            None => match self.store.url(key) {
                Ok(url) => url,
                Err(err) => {
                    tracing::debug!(key, "cannot compute object url: {}", &*err);
                    return Ok(None);
                },
            },
        };
        let check = tokio::time::timeout(self.options.metadata_timeout, self.records.exists_by_url(&expected)).await;
        match check {
            Ok(Ok(true)) => {
                tracing::debug!(url = %expected, "object already linked");
                record.object_url = Some(expected);
                record.transition(FileStatus::Completed);
                Ok(Some(self.finish(tracker, file_id, record.clone()).await?))
            },
            Ok(Ok(false)) => Ok(None),
            Ok(Err(err)) if err.outcome() == Outcome::Fatal => {
                let interrupt = Interrupt::Fatal(format!("existence check failed: {}", &*err));
                Ok(Some(self.interrupted(tracker, file_id, record.clone(), interrupt).await?))
            },
            Ok(Err(err)) => {
                tracing::debug!("existence check failed, processing normally: {}", &*err);
                Ok(None)
            },
            Err(_) => {
                tracing::debug!("existence check timed out, processing normally");
                Ok(None)
            },
        }
    }

    async fn persist(&self, tracker: &ProgressTracker, file_id: &str, record: &FileRecord) -> Result<()> {
        tracker.upsert(file_id, record.clone()).await.or_raise(|| ErrorKind::Progress)
    }

    /// Record the final state of a file.
    async fn finish(&self, tracker: &ProgressTracker, file_id: &str, record: FileRecord) -> Result<FileRecord> {
        self.persist(tracker, file_id, &record).await?;
        tracing::info!(status = %record.status, attempts = record.attempts, error = ?record.error, "file processed");
        Ok(record)
    }

    /// Record why a file stopped early. Fatal interrupts stop the run.
    async fn interrupted(
        &self,
        tracker: &ProgressTracker,
        file_id: &str,
        mut record: FileRecord,
        interrupt: Interrupt,
    ) -> Result<FileRecord> {
        let fatal = match interrupt {
            // A download or upload that can never succeed needs a human.
            Interrupt::GiveUp(message) => {
                record.transition(FileStatus::NeedsReview);
                record.error = Some(message);
                None
            },
            Interrupt::Exhausted(message) => {
                record.fail(message, true);
                None
            },
            Interrupt::Cancelled(message) => {
                record.fail(format!("Interrupted: {message}"), false);
                None
            },
            Interrupt::Fatal(message) => {
                record.fail(message.clone(), false);
                Some(message)
            },
        };
        let record = self.finish(tracker, file_id, record).await?;
        match fatal {
            Some(message) => {
                tracing::error!(file_id, "{message}");
                exn::bail!(ErrorKind::Fatal(message))
            },
            None => Ok(record),
        }
    }
}

fn join(identifiers: &[u64]) -> String {
    identifiers.iter().map(u64::to_string).collect::<Vec<_>>().join(", ")
}

fn describe_partial(unresolved: &[u64], unlinked: &[u64]) -> String {
    let mut parts = Vec::new();
    if !unresolved.is_empty() {
        parts.push(format!("No target found for identifiers: {}", join(unresolved)));
    }
    if !unlinked.is_empty() {
        parts.push(format!("Failed to link identifiers: {}", join(unlinked)));
    }
    parts.join("; ")
}
