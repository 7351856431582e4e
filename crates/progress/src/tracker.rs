use crate::error::Result;
use crate::model::{FileRecord, FileStatus, MigrationRun, Summary};
use crate::store::ProgressStore;
use time::OffsetDateTime;
use tokio::sync::Mutex;

struct Working {
    run: MigrationRun,
    /// Terminal upserts since the last snapshot.
    unsaved: usize,
}

/// The in-memory working copy of a [`MigrationRun`].
///
/// This is the single access point through which concurrent workers read and
/// update file records. Every upsert is visible to readers as soon as it
/// returns; full snapshots go to the [`ProgressStore`] every `save_interval`
/// terminal upserts, and whenever [`save()`](Self::save) is called.
///
/// Without a store (dry runs) nothing is ever persisted.
pub struct ProgressTracker {
    store: Option<ProgressStore>,
    working: Mutex<Working>,
    /// Serialises snapshot writes so an older snapshot can never land on top
    /// of a newer one.
    save_lock: Mutex<()>,
    save_interval: usize,
}

impl ProgressTracker {
    pub fn new(store: ProgressStore, run: MigrationRun, save_interval: usize) -> Self {
        Self::build(Some(store), run, save_interval)
    }

    /// A tracker that never writes to disk.
    pub fn ephemeral(run: MigrationRun) -> Self {
        Self::build(None, run, usize::MAX)
    }

    fn build(store: Option<ProgressStore>, run: MigrationRun, save_interval: usize) -> Self {
        Self {
            store,
            working: Mutex::new(Working { run, unsaved: 0 }),
            save_lock: Mutex::new(()),
            save_interval: save_interval.max(1),
        }
    }

    pub fn is_persistent(&self) -> bool {
        self.store.is_some()
    }

    pub async fn get(&self, file_id: &str) -> Option<FileRecord> {
        self.working.lock().await.run.files.get(file_id).cloned()
    }

    /// Insert a record only if the file is not tracked yet. Returns whether
    /// it was inserted.
    pub async fn register(&self, file_id: &str, record: FileRecord) -> bool {
        let mut working = self.working.lock().await;
        if working.run.files.contains_key(file_id) {
            return false;
        }
        working.run.files.insert(file_id.to_string(), record);
        true
    }

    /// Replace the record of a file.
    ///
    /// Terminal and failed records count towards the next periodic snapshot,
    /// which is written before this returns when it is due.
    pub async fn upsert(&self, file_id: &str, record: FileRecord) -> Result<()> {
        let due = {
            let mut working = self.working.lock().await;
            let counts = record.is_terminal() || record.status == FileStatus::Failed;
            working.run.files.insert(file_id.to_string(), record);
            working.run.updated_at = OffsetDateTime::now_utc();
            if counts {
                working.unsaved += 1;
            }
            working.unsaved >= self.save_interval
        };
        if due {
            self.save().await?;
        }
        Ok(())
    }

    pub async fn set_total_files(&self, total: usize) {
        self.working.lock().await.run.total_files = total;
    }

    /// Write a full snapshot of the run.
    pub async fn save(&self) -> Result<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        let _guard = self.save_lock.lock().await;
        let snapshot = {
            let mut working = self.working.lock().await;
            working.unsaved = 0;
            working.run.recompute_summary();
            working.run.clone()
        };
        store.save(&snapshot).await
    }

    pub async fn summary(&self) -> Summary {
        Summary::from_records(self.working.lock().await.run.files.values())
    }

    /// Ids of every file a resumed run should process.
    pub async fn resumable_ids(&self) -> Vec<String> {
        self.working.lock().await.run.resumable_ids()
    }

    pub async fn files_with_status(&self, status: FileStatus) -> Vec<(String, FileRecord)> {
        let working = self.working.lock().await;
        working.run.files_with_status(status).map(|(id, record)| (id.clone(), record.clone())).collect()
    }

    /// A copy of the current run, summary included.
    pub async fn snapshot(&self) -> MigrationRun {
        let mut run = self.working.lock().await.run.clone();
        run.recompute_summary();
        run
    }
}
