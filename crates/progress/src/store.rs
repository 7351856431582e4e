use crate::error::{ErrorKind, Result};
use crate::model::{FileRecord, FileStatus, MigrationRun, run_id};
use exn::ResultExt;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Directory of JSON snapshots, one `progress_{run_id}.json` per run.
#[derive(Debug, Clone)]
pub struct ProgressStore {
    directory: PathBuf,
}

impl ProgressStore {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self { directory: directory.into() }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Snapshot file for a folder.
    pub fn path_for(&self, folder_id: &str) -> PathBuf {
        self.directory.join(format!("progress_{}.json", run_id(folder_id)))
    }

    /// Load the run for a folder, if one has been saved.
    ///
    /// # Errors
    ///
    /// [`ErrorKind::Corrupt`] when the snapshot exists but cannot be parsed,
    /// [`ErrorKind::ForeignRun`] when it was saved for another folder.
    pub async fn load(&self, folder_id: &str) -> Result<Option<MigrationRun>> {
        let path = self.path_for(folder_id);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => exn::bail!(ErrorKind::Io(err)),
        };
        let run: MigrationRun =
            serde_json::from_slice(&bytes).or_raise(|| ErrorKind::Corrupt(path.display().to_string()))?;
        if run.folder_id != folder_id {
            exn::bail!(ErrorKind::ForeignRun {
                path: path.display().to_string(),
                expected: folder_id.to_string(),
                found: run.folder_id,
            });
        }
        tracing::debug!(path = %path.display(), files = run.files.len(), "loaded progress");
        Ok(Some(run))
    }

    /// Load the run for a folder, or start a new one.
    pub async fn load_or_new(&self, folder_id: &str) -> Result<MigrationRun> {
        Ok(self.load(folder_id).await?.unwrap_or_else(|| MigrationRun::new(folder_id)))
    }

    /// Load the run for a folder, failing when none has been saved.
    pub async fn load_existing(&self, folder_id: &str) -> Result<MigrationRun> {
        match self.load(folder_id).await? {
            Some(run) => Ok(run),
            None => exn::bail!(ErrorKind::RunNotFound(folder_id.to_string())),
        }
    }

    /// Replace the snapshot of a run.
    ///
    /// The snapshot is written to a temporary file in the same directory and
    /// renamed over the previous one, so readers only ever see a complete
    /// snapshot.
    pub async fn save(&self, run: &MigrationRun) -> Result<()> {
        let json = serde_json::to_vec_pretty(run).or_raise(|| ErrorKind::Serialize)?;
        let directory = self.directory.clone();
        let path = self.path_for(&run.folder_id);
        tokio::task::spawn_blocking(move || write_atomic(&directory, &path, &json))
            .await
            .map_err(|e| ErrorKind::Io(std::io::Error::other(e)))??;
        tracing::trace!(run = %run.run_id, files = run.files.len(), "saved progress");
        Ok(())
    }
}

fn write_atomic(directory: &Path, path: &Path, contents: &[u8]) -> Result<()> {
    std::fs::create_dir_all(directory).map_err(ErrorKind::Io)?;
    let mut temp = tempfile::NamedTempFile::new_in(directory).map_err(ErrorKind::Io)?;
    temp.write_all(contents).map_err(ErrorKind::Io)?;
    temp.as_file().sync_all().map_err(ErrorKind::Io)?;
    temp.persist(path).map_err(|e| ErrorKind::Io(e.error))?;
    Ok(())
}

/// Write every record of a run in `status` to `path` as a JSON object of
/// file id to record. Returns how many records were written.
pub async fn export(run: &MigrationRun, status: FileStatus, path: impl AsRef<Path>) -> Result<usize> {
    let selected: BTreeMap<&String, &FileRecord> = run.files_with_status(status).collect();
    let json = serde_json::to_vec_pretty(&selected).or_raise(|| ErrorKind::Serialize)?;
    fs::write(path.as_ref(), json).await.map_err(ErrorKind::Io)?;
    Ok(selected.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_with_files() -> MigrationRun {
        let mut run = MigrationRun::new("folder-1");
        let mut completed = FileRecord::new("6000-6001.jpg", "6000-6001.jpg");
        completed.identifiers = vec![6000, 6001];
        completed.resolved_targets.insert(6000, "ghi-789".into());
        completed.object_url = Some("mock://media/ghi-789/6000-6001.jpg".into());
        completed.created_records.insert(6000, "r1".into());
        completed.transition(FileStatus::Completed);
        run.files.insert("f1".into(), completed);
        let mut orphan = FileRecord::new("6602a.jpg", "6602a.jpg");
        orphan.transition(FileStatus::Orphan);
        run.files.insert("f2".into(), orphan);
        run.files.insert("f3".into(), FileRecord::new("7000.png", "7000.png"));
        run.total_files = 3;
        run.recompute_summary();
        run
    }

    #[tokio::test]
    async fn test_load_missing_run() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = ProgressStore::new(temp_dir.path());
        assert!(store.load("folder-1").await.unwrap().is_none());
        let err = store.load_existing("folder-1").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::RunNotFound(_)));
        assert_eq!(store.load_or_new("folder-1").await.unwrap().folder_id, "folder-1");
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = ProgressStore::new(temp_dir.path().join("nested"));
        let run = run_with_files();
        store.save(&run).await.unwrap();
        assert!(temp_dir.path().join("nested/progress_folder-1.json").is_file());
        let loaded = store.load("folder-1").await.unwrap().unwrap();
        assert_eq!(loaded.files, run.files);
        assert_eq!(loaded.summary.completed, 1);
        assert_eq!(loaded.summary.total, 3);
        // Only the snapshot remains; the temporary file was renamed over it.
        assert_eq!(std::fs::read_dir(temp_dir.path().join("nested")).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_snapshot_field_names() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = ProgressStore::new(temp_dir.path());
        store.save(&run_with_files()).await.unwrap();
        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(store.path_for("folder-1")).unwrap()).unwrap();
        assert_eq!(raw["files"]["f1"]["status"], "completed");
        assert_eq!(raw["files"]["f1"]["created_record_ids"]["6000"], "r1");
        assert_eq!(raw["files"]["f2"]["status"], "orphan");
    }

    #[tokio::test]
    async fn test_corrupt_snapshot() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = ProgressStore::new(temp_dir.path());
        std::fs::write(store.path_for("folder-1"), b"{\"run_id\": ").unwrap();
        let err = store.load("folder-1").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Corrupt(_)));
        let err = store.load_or_new("folder-1").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Corrupt(_)));
    }

    #[tokio::test]
    async fn test_similar_folders_keep_separate_runs() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = ProgressStore::new(temp_dir.path());
        let mut nested = MigrationRun::new("photos/2024");
        nested.files.insert("a".into(), FileRecord::new("1.jpg", "1.jpg"));
        store.save(&nested).await.unwrap();

        assert_ne!(store.path_for("photos/2024"), store.path_for("photos_2024"));
        assert!(store.load("photos_2024").await.unwrap().is_none());
        let flat = store.load_or_new("photos_2024").await.unwrap();
        assert!(flat.files.is_empty());
        store.save(&flat).await.unwrap();
        assert_eq!(store.load_existing("photos/2024").await.unwrap().files.len(), 1);
    }

    #[tokio::test]
    async fn test_snapshot_of_another_folder_is_rejected() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = ProgressStore::new(temp_dir.path());
        let other = serde_json::to_vec(&MigrationRun::new("photos/2024")).unwrap();
        std::fs::write(store.path_for("photos_2024"), other).unwrap();
        let err = store.load("photos_2024").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::ForeignRun { found, .. } if found == "photos/2024"));
    }

    #[tokio::test]
    async fn test_export_by_status() {
        let temp_dir = tempfile::tempdir().unwrap();
        let run = run_with_files();
        let path = temp_dir.path().join("orphans.json");
        assert_eq!(export(&run, FileStatus::Orphan, &path).await.unwrap(), 1);
        let exported: BTreeMap<String, FileRecord> = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(exported.keys().collect::<Vec<_>>(), vec!["f2"]);
        assert_eq!(export(&run, FileStatus::Partial, &path).await.unwrap(), 0);
    }
}
