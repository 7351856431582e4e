//! Local JSON-file record service.
//!
//! Two files live in the configured directory:
//!
//! - `targets.json`: a JSON object mapping identifiers to target record ids,
//!   read once on construction.
//! - `records.json`: a JSON array of every [`LinkingRecord`] created so far,
//!   replaced (temporary file, then rename) after each creation.

use crate::error::{ErrorKind, Result};
use crate::records::{LinkingRecord, RecordService};
use async_trait::async_trait;
use exn::ResultExt;
use ferry_mapper::MediaType;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;

const TARGETS_FILE: &str = "targets.json";
const RECORDS_FILE: &str = "records.json";

/// Local JSON-file record service.
///
/// # Examples
///
/// ```no_run
/// use ferry_remote::records::LocalRecords;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let records = LocalRecords::open("records", "/srv/ferry/records").await?;
/// # Ok(())
/// # }
/// ```
pub struct LocalRecords {
    name: String,
    root: PathBuf,
    records_path: PathBuf,
    targets: HashMap<u64, String>,
    records: Mutex<Vec<LinkingRecord>>,
}
impl LocalRecords {
    /// Open the record service stored in `root`.
    ///
    /// A missing `targets.json` means no identifier resolves; a missing
    /// `records.json` means no record has been created yet.
    pub async fn open(name: impl Into<String>, root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let targets: HashMap<u64, String> = read_json(&root.join(TARGETS_FILE)).await?.unwrap_or_default();
        let records_path = root.join(RECORDS_FILE);
        let records: Vec<LinkingRecord> = read_json(&records_path).await?.unwrap_or_default();
        tracing::debug!(targets = targets.len(), records = records.len(), root = %root.display(), "opened local records");
        Ok(Self { name: name.into(), root: root.to_path_buf(), records_path, targets, records: Mutex::new(records) })
    }

    /// Every linking record created so far.
    pub async fn records(&self) -> Vec<LinkingRecord> {
        self.records.lock().await.clone()
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => exn::bail!(ErrorKind::Io(err)),
    };
    let parsed = serde_json::from_slice(&bytes).or_raise(|| ErrorKind::InvalidData(path.display().to_string()))?;
    Ok(Some(parsed))
}

/// Replace `path` without ever exposing a partially written file.
fn write_atomic(directory: &Path, path: &Path, contents: &[u8]) -> std::io::Result<()> {
    std::fs::create_dir_all(directory)?;
    let mut temp = tempfile::NamedTempFile::new_in(directory)?;
    temp.write_all(contents)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Deterministic id so re-creating the same link yields the same id.
fn record_id(target_id: &str, object_url: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(target_id.as_bytes());
    hasher.update(b"\0");
    hasher.update(object_url.as_bytes());
    hasher.finalize().to_hex()[..16].to_string()
}

#[async_trait]
impl RecordService for LocalRecords {
    fn name(&self) -> &str {
        &self.name
    }

    async fn find_by_identifier(&self, identifier: u64) -> Result<Option<String>> {
        Ok(self.targets.get(&identifier).cloned())
    }

    async fn create(&self, target_id: &str, object_url: &str, media_type: MediaType, public: bool) -> Result<String> {
        if !self.targets.values().any(|t| t == target_id) {
            exn::bail!(ErrorKind::Rejected(format!("unknown target `{target_id}`")));
        }
        let id = record_id(target_id, object_url);
        let mut records = self.records.lock().await;
        if records.iter().any(|r| r.id == id) {
            return Ok(id);
        }
        records.push(LinkingRecord {
            id: id.clone(),
            target_id: target_id.to_string(),
            object_url: object_url.to_string(),
            media_type,
            public,
        });
        let json = serde_json::to_vec_pretty(&*records).or_raise(|| ErrorKind::InvalidData("records".to_string()))?;
        let (root, path) = (self.root.clone(), self.records_path.clone());
        let written = tokio::task::spawn_blocking(move || write_atomic(&root, &path, &json))
            .await
            .unwrap_or_else(|e| Err(std::io::Error::other(e)));
        if let Err(err) = written {
            records.pop();
            exn::bail!(ErrorKind::Io(err));
        }
        Ok(id)
    }

    async fn exists_by_url(&self, object_url: &str) -> Result<bool> {
        Ok(self.records.lock().await.iter().any(|r| r.object_url == object_url))
    }
}
