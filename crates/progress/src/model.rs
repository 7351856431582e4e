use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter, Result as FmtResult};
use time::OffsetDateTime;

/// Where a file is in the migration pipeline.
///
/// ```text
/// pending ──> needs_review                          (filename not classifiable)
/// pending ──> orphan                                (no identifier resolves)
/// pending ──> downloaded ──> uploaded ──> completed (every identifier linked)
///                                     └─> partial   (some identifiers linked)
/// any non-terminal ──> failed                       (retryable unless exhausted)
/// ```
///
/// `downloaded` and `uploaded` only exist so a resumed run can skip network
/// work already done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Pending,
    Downloaded,
    Uploaded,
    Completed,
    Failed,
    Orphan,
    NeedsReview,
    Partial,
}
impl FileStatus {
    pub const ALL: [FileStatus; 8] = [
        Self::Pending,
        Self::Downloaded,
        Self::Uploaded,
        Self::Completed,
        Self::Failed,
        Self::Orphan,
        Self::NeedsReview,
        Self::Partial,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Downloaded => "downloaded",
            Self::Uploaded => "uploaded",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Orphan => "orphan",
            Self::NeedsReview => "needs_review",
            Self::Partial => "partial",
        }
    }

    /// Parse the snake case name used in snapshots and on the command line.
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == value)
    }

    /// Statuses a worker never moves a file out of. `failed` is only
    /// terminal once its retries are exhausted, see [`FileRecord::is_terminal()`].
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Orphan | Self::NeedsReview | Self::Partial)
    }
}
impl Display for FileStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

/// Progress of a single source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub filename: String,
    #[serde(default)]
    pub path: String,
    pub status: FileStatus,
    /// Identifiers parsed from the filename, ascending.
    #[serde(default)]
    pub identifiers: Vec<u64>,
    /// identifier -> target record id, for identifiers that resolved.
    #[serde(default)]
    pub resolved_targets: BTreeMap<u64, String>,
    /// Set once, when the object has been uploaded.
    pub object_url: Option<String>,
    /// identifier -> linking record id, for records already created.
    #[serde(default, rename = "created_record_ids")]
    pub created_records: BTreeMap<u64, String>,
    pub error: Option<String>,
    #[serde(default)]
    pub attempts: u32,
    /// Retries ran out; the file is not picked up again by resume.
    #[serde(default)]
    pub exhausted: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}
impl FileRecord {
    pub fn new(filename: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            path: path.into(),
            status: FileStatus::Pending,
            identifiers: Vec::new(),
            resolved_targets: BTreeMap::new(),
            object_url: None,
            created_records: BTreeMap::new(),
            error: None,
            attempts: 0,
            exhausted: false,
            updated_at: OffsetDateTime::now_utc(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal() || (self.status == FileStatus::Failed && self.exhausted)
    }

    /// Whether a resumed run should process this file again.
    pub fn is_resumable(&self) -> bool {
        match self.status {
            FileStatus::Pending | FileStatus::Downloaded | FileStatus::Uploaded => true,
            FileStatus::Failed => !self.exhausted,
            _ => false,
        }
    }

    /// Every parsed identifier already has a linking record.
    pub fn is_fully_linked(&self) -> bool {
        !self.identifiers.is_empty() && self.identifiers.iter().all(|id| self.created_records.contains_key(id))
    }

    /// Move to a new status. A status that is not `failed` clears the error
    /// left behind by an earlier attempt.
    pub fn transition(&mut self, status: FileStatus) {
        if status != FileStatus::Failed {
            self.error = None;
            self.exhausted = false;
        }
        self.status = status;
        self.touch();
    }

    /// Mark the file as failed with a message.
    pub fn fail(&mut self, error: impl Into<String>, exhausted: bool) {
        self.status = FileStatus::Failed;
        self.error = Some(error.into());
        self.exhausted = exhausted;
        self.touch();
    }

    pub fn touch(&mut self) {
        self.updated_at = OffsetDateTime::now_utc();
    }
}

/// Number of files per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub pending: usize,
    pub downloaded: usize,
    pub uploaded: usize,
    pub completed: usize,
    pub failed: usize,
    pub orphan: usize,
    pub needs_review: usize,
    pub partial: usize,
    pub total: usize,
}
impl Summary {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a FileRecord>) -> Self {
        let mut summary = Self::default();
        for record in records {
            *summary.count_mut(record.status) += 1;
            summary.total += 1;
        }
        summary
    }

    pub fn count(&self, status: FileStatus) -> usize {
        match status {
            FileStatus::Pending => self.pending,
            FileStatus::Downloaded => self.downloaded,
            FileStatus::Uploaded => self.uploaded,
            FileStatus::Completed => self.completed,
            FileStatus::Failed => self.failed,
            FileStatus::Orphan => self.orphan,
            FileStatus::NeedsReview => self.needs_review,
            FileStatus::Partial => self.partial,
        }
    }

    fn count_mut(&mut self, status: FileStatus) -> &mut usize {
        match status {
            FileStatus::Pending => &mut self.pending,
            FileStatus::Downloaded => &mut self.downloaded,
            FileStatus::Uploaded => &mut self.uploaded,
            FileStatus::Completed => &mut self.completed,
            FileStatus::Failed => &mut self.failed,
            FileStatus::Orphan => &mut self.orphan,
            FileStatus::NeedsReview => &mut self.needs_review,
            FileStatus::Partial => &mut self.partial,
        }
    }
}

/// One migration attempt over a source folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationRun {
    pub run_id: String,
    pub folder_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    pub total_files: usize,
    pub summary: Summary,
    /// file id -> record
    pub files: BTreeMap<String, FileRecord>,
}
impl MigrationRun {
    pub fn new(folder_id: impl Into<String>) -> Self {
        let folder_id = folder_id.into();
        let now = OffsetDateTime::now_utc();
        Self {
            run_id: run_id(&folder_id),
            folder_id,
            started_at: now,
            updated_at: now,
            total_files: 0,
            summary: Summary::default(),
            files: BTreeMap::new(),
        }
    }

    pub fn recompute_summary(&mut self) {
        self.summary = Summary::from_records(self.files.values());
    }

    /// Ids of every file a resumed run should process, in file id order.
    pub fn resumable_ids(&self) -> Vec<String> {
        self.files.iter().filter(|(_, record)| record.is_resumable()).map(|(id, _)| id.clone()).collect()
    }

    pub fn files_with_status(&self, status: FileStatus) -> impl Iterator<Item = (&String, &FileRecord)> {
        self.files.iter().filter(move |(_, record)| record.status == status)
    }
}

/// Filesystem-safe key for a folder id.
///
/// Ids that had to be rewritten get a short hash of the raw id appended, so
/// `photos/2024` and `photos_2024` never share a snapshot.
pub(crate) fn run_id(folder_id: &str) -> String {
    let sanitized: String = folder_id
        .trim_matches('/')
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '_' })
        .collect();
    let sanitized = match sanitized.trim_matches('.').is_empty() {
        true => "root".to_string(),
        false => sanitized,
    };
    match sanitized == folder_id {
        true => sanitized,
        false => {
            let hash = blake3::hash(folder_id.as_bytes()).to_hex();
            format!("{sanitized}-{}", &hash[..RUN_ID_HASH_LEN])
        },
    }
}

const RUN_ID_HASH_LEN: usize = 8;

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn record(status: FileStatus, exhausted: bool) -> FileRecord {
        let mut record = FileRecord::new("6602.jpg", "6602.jpg");
        record.status = status;
        record.exhausted = exhausted;
        record
    }

    #[rstest]
    #[case(FileStatus::Pending, false, true)]
    #[case(FileStatus::Downloaded, false, true)]
    #[case(FileStatus::Uploaded, false, true)]
    #[case(FileStatus::Failed, false, true)]
    #[case(FileStatus::Failed, true, false)]
    #[case(FileStatus::Completed, false, false)]
    #[case(FileStatus::Orphan, false, false)]
    #[case(FileStatus::NeedsReview, false, false)]
    #[case(FileStatus::Partial, false, false)]
    fn test_resumable(#[case] status: FileStatus, #[case] exhausted: bool, #[case] expected: bool) {
        let record = record(status, exhausted);
        assert_eq!(record.is_resumable(), expected);
        assert_eq!(record.is_terminal(), !expected);
    }

    #[test]
    fn test_transition_clears_error() {
        let mut record = FileRecord::new("6602.jpg", "6602.jpg");
        record.fail("timed out", false);
        assert_eq!(record.error.as_deref(), Some("timed out"));
        record.transition(FileStatus::Downloaded);
        assert_eq!(record.error, None);
        assert_eq!(record.status, FileStatus::Downloaded);
    }

    #[test]
    fn test_fully_linked() {
        let mut record = FileRecord::new("6000-6001.jpg", "6000-6001.jpg");
        assert!(!record.is_fully_linked());
        record.identifiers = vec![6000, 6001];
        record.created_records.insert(6000, "r1".into());
        assert!(!record.is_fully_linked());
        record.created_records.insert(6001, "r2".into());
        assert!(record.is_fully_linked());
    }

    #[test]
    fn test_status_names_round_trip() {
        for status in FileStatus::ALL {
            assert_eq!(FileStatus::parse(status.as_str()), Some(status));
            assert_eq!(serde_json::to_string(&status).unwrap(), format!("\"{status}\""));
        }
        assert_eq!(FileStatus::parse("done"), None);
    }

    #[test]
    fn test_summary() {
        let records = [
            record(FileStatus::Completed, false),
            record(FileStatus::Completed, false),
            record(FileStatus::Orphan, false),
            record(FileStatus::Failed, true),
        ];
        let summary = Summary::from_records(&records);
        assert_eq!(summary.completed, 2);
        assert_eq!(summary.count(FileStatus::Orphan), 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.total, 4);
    }

    #[rstest]
    #[case("1AbC-folder", "1AbC-folder")]
    #[case("photos_2024", "photos_2024")]
    #[case("root", "root")]
    fn test_run_id_keeps_safe_names(#[case] folder: &str, #[case] expected: &str) {
        assert_eq!(run_id(folder), expected);
    }

    #[rstest]
    #[case("photos/2024", "photos_2024-")]
    #[case("/", "root-")]
    #[case("", "root-")]
    #[case("..", "root-")]
    fn test_run_id_rewritten_names_are_hashed(#[case] folder: &str, #[case] prefix: &str) {
        let id = run_id(folder);
        assert!(id.starts_with(prefix), "{id}");
        assert_eq!(id.len(), prefix.len() + RUN_ID_HASH_LEN);
    }

    #[test]
    fn test_run_id_is_distinct_per_folder() {
        let folders = ["photos/2024", "photos_2024", "photos 2024", "/photos/2024", "", "/", "root"];
        let ids: std::collections::HashSet<String> = folders.iter().map(|folder| run_id(folder)).collect();
        assert_eq!(ids.len(), folders.len());
    }
}
