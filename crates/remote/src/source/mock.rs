//! In-memory file source for testing.

use crate::error::{ErrorKind, Result};
use crate::source::{SourceClient, SourceFile, SourceFileStream};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;

type FailureFactory = fn() -> ErrorKind;

#[derive(Default)]
struct State {
    /// folder -> file id -> (file, content)
    folders: BTreeMap<String, BTreeMap<String, (SourceFile, Vec<u8>)>>,
    listings: usize,
    downloads: HashMap<String, usize>,
    scripted: HashMap<String, VecDeque<ErrorKind>>,
    always: HashMap<String, FailureFactory>,
    list_failure: Option<FailureFactory>,
}

/// In-memory file source for testing.
///
/// Files are registered per folder, and every download is counted per file
/// id (failed ones included) so tests can assert exactly how much traffic
/// reached the source.
///
/// # Examples
///
/// ```
/// use ferry_remote::{SourceClient, source::MockSource};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let source = MockSource::default().with_file("folder", "6602.jpg", b"jpeg");
/// let files = source.list("folder").await?;
/// assert_eq!(source.download(&files[0].id).await?, b"jpeg");
/// assert_eq!(source.download_count(&files[0].id), 1);
/// # Ok(())
/// # }
/// ```
pub struct MockSource {
    name: String,
    state: Mutex<State>,
}

impl MockSource {
    /// Change the name of the mock source.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Register a file; its id is `{folder}/{filename}`.
    pub fn with_file(self, folder: &str, filename: &str, content: &[u8]) -> Self {
        let id = format!("{folder}/{filename}");
        let file = SourceFile {
            id: id.clone(),
            name: filename.to_string(),
            path: filename.to_string(),
            size: content.len() as u64,
        };
        self.lock().folders.entry(folder.to_string()).or_default().insert(id, (file, content.to_vec()));
        self
    }

    /// Fail the next downloads of a file with these errors, in order.
    pub fn fail_next_downloads(self, file_id: &str, errors: impl IntoIterator<Item = ErrorKind>) -> Self {
        self.lock().scripted.entry(file_id.to_string()).or_default().extend(errors);
        self
    }

    /// Fail every download of a file (after any scripted failures).
    pub fn fail_all_downloads(self, file_id: &str, error: FailureFactory) -> Self {
        self.lock().always.insert(file_id.to_string(), error);
        self
    }

    /// Fail every listing.
    pub fn fail_listing(self, error: FailureFactory) -> Self {
        self.lock().list_failure = Some(error);
        self
    }

    /// Number of `download()` calls made for a file, successful or not.
    pub fn download_count(&self, file_id: &str) -> usize {
        self.lock().downloads.get(file_id).copied().unwrap_or_default()
    }

    /// Number of `download()` calls made for any file.
    pub fn total_downloads(&self) -> usize {
        self.lock().downloads.values().sum()
    }

    /// Number of listings started.
    pub fn list_count(&self) -> usize {
        self.lock().listings
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        // A poisoned lock means a test already panicked.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
impl Default for MockSource {
    fn default() -> Self {
        Self { name: "mock".to_string(), state: Mutex::new(State::default()) }
    }
}

#[async_trait]
impl SourceClient for MockSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_stream<'a>(&'a self, folder: &'a str) -> SourceFileStream<'a> {
        let items: Vec<Result<SourceFile>> = {
            let mut state = self.lock();
            state.listings += 1;
            match state.list_failure {
                Some(error) => vec![Err(exn::Exn::from(error()))],
                None => state
                    .folders
                    .get(folder)
                    .map(|files| files.values().map(|(file, _)| Ok(file.clone())).collect())
                    .unwrap_or_default(),
            }
        };
        Box::pin(futures::stream::iter(items))
    }

    async fn download(&self, file_id: &str) -> Result<Vec<u8>> {
        let mut state = self.lock();
        *state.downloads.entry(file_id.to_string()).or_default() += 1;
        if let Some(error) = state.scripted.get_mut(file_id).and_then(VecDeque::pop_front) {
            exn::bail!(error);
        }
        if let Some(error) = state.always.get(file_id) {
            exn::bail!(error());
        }
        let content = state.folders.values().find_map(|files| files.get(file_id)).map(|(_, content)| content.clone());
        match content {
            Some(content) => Ok(content),
            None => exn::bail!(ErrorKind::NotFound(file_id.to_string())),
        }
    }
}
