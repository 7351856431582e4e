//! In-memory record service for testing.

use crate::error::{ErrorKind, Result};
use crate::records::{LinkingRecord, RecordService};
use async_trait::async_trait;
use ferry_mapper::MediaType;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

type FailureFactory = fn() -> ErrorKind;

#[derive(Default)]
struct State {
    targets: HashMap<u64, String>,
    records: Vec<LinkingRecord>,
    existing_urls: HashSet<String>,
    lookups: Vec<u64>,
    creations: Vec<String>,
    url_checks: usize,
    lookup_failures: HashMap<u64, VecDeque<ErrorKind>>,
    lookup_always: HashMap<u64, FailureFactory>,
    create_failures: HashMap<String, VecDeque<ErrorKind>>,
    create_always: HashMap<String, FailureFactory>,
    exists_failure: Option<FailureFactory>,
}

/// In-memory record service for testing.
///
/// Every lookup and creation is recorded, failed ones included, so tests can
/// assert exactly which calls reached the service.
///
/// # Examples
///
/// ```
/// use ferry_mapper::MediaType;
/// use ferry_remote::{RecordService, records::MockRecords};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let records = MockRecords::default().with_target(6000, "ghi-789");
/// let target = records.find_by_identifier(6000).await?.unwrap();
/// records.create(&target, "mock://media/ghi-789/6000.jpg", MediaType::Image, false).await?;
/// assert_eq!(records.created().len(), 1);
/// # Ok(())
/// # }
/// ```
pub struct MockRecords {
    name: String,
    state: Mutex<State>,
}

impl MockRecords {
    /// Make an identifier resolve to a target id.
    pub fn with_target(self, identifier: u64, target_id: impl Into<String>) -> Self {
        self.lock().targets.insert(identifier, target_id.into());
        self
    }

    /// Pretend a linking record already references this object URL.
    pub fn with_existing_url(self, object_url: impl Into<String>) -> Self {
        self.lock().existing_urls.insert(object_url.into());
        self
    }

    /// Fail the next lookups of an identifier with these errors, in order.
    pub fn fail_next_lookups(self, identifier: u64, errors: impl IntoIterator<Item = ErrorKind>) -> Self {
        self.lock().lookup_failures.entry(identifier).or_default().extend(errors);
        self
    }

    /// Fail every lookup of an identifier (after any scripted failures).
    pub fn fail_all_lookups(self, identifier: u64, error: FailureFactory) -> Self {
        self.lock().lookup_always.insert(identifier, error);
        self
    }

    /// Fail the next creations for a target with these errors, in order.
    pub fn fail_next_creates(self, target_id: &str, errors: impl IntoIterator<Item = ErrorKind>) -> Self {
        self.lock().create_failures.entry(target_id.to_string()).or_default().extend(errors);
        self
    }

    /// Fail every creation for a target (after any scripted failures).
    pub fn fail_all_creates(self, target_id: &str, error: FailureFactory) -> Self {
        self.lock().create_always.insert(target_id.to_string(), error);
        self
    }

    /// Fail every `exists_by_url()` check.
    pub fn fail_url_checks(self, error: FailureFactory) -> Self {
        self.lock().exists_failure = Some(error);
        self
    }

    /// Identifiers passed to `find_by_identifier()`, in call order.
    pub fn lookups(&self) -> Vec<u64> {
        self.lock().lookups.clone()
    }

    /// Target ids passed to `create()`, in call order, failed calls included.
    pub fn create_calls(&self) -> Vec<String> {
        self.lock().creations.clone()
    }

    /// Linking records successfully created.
    pub fn created(&self) -> Vec<LinkingRecord> {
        self.lock().records.clone()
    }

    /// Number of `exists_by_url()` checks.
    pub fn url_checks(&self) -> usize {
        self.lock().url_checks
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        // A poisoned lock means a test already panicked.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
impl Default for MockRecords {
    fn default() -> Self {
        Self { name: "mock".to_string(), state: Mutex::new(State::default()) }
    }
}

#[async_trait]
impl RecordService for MockRecords {
    fn name(&self) -> &str {
        &self.name
    }

    async fn find_by_identifier(&self, identifier: u64) -> Result<Option<String>> {
        let mut state = self.lock();
        state.lookups.push(identifier);
        if let Some(error) = state.lookup_failures.get_mut(&identifier).and_then(VecDeque::pop_front) {
            exn::bail!(error);
        }
        if let Some(error) = state.lookup_always.get(&identifier) {
            exn::bail!(error());
        }
        Ok(state.targets.get(&identifier).cloned())
    }

    async fn create(&self, target_id: &str, object_url: &str, media_type: MediaType, public: bool) -> Result<String> {
        let mut state = self.lock();
        state.creations.push(target_id.to_string());
        if let Some(error) = state.create_failures.get_mut(target_id).and_then(VecDeque::pop_front) {
            exn::bail!(error);
        }
        if let Some(error) = state.create_always.get(target_id) {
            exn::bail!(error());
        }
        let id = format!("record-{}", state.records.len() + 1);
        state.records.push(LinkingRecord {
            id: id.clone(),
            target_id: target_id.to_string(),
            object_url: object_url.to_string(),
            media_type,
            public,
        });
        state.existing_urls.insert(object_url.to_string());
        Ok(id)
    }

    async fn exists_by_url(&self, object_url: &str) -> Result<bool> {
        let mut state = self.lock();
        state.url_checks += 1;
        if let Some(error) = state.exists_failure {
            exn::bail!(error());
        }
        Ok(state.existing_urls.contains(object_url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lookup_and_create() {
        let records = MockRecords::default().with_target(6000, "ghi-789");
        assert_eq!(records.find_by_identifier(6000).await.unwrap().as_deref(), Some("ghi-789"));
        assert_eq!(records.find_by_identifier(6001).await.unwrap(), None);
        let id = records.create("ghi-789", "mock://a.jpg", MediaType::Image, true).await.unwrap();
        assert_eq!(id, "record-1");
        assert!(records.exists_by_url("mock://a.jpg").await.unwrap());
        assert_eq!(records.lookups(), vec![6000, 6001]);
    }

    #[tokio::test]
    async fn test_scripted_lookup_failure() {
        let records = MockRecords::default().with_target(1, "a").fail_next_lookups(1, [ErrorKind::RateLimited(None)]);
        assert!(records.find_by_identifier(1).await.unwrap_err().is_retryable());
        assert_eq!(records.find_by_identifier(1).await.unwrap().as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn test_always_failing_create() {
        let records = MockRecords::default().fail_all_creates("a", || ErrorKind::Rejected("schema".into()));
        assert!(records.create("a", "mock://x", MediaType::Image, false).await.is_err());
        assert!(records.create("b", "mock://x", MediaType::Image, false).await.is_ok());
        assert_eq!(records.create_calls(), vec!["a", "b"]);
        assert_eq!(records.created().len(), 1);
    }
}
