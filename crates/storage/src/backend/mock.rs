//! In-memory object store for testing.

use crate::error::{ErrorKind, Result};
use crate::path::validate as validate_key;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use crate::ObjectStore;

type FailureFactory = fn() -> ErrorKind;

#[derive(Default)]
struct State {
    objects: HashMap<String, (String, Vec<u8>)>,
    puts: Vec<String>,
    scripted: VecDeque<ErrorKind>,
    always: Option<FailureFactory>,
}

/// In-memory object store for testing.
///
/// Objects are stored in a `HashMap` behind a [`Mutex`], so all trait methods
/// can operate on `&self` without external synchronisation. Every call to
/// [`put()`](ObjectStore::put) is recorded, including failed ones, so tests
/// can assert exactly how many uploads were attempted.
///
/// # Examples
///
/// ```
/// use ferry_storage::backend::{MockStore, ObjectStore};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let store = MockStore::default();
/// let url = store.put("media/abc/1.jpg", b"...", "image/jpeg").await?;
/// assert_eq!(url, "mock://media/abc/1.jpg");
/// assert_eq!(store.put_count(), 1);
/// # Ok(())
/// # }
/// ```
pub struct MockStore {
    name: String,
    state: Mutex<State>,
}

impl MockStore {
    /// Change the name of the mock store.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Fail the next `put()` calls with these errors, in order.
    pub fn fail_next_puts(self, errors: impl IntoIterator<Item = ErrorKind>) -> Self {
        self.lock().scripted.extend(errors);
        self
    }

    /// Fail every `put()` (after any scripted failures) with a fresh error.
    pub fn fail_all_puts(self, error: FailureFactory) -> Self {
        self.lock().always = Some(error);
        self
    }

    /// Number of `put()` calls made so far, successful or not.
    pub fn put_count(&self) -> usize {
        self.lock().puts.len()
    }

    /// Keys passed to `put()`, in call order.
    pub fn put_keys(&self) -> Vec<String> {
        self.lock().puts.clone()
    }

    /// Content and content type of a stored object.
    pub fn object(&self, key: &str) -> Option<(String, Vec<u8>)> {
        self.lock().objects.get(key).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        // A poisoned lock means a test already panicked.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
impl Default for MockStore {
    fn default() -> Self {
        Self { name: "mock".to_string(), state: Mutex::new(State::default()) }
    }
}

#[async_trait]
impl ObjectStore for MockStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn url(&self, key: &str) -> Result<String> {
        Ok(format!("mock://{}", validate_key(key)?))
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let key = validate_key(key)?;
        Ok(self.lock().objects.contains_key(&key))
    }

    async fn put(&self, key: &str, data: &[u8], content_type: &str) -> Result<String> {
        let key = validate_key(key)?;
        {
            let mut state = self.lock();
            state.puts.push(key.clone());
            if let Some(error) = state.scripted.pop_front() {
                exn::bail!(error);
            }
            if let Some(error) = state.always {
                exn::bail!(error());
            }
            state.objects.insert(key.clone(), (content_type.to_string(), data.to_vec()));
        }
        self.url(&key)
    }
}
