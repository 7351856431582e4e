//! Local filesystem object store.
//!
//! This module provides an object store implementation for the local filesystem.
//! Objects are stored in a configured directory and accessed using standard
//! filesystem operations via `tokio::fs` for async I/O. Objects are written to
//! a temporary file and renamed into place, so a key never holds a partial
//! object.

use crate::error::ErrorKind;
use crate::{ObjectStore, error::Result, path::validate as validate_key};
use async_trait::async_trait;
use std::fs::create_dir_all as sync_create_dir;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Local filesystem object store.
///
/// Stores objects in a directory on the local filesystem. All keys are
/// relative to the configured root directory.
///
/// # Examples
///
/// ```no_run
/// use ferry_storage::backend::LocalStore;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = LocalStore::new("local", "/srv/media", Some("https://media.example.org".to_string()))?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct LocalStore {
    name: String,
    /// Root directory for stored objects
    root: PathBuf,
    /// Base URL objects are served from; `file://` URLs are used without one.
    public_url: Option<String>,
}
impl LocalStore {
    /// Create a new local filesystem store.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is not absolute, or exists and is not a
    /// directory.
    pub fn new(name: impl Into<String>, root: impl AsRef<Path>, public_url: Option<String>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_absolute() {
            exn::bail!(ErrorKind::InvalidRoot(root));
        }
        if root.exists() {
            if !root.is_dir() {
                exn::bail!(ErrorKind::InvalidRoot(root));
            }
        } else {
            // Use non-async here; it'll only happen once on initialization
            // and it's not worth the hassle of making the constructor async.
            sync_create_dir(&root).map_err(|e| Self::map_io_error(e, &root.display().to_string()))?;
        }
        Ok(Self { name: name.into(), root, public_url })
    }

    /// Get the absolute path for a key.
    fn absolute_path(&self, key: &str) -> Result<PathBuf> {
        Ok(self.root.join(validate_key(key)?))
    }

    fn map_io_error(e: std::io::Error, key: &str) -> ErrorKind {
        match e.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound(key.to_string()),
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied(key.to_string()),
            std::io::ErrorKind::TimedOut => ErrorKind::Timeout,
            _ => ErrorKind::Io(e),
        }
    }
}

/// Write to a temporary file beside `path`, then rename it into place.
fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let directory = path.parent().ok_or_else(|| std::io::Error::from(std::io::ErrorKind::InvalidInput))?;
    std::fs::create_dir_all(directory)?;
    let mut temp = tempfile::NamedTempFile::new_in(directory)?;
    temp.write_all(data)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[async_trait]
impl ObjectStore for LocalStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn url(&self, key: &str) -> Result<String> {
        let key = validate_key(key)?;
        Ok(match &self.public_url {
            Some(base) => format!("{}/{}", base.trim_end_matches('/'), key),
            None => format!("file://{}", self.root.join(key).display()),
        })
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let abs_path = self.absolute_path(key)?;
        Ok(fs::try_exists(&abs_path).await.map_err(|e| Self::map_io_error(e, key))?)
    }

    async fn put(&self, key: &str, data: &[u8], _content_type: &str) -> Result<String> {
        let abs_path = self.absolute_path(key)?;
        // Parent directories are created as needed, to keep behaviour
        // consistent with S3-compatible storage.
        let data_len = data.len();
        let data = data.to_vec();
        tokio::task::spawn_blocking(move || write_atomic(&abs_path, &data))
            .await
            .unwrap_or_else(|e| Err(std::io::Error::other(e)))
            .map_err(|e| Self::map_io_error(e, key))?;
        tracing::debug!(store = %self.name, key, size = data_len, "stored object");
        self.url(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_requires_absolute_path() {
        let temp_dir = tempfile::tempdir().unwrap();
        assert!(LocalStore::new("name", temp_dir.path(), None).is_ok());
        let err = LocalStore::new("name", "relative/path", None).err().unwrap();
        assert!(matches!(&*err, ErrorKind::InvalidRoot(root) if root == Path::new("relative/path")));
        assert!(LocalStore::new("name", "./relative", None).is_err());
    }

    #[test]
    fn test_new_rejects_file_root() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file = temp_dir.path().join("not-a-directory");
        std::fs::write(&file, b"x").unwrap();
        let err = LocalStore::new("name", &file, None).err().unwrap();
        assert!(matches!(&*err, ErrorKind::InvalidRoot(_)));
    }

    #[test]
    fn test_absolute_path() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new("name", temp_dir.path(), None).unwrap();
        let expected = temp_dir.path().join("media/abc/6602.jpg");
        assert_eq!(store.absolute_path("media/abc/6602.jpg").unwrap(), expected);
        // Traversal is prevented
        assert!(store.absolute_path("../etc/passwd").is_err());
    }

    #[test]
    fn test_url_with_public_base() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new("name", temp_dir.path(), Some("https://cdn.example.org/".to_string())).unwrap();
        assert_eq!(store.url("media/abc/6602.jpg").unwrap(), "https://cdn.example.org/media/abc/6602.jpg");
    }

    #[test]
    fn test_url_without_public_base() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new("name", temp_dir.path(), None).unwrap();
        let url = store.url("media/abc/6602.jpg").unwrap();
        assert!(url.starts_with("file://"));
        assert!(url.ends_with("media/abc/6602.jpg"));
    }

    #[tokio::test]
    async fn test_put_creates_directories() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new("name", temp_dir.path(), None).unwrap();
        assert!(!store.exists("media/abc/6602.jpg").await.unwrap());
        let url = store.put("media/abc/6602.jpg", b"jpeg bytes", "image/jpeg").await.unwrap();
        assert!(store.exists("media/abc/6602.jpg").await.unwrap());
        assert_eq!(url, store.url("media/abc/6602.jpg").unwrap());
        let written = std::fs::read(temp_dir.path().join("media/abc/6602.jpg")).unwrap();
        assert_eq!(written, b"jpeg bytes");
    }

    #[tokio::test]
    async fn test_put_replaces_object_without_leftovers() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new("name", temp_dir.path(), None).unwrap();
        store.put("media/abc/6602.jpg", b"first version", "image/jpeg").await.unwrap();
        store.put("media/abc/6602.jpg", b"second", "image/jpeg").await.unwrap();
        assert_eq!(std::fs::read(temp_dir.path().join("media/abc/6602.jpg")).unwrap(), b"second");
        let entries: Vec<_> = std::fs::read_dir(temp_dir.path().join("media/abc")).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn test_put_rejects_traversal() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new("name", temp_dir.path(), None).unwrap();
        let err = store.put("../escape.jpg", b"bad", "image/jpeg").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidKey(_)));
    }
}
