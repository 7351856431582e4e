//! Local filesystem file source.
//!
//! Serves a directory tree as if it were a remote drive. The file id of each
//! file is its `/`-separated path relative to the configured root, so ids
//! stay stable between runs and can be downloaded without a prior listing.

use crate::error::{ErrorKind, Result};
use crate::source::{SourceClient, SourceFile, SourceFileStream};
use async_stream::stream;
use async_trait::async_trait;
use exn::ResultExt;
use ferry_storage::validate_key;
use std::path::{Path, PathBuf};
use tokio::fs::{self, DirEntry};

enum WalkEntry {
    File(SourceFile),
    Descend(PathBuf),
    Skip,
}

/// Local filesystem file source.
///
/// # Examples
///
/// ```no_run
/// use ferry_remote::source::LocalSource;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let source = LocalSource::new("drive", "/mnt/drive-export")?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct LocalSource {
    name: String,
    root: PathBuf,
}
impl LocalSource {
    /// Create a new local source.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is not absolute or is not a directory.
    pub fn new(name: impl Into<String>, root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_absolute() || !root.is_dir() {
            exn::bail!(ErrorKind::NotFound(root.display().to_string()));
        }
        Ok(Self { name: name.into(), root })
    }

    /// Directory a folder id refers to. Empty, `.` and `/` mean the root.
    fn folder_path(&self, folder: &str) -> Result<PathBuf> {
        let trimmed = folder.trim_matches('/');
        if trimmed.is_empty() || trimmed == "." {
            return Ok(self.root.clone());
        }
        let key = validate_key(trimmed).or_raise(|| ErrorKind::Rejected(format!("invalid folder `{folder}`")))?;
        Ok(self.root.join(key))
    }

    /// Convert an absolute path back into a file id.
    fn file_id(&self, absolute: &Path) -> Result<String> {
        let relative = absolute.strip_prefix(&self.root).or_raise(|| {
            ErrorKind::InvalidData(format!("path `{}` is not within root `{}`", absolute.display(), self.root.display()))
        })?;
        let relative = relative
            .to_str()
            .ok_or_else(|| exn::Exn::from(ErrorKind::InvalidData(format!("non UTF-8 path `{}`", relative.display()))))?;
        validate_key(relative).or_raise(|| ErrorKind::InvalidData(relative.to_string()))
    }

    fn map_io_error(e: std::io::Error, path: &Path) -> ErrorKind {
        match e.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound(path.display().to_string()),
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied(path.display().to_string()),
            std::io::ErrorKind::TimedOut => ErrorKind::Timeout,
            _ => ErrorKind::Io(e),
        }
    }

    async fn process_entry(&self, entry: DirEntry, folder: &Path) -> Result<WalkEntry> {
        let path = entry.path();
        let metadata = entry.metadata().await.map_err(|e| Self::map_io_error(e, &path))?;
        if metadata.is_dir() {
            return Ok(WalkEntry::Descend(path));
        }
        if !metadata.is_file() {
            // Most likely a broken symlink.
            return Ok(WalkEntry::Skip);
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
            return Ok(WalkEntry::Skip);
        };
        let display = path.strip_prefix(folder).unwrap_or(&path).display().to_string();
        Ok(WalkEntry::File(SourceFile { id: self.file_id(&path)?, name, path: display, size: metadata.len() }))
    }
}

#[async_trait]
impl SourceClient for LocalSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_stream<'a>(&'a self, folder: &'a str) -> SourceFileStream<'a> {
        let start = match self.folder_path(folder) {
            Ok(start) => start,
            Err(e) => return Box::pin(futures::stream::once(async { Result::Err(e) })),
        };
        let mut stack = vec![start.clone()];

        Box::pin(stream! {
            'dirs: while let Some(current) = stack.pop() {
                let mut entries = match fs::read_dir(&current).await {
                    Ok(entries) => entries,
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                    Err(err) => {
                        yield Err(exn::Exn::from(Self::map_io_error(err, &current)));
                        continue 'dirs;
                    }
                };
                'entries: loop {
                    let entry = match entries.next_entry().await {
                        Ok(Some(entry)) => entry,
                        Ok(None) => break 'entries,
                        Err(e) => { yield Err(exn::Exn::from(Self::map_io_error(e, &current))); continue 'entries; },
                    };
                    match self.process_entry(entry, &start).await {
                        Ok(WalkEntry::File(f)) => yield Ok(f),
                        Ok(WalkEntry::Descend(d)) => stack.push(d),
                        Ok(WalkEntry::Skip) => {},
                        Err(e) => yield Err(e),
                    };
                }
            }
        })
    }

    async fn download(&self, file_id: &str) -> Result<Vec<u8>> {
        let key = validate_key(file_id).or_raise(|| ErrorKind::Rejected(format!("invalid file id `{file_id}`")))?;
        let path = self.root.join(key);
        let data = fs::read(&path).await.map_err(|e| Self::map_io_error(e, &path))?;
        tracing::trace!(source = %self.name, file_id, size = data.len(), "downloaded file");
        Ok(data)
    }
}
