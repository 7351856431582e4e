//! Object store trait and implementations.
//!
//! This module defines the `ObjectStore` trait, the narrow interface the
//! migration needs from wherever media ends up (local filesystem,
//! S3-compatible services, etc.): put an object once, find out whether it
//! is already there, and know the URL it is (or would be) served from.

mod local;
#[cfg(feature = "mock")]
mod mock;
#[cfg(feature = "s3")]
mod s3;

pub use self::local::LocalStore;
#[cfg(feature = "mock")]
pub use self::mock::MockStore;
#[cfg(feature = "s3")]
pub use self::s3::S3Store;
use crate::error::Result;
use async_trait::async_trait;

/// Unified interface for object stores.
///
/// # Key Handling
/// All keys are relative to the store root and must be validated using
/// [`validate_key`](crate::validate_key) before use. Implementations should
/// enforce this validation.
///
/// # Examples
///
/// ```
/// use ferry_storage::{backend::ObjectStore, error::Result};
///
/// async fn upload_once(store: &dyn ObjectStore, key: &str, data: &[u8]) -> Result<String> {
///     if store.exists(key).await? {
///         return store.url(key);
///     }
///     store.put(key, data, "image/jpeg").await
/// }
/// ```
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Name of the configured store (used for logging only).
    fn name(&self) -> &str;

    /// The public URL an object stored under `key` is served from.
    ///
    /// Pure computation; does not check that the object exists.
    fn url(&self, key: &str) -> Result<String>;

    /// Check if an object exists.
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Store an object, overwriting any existing object under the same key,
    /// and return its URL.
    ///
    /// # Notes
    /// - Implementations should create intermediate "directories" as needed.
    async fn put(&self, key: &str, data: &[u8], content_type: &str) -> Result<String>;
}
