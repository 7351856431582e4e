//! Record service trait and implementations.
//!
//! The record service owns the target records that identifiers resolve to,
//! and the linking records that attach an uploaded object to a target.

mod local;
#[cfg(feature = "mock")]
mod mock;

pub use self::local::LocalRecords;
#[cfg(feature = "mock")]
pub use self::mock::MockRecords;
use crate::error::Result;
use async_trait::async_trait;
use ferry_mapper::MediaType;

/// A linking record as created by [`RecordService::create()`].
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct LinkingRecord {
    pub id: String,
    pub target_id: String,
    pub object_url: String,
    pub media_type: MediaType,
    pub public: bool,
}

/// Unified interface for record services.
#[async_trait]
pub trait RecordService: Send + Sync {
    /// Name of the configured service (used for logging only).
    fn name(&self) -> &str;

    /// Resolve an identifier to the id of its target record.
    ///
    /// `Ok(None)` means the identifier is simply unknown; errors are reserved
    /// for failures of the lookup itself.
    async fn find_by_identifier(&self, identifier: u64) -> Result<Option<String>>;

    /// Create a linking record pointing at an uploaded object and return
    /// its id.
    async fn create(&self, target_id: &str, object_url: &str, media_type: MediaType, public: bool) -> Result<String>;

    /// Whether a linking record already references this object URL.
    ///
    /// Services that cannot answer this report `false`, which makes
    /// skip-existing checks fall through to normal processing.
    async fn exists_by_url(&self, _object_url: &str) -> Result<bool> {
        Ok(false)
    }
}
