use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Where files are migrated from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Directory served by the local source client.
    pub root: Option<PathBuf>,
    /// Sustained rate of source calls (listing, downloads).
    pub requests_per_second: f64,
    /// Calls allowed back to back before the sustained rate applies.
    pub burst: u32,
}
impl Default for SourceConfig {
    fn default() -> Self {
        Self { root: None, requests_per_second: 10.0, burst: 10 }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Local,
    S3,
}

/// Where objects are uploaded to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    pub backend: Backend,
    /// Local backend: directory objects are written to.
    pub root: Option<PathBuf>,
    pub bucket: Option<String>,
    pub prefix: Option<String>,
    pub region: Option<String>,
    pub endpoint: Option<String>,
    pub key_id: Option<String>,
    pub key_secret: Option<String>,
    /// Base URL objects are served from.
    pub public_url: Option<String>,
}

/// The service resolving identifiers and holding linking records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordsConfig {
    /// Directory of the local record service (`targets.json`, `records.json`).
    pub root: Option<PathBuf>,
}

/// Worker pool, retry and timeout tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    pub concurrency: usize,
    /// Attempts per file before it is marked as exhausted.
    pub retry_attempts: u32,
    /// Base delay of the exponential backoff.
    #[serde(with = "crate::seconds")]
    pub retry_delay: Duration,
    #[serde(with = "crate::seconds")]
    pub max_retry_delay: Duration,
    /// Budget for lookups and record creation.
    #[serde(with = "crate::seconds")]
    pub metadata_timeout: Duration,
    /// Budget for downloads and uploads.
    #[serde(with = "crate::seconds")]
    pub transfer_timeout: Duration,
    /// Write a progress snapshot every this many finished files.
    pub save_interval: usize,
    /// Visibility of created linking records.
    pub default_media_public: bool,
}
impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            concurrency: 10,
            retry_attempts: 3,
            retry_delay: Duration::from_secs(5),
            max_retry_delay: Duration::from_secs(60),
            metadata_timeout: Duration::from_secs(30),
            transfer_timeout: Duration::from_secs(300),
            save_interval: 10,
            default_media_public: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressConfig {
    /// Directory of `progress_{folder}.json` snapshots. Defaults to the
    /// platform data directory.
    pub directory: Option<PathBuf>,
}
