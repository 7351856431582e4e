//! Durable progress for migration runs.
//!
//! A [`MigrationRun`] holds one [`FileRecord`] per source file. The
//! [`ProgressStore`] persists whole runs as JSON snapshots, replacing them
//! atomically; the [`ProgressTracker`] is the in-memory working copy that
//! concurrent workers upsert into while a run is in progress.

pub mod error;
mod model;
mod store;
mod tracker;

pub use crate::model::{FileRecord, FileStatus, MigrationRun, Summary};
pub use crate::store::{ProgressStore, export};
pub use crate::tracker::ProgressTracker;
