//! Clients for the two remote collaborators of a migration.
//!
//! - [`source`]: where files come from. Listing and downloading are the
//!   rate-limited calls.
//! - [`records`]: the service that resolves identifiers to target records
//!   and stores the linking records pointing at uploaded media.
//!
//! Both surface failures through the same [`error::ErrorKind`], which keeps
//! transient, permanent and fatal failures distinguishable.

pub mod error;
pub mod records;
pub mod source;

pub use crate::records::RecordService;
pub use crate::source::{SourceClient, SourceFile};
use std::sync::Arc;

pub type SourceHandle = Arc<dyn SourceClient + Send + Sync>;
pub type RecordsHandle = Arc<dyn RecordService + Send + Sync>;
