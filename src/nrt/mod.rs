//! NRT Module
//!
//! Short-horizon tier: one file per record on local disk, written by
//! ingestion processes and read here.
//!
//! ## Responsibilities
//! - Path convention shared by writers and readers
//! - Periodic scan of which identities are present
//! - Cached per-identity record listings (refreshed by generation)
//! - Cached record bytes, fetched single-flight per path

mod cache;
pub mod layout;

use std::path::PathBuf;

use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::identity::RecordKey;

pub use cache::{NrtCache, NrtListingKey};
pub use layout::{parse_record_name, record_path, write_record};

/// One record file found in an identity's directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NrtEntry {
    pub path: PathBuf,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// A record ready to serve
#[derive(Debug, Clone)]
pub struct NrtRecord {
    pub key: RecordKey,
    pub end: DateTime<Utc>,
    pub data: Bytes,
}
