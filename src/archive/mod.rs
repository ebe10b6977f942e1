//! Archive Module
//!
//! Long-horizon tier: immutable per-day files in object storage.
//!
//! ## Responsibilities
//! - Name day files (identity + UTC calendar day)
//! - Define the storage primitives the index cache consumes
//! - Build and cache per-file record indexes
//! - Answer time windows with a minimal record-aligned byte range
//!
//! ## Range Lookup
//! ```text
//! Get(file, start, end)
//!         ↓
//! modified_time(file) ──→ IndexKey(identity, date, mtime)
//!         ↓
//! index cache (single-flight) ──miss──→ fetch_whole + decode every record
//!         ↓
//! first = last entry starting at or before `start`
//! last  = last entry starting at or before `end`
//!         ↓
//! fetch_range([first*512, (last+1)*512)) ──→ writer
//! ```

mod day_index;
mod index;
mod local;

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Datelike, NaiveDate, Utc};

use crate::error::Result;
use crate::identity::StreamIdentity;

pub use day_index::{DayFileIndex, IndexKey, ListingKey};
pub use index::{RecordIndex, RecordIndexEntry};
pub use local::LocalArchive;

/// One stream's records for one UTC calendar day
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DayFile {
    pub identity: StreamIdentity,
    pub date: NaiveDate,
}

impl DayFile {
    pub fn new(identity: StreamIdentity, date: NaiveDate) -> Self {
        Self { identity, date }
    }
}

impl fmt::Display for DayFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{:04}.{:03}",
            self.identity,
            self.date.year(),
            self.date.ordinal()
        )
    }
}

/// Object-storage primitives for day files
///
/// Implementations must be safe to call concurrently.
#[async_trait]
pub trait ArchiveStore: Send + Sync {
    /// Whole file contents
    async fn fetch_whole(&self, file: &DayFile) -> Result<Bytes>;

    /// Last modification time; a change means any cached index is stale
    async fn modified_time(&self, file: &DayFile) -> Result<DateTime<Utc>>;

    /// Bytes in `[from, to)`; shorter if the file ends first
    async fn fetch_range(&self, file: &DayFile, from: u64, to: u64) -> Result<Bytes>;

    /// Identities that have a file for `date`
    async fn list_identities(&self, date: NaiveDate) -> Result<Vec<StreamIdentity>>;

    /// Object key of the file, as the concurrent fetcher addresses it
    fn object_key(&self, file: &DayFile) -> String;

    /// Object size in bytes
    async fn object_size(&self, file: &DayFile) -> Result<u64>;
}
