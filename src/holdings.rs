//! Holdings
//!
//! Resolves a query to the archive objects that may hold its data. The
//! production holdings index is an external database; [`ArchiveHoldings`]
//! answers the same question from the day-file listing cache.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::archive::{ArchiveStore, DayFile, DayFileIndex};
use crate::error::Result;
use crate::identity::IdentityPattern;

/// One archive object that may hold records for a query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveObject {
    pub file: DayFile,
    /// Key the concurrent fetcher requests
    pub key: String,
    pub size: u64,
}

/// Read-only oracle of which archive objects exist
#[async_trait]
pub trait Holdings: Send + Sync {
    /// Candidate objects for `pattern` within `[start, end]`, in day order
    async fn candidates(
        &self,
        pattern: &IdentityPattern,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ArchiveObject>>;
}

/// Holdings backed by [`DayFileIndex::list`]
pub struct ArchiveHoldings {
    index: Arc<DayFileIndex>,
}

impl ArchiveHoldings {
    pub fn new(index: Arc<DayFileIndex>) -> Self {
        Self { index }
    }
}

#[async_trait]
impl Holdings for ArchiveHoldings {
    async fn candidates(
        &self,
        pattern: &IdentityPattern,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ArchiveObject>> {
        let store = self.index.store();
        let files = self.index.list(pattern, start, end).await?;

        let mut objects = Vec::with_capacity(files.len());
        for file in files {
            // Listed but gone by now: nothing to serve
            let size = match store.object_size(&file).await {
                Ok(size) => size,
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            };
            objects.push(ArchiveObject {
                key: store.object_key(&file),
                file,
                size,
            });
        }
        Ok(objects)
    }
}
