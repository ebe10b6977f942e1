//! Day-File Index Cache
//!
//! Caches one record index per (identity, day, modification time) and one
//! identity listing per (day, generation), both filled single-flight.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::task::JoinHandle;

use super::{ArchiveStore, DayFile, RecordIndex};
use crate::cache::{CacheStats, GenerationClock, SingleFlightCache};
use crate::error::Result;
use crate::identity::{IdentityPattern, StreamIdentity};

/// Listings are widened by this much on both sides before truncating to days
const LISTING_PAD_MINUTES: i64 = 1;

/// Cache key for one built record index
///
/// A rewritten file gets a new modification time and therefore a new key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndexKey {
    pub identity: StreamIdentity,
    pub date: NaiveDate,
    pub modified: DateTime<Utc>,
}

/// Cache key for one day's identity listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListingKey {
    pub date: NaiveDate,
    pub generation: u64,
}

/// Record-index and listing cache over an [`ArchiveStore`]
///
/// ## Concurrency:
/// - Both caches are single-flight: N concurrent misses build once
/// - All methods use `&self`; share via `Arc<DayFileIndex>`
pub struct DayFileIndex {
    store: Arc<dyn ArchiveStore>,
    indexes: SingleFlightCache<IndexKey, Arc<RecordIndex>>,
    listings: SingleFlightCache<ListingKey, Arc<Vec<StreamIdentity>>>,
    generation: Arc<GenerationClock>,
}

impl DayFileIndex {
    pub fn new(
        store: Arc<dyn ArchiveStore>,
        index_capacity: usize,
        listing_capacity: usize,
    ) -> Self {
        Self {
            store,
            indexes: SingleFlightCache::new("archive-index", index_capacity),
            listings: SingleFlightCache::new("archive-listing", listing_capacity),
            generation: Arc::new(GenerationClock::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn ArchiveStore> {
        &self.store
    }

    pub fn generation(&self) -> &Arc<GenerationClock> {
        &self.generation
    }

    /// Start advancing the listing generation every `period`
    pub fn spawn_generation_ticker(&self, period: Duration) -> JoinHandle<()> {
        self.generation.spawn_ticker(period)
    }

    /// Calendar days covered by `[start, end]` after padding one minute per side
    ///
    /// Padding saturates at the earliest and latest representable instants.
    pub fn covering_days(start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<NaiveDate> {
        match Self::padded_days(start, end) {
            Some((first, last)) => first.iter_days().take_while(|day| *day <= last).collect(),
            None => Vec::new(),
        }
    }

    /// Number of days `covering_days` would return, without listing them
    pub fn covering_day_count(start: DateTime<Utc>, end: DateTime<Utc>) -> u64 {
        match Self::padded_days(start, end) {
            Some((first, last)) => (last - first).num_days() as u64 + 1,
            None => 0,
        }
    }

    /// Day files whose identity matches `pattern` within `[start, end]`
    ///
    /// Results are ordered by day, then identity.
    pub async fn list(
        &self,
        pattern: &IdentityPattern,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<DayFile>> {
        let mut files = Vec::new();
        for date in Self::covering_days(start, end) {
            let identities = self.identities_on(date).await?;
            files.extend(
                identities
                    .iter()
                    .filter(|identity| pattern.matches(identity))
                    .map(|identity| DayFile::new(identity.clone(), date)),
            );
        }
        tracing::debug!(%pattern, %start, %end, files = files.len(), "listed archive day files");
        Ok(files)
    }

    /// Record index of `file`, built at most once per modification time
    pub async fn index(&self, file: &DayFile) -> Result<Arc<RecordIndex>> {
        let modified = self.store.modified_time(file).await?;
        let key = IndexKey {
            identity: file.identity.clone(),
            date: file.date,
            modified,
        };

        let store = Arc::clone(&self.store);
        let target = file.clone();
        self.indexes
            .get_or_try_insert_with(key, || async move {
                let data = store.fetch_whole(&target).await?;
                let index = RecordIndex::build(&data)?;
                tracing::debug!(file = %target, records = index.len(), "built record index");
                Ok(Arc::new(index))
            })
            .await
    }

    /// Record-aligned byte range of `file` covering `[start, end]`
    pub async fn range(
        &self,
        file: &DayFile,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Option<(u64, u64)>> {
        let index = self.index(file).await?;
        Ok(index.byte_range(start, end))
    }

    /// Write the records of `file` covering `[start, end]` to `writer`
    ///
    /// Returns the number of bytes written; zero when the window misses the file.
    pub async fn get<W>(
        &self,
        file: &DayFile,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        writer: &mut W,
    ) -> Result<u64>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let Some((from, to)) = self.range(file, start, end).await? else {
            return Ok(0);
        };

        let data = self.store.fetch_range(file, from, to).await?;
        writer.write_all(&data).await?;
        tracing::trace!(file = %file, from, to, "served archive range");
        Ok(data.len() as u64)
    }

    pub fn index_stats(&self) -> CacheStats {
        self.indexes.stats()
    }

    pub fn listing_stats(&self) -> CacheStats {
        self.listings.stats()
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn padded_days(start: DateTime<Utc>, end: DateTime<Utc>) -> Option<(NaiveDate, NaiveDate)> {
        if start > end {
            return None;
        }
        let pad = ChronoDuration::minutes(LISTING_PAD_MINUTES);
        let first = start
            .checked_sub_signed(pad)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
            .date_naive();
        let last = end
            .checked_add_signed(pad)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
            .date_naive();
        Some((first, last))
    }

    async fn identities_on(&self, date: NaiveDate) -> Result<Arc<Vec<StreamIdentity>>> {
        let key = ListingKey {
            date,
            generation: self.generation.current(),
        };
        let store = Arc::clone(&self.store);
        self.listings
            .get_or_try_insert_with(key, || async move {
                let mut identities = store.list_identities(date).await?;
                identities.sort();
                identities.dedup();
                Ok(Arc::new(identities))
            })
            .await
    }
}
