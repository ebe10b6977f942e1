//! NRT Listing/Record Cache

use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use super::layout::{identity_dir, identity_from_dirs, parse_record_name};
use super::{NrtEntry, NrtRecord};
use crate::cache::{CacheStats, GenerationClock, SingleFlightCache};
use crate::error::{Result, SeisError};
use crate::identity::{IdentityPattern, RecordKey, StreamIdentity};

/// Cache key for one identity's record listing
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NrtListingKey {
    pub identity: StreamIdentity,
    pub generation: u64,
}

/// Reader side of the NRT store
///
/// ## Concurrency:
/// - `identities`: swapped wholesale by `refresh`, read lock held only to clone the `Arc`
/// - `listings` and `records`: single-flight LRU caches
pub struct NrtCache {
    root: PathBuf,
    identities: RwLock<Arc<Vec<StreamIdentity>>>,
    listings: SingleFlightCache<NrtListingKey, Arc<Vec<NrtEntry>>>,
    records: SingleFlightCache<PathBuf, Bytes>,
    generation: Arc<GenerationClock>,
}

impl NrtCache {
    pub fn new(root: impl Into<PathBuf>, listing_capacity: usize, record_capacity: usize) -> Self {
        Self {
            root: root.into(),
            identities: RwLock::new(Arc::new(Vec::new())),
            listings: SingleFlightCache::new("nrt-listing", listing_capacity),
            records: SingleFlightCache::new("nrt-record", record_capacity),
            generation: Arc::new(GenerationClock::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn generation(&self) -> &Arc<GenerationClock> {
        &self.generation
    }

    /// Start advancing the listing generation every `period`
    pub fn spawn_generation_ticker(&self, period: Duration) -> JoinHandle<()> {
        self.generation.spawn_ticker(period)
    }

    /// Rescan which identities have a directory on disk
    ///
    /// Returns how many were found. On failure the previous list stays.
    pub async fn refresh(&self) -> Result<usize> {
        let root = self.root.clone();
        let mut found = tokio::task::spawn_blocking(move || scan_identities(&root))
            .await
            .map_err(|e| SeisError::Storage(format!("NRT scan task failed: {}", e)))??;
        found.sort();

        let count = found.len();
        *self.identities.write() = Arc::new(found);
        tracing::debug!(identities = count, "NRT identity list refreshed");
        Ok(count)
    }

    /// Refresh once immediately, then once per `period`
    ///
    /// The task stops on its own once the cache is dropped.
    pub fn spawn_refresh(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let cache: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(cache) = cache.upgrade() else {
                    break;
                };
                if let Err(e) = cache.refresh().await {
                    tracing::warn!(error = %e, "NRT refresh failed, keeping previous list");
                }
            }
        })
    }

    /// Snapshot of every known identity
    pub fn identities(&self) -> Arc<Vec<StreamIdentity>> {
        Arc::clone(&self.identities.read())
    }

    /// Known identities matching `pattern`
    pub fn list(&self, pattern: &IdentityPattern) -> Vec<StreamIdentity> {
        self.identities()
            .iter()
            .filter(|identity| pattern.matches(identity))
            .cloned()
            .collect()
    }

    /// Like [`NrtCache::list`] but compiling raw regular expressions first
    pub fn list_patterns(&self, fields: &[&str; 4]) -> Result<Vec<StreamIdentity>> {
        let pattern = IdentityPattern::new(fields[0], fields[1], fields[2], fields[3])?;
        Ok(self.list(&pattern))
    }

    /// Records of `identity` that lie entirely within `[start, end]`
    ///
    /// Ordered by start time. Records that vanish or fail to read between
    /// listing and fetch are skipped.
    pub async fn records(
        &self,
        identity: &StreamIdentity,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<NrtRecord>> {
        if start > end {
            return Ok(Vec::new());
        }

        let listing = self.listing(identity).await?;
        let mut out = Vec::new();
        for entry in listing
            .iter()
            .filter(|entry| entry.start >= start && entry.end <= end)
        {
            match self.record_bytes(&entry.path).await {
                Ok(data) => out.push(NrtRecord {
                    key: RecordKey {
                        identity: identity.clone(),
                        start: entry.start,
                    },
                    end: entry.end,
                    data,
                }),
                Err(e) => {
                    tracing::debug!(path = %entry.path.display(), error = %e, "skipping NRT record");
                }
            }
        }
        Ok(out)
    }

    /// Write the records of `identity` within `[start, end]` to `writer`
    pub async fn get<W>(
        &self,
        identity: &StreamIdentity,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        writer: &mut W,
    ) -> Result<u64>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let mut written = 0u64;
        for record in self.records(identity, start, end).await? {
            writer.write_all(&record.data).await?;
            written += record.data.len() as u64;
        }
        Ok(written)
    }

    pub fn listing_stats(&self) -> CacheStats {
        self.listings.stats()
    }

    pub fn record_stats(&self) -> CacheStats {
        self.records.stats()
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    async fn listing(&self, identity: &StreamIdentity) -> Result<Arc<Vec<NrtEntry>>> {
        let key = NrtListingKey {
            identity: identity.clone(),
            generation: self.generation.current(),
        };
        let dir = identity_dir(&self.root, identity);
        self.listings
            .get_or_try_insert_with(key, || async move {
                let mut entries = tokio::task::spawn_blocking(move || scan_records(&dir))
                    .await
                    .map_err(|e| SeisError::Storage(format!("NRT listing task failed: {}", e)))??;
                entries.sort_by(|a, b| a.start.cmp(&b.start).then(a.end.cmp(&b.end)));
                Ok(Arc::new(entries))
            })
            .await
    }

    async fn record_bytes(&self, path: &Path) -> Result<Bytes> {
        let target = path.to_path_buf();
        self.records
            .get_or_try_insert_with(target.clone(), || async move {
                let data = tokio::fs::read(&target).await.map_err(|e| {
                    if e.kind() == std::io::ErrorKind::NotFound {
                        SeisError::NotFound(target.display().to_string())
                    } else {
                        SeisError::Io(e)
                    }
                })?;
                Ok(Bytes::from(data))
            })
            .await
    }
}

/// `root/NET/STA/LOC/CHA` directories, as identities
fn scan_identities(root: &Path) -> Result<Vec<StreamIdentity>> {
    let mut found = Vec::new();
    for (network, network_dir) in subdirs(root)? {
        for (station, station_dir) in subdirs(&network_dir)? {
            for (location, location_dir) in subdirs(&station_dir)? {
                for (channel, _) in subdirs(&location_dir)? {
                    found.push(identity_from_dirs(&network, &station, &location, &channel));
                }
            }
        }
    }
    Ok(found)
}

/// Every well-named record file under `<identity dir>/<Weekday>/<HH>/`
fn scan_records(dir: &Path) -> Result<Vec<NrtEntry>> {
    let mut entries = Vec::new();
    for (_, day_dir) in subdirs(dir)? {
        for (_, hour_dir) in subdirs(&day_dir)? {
            for item in std::fs::read_dir(&hour_dir)? {
                let item = item?;
                let name = item.file_name();
                let Some((start, end)) = name.to_str().and_then(parse_record_name) else {
                    continue;
                };
                entries.push(NrtEntry {
                    path: item.path(),
                    start,
                    end,
                });
            }
        }
    }
    Ok(entries)
}

/// `(name, path)` of each subdirectory; a missing directory has none
fn subdirs(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let listing = match std::fs::read_dir(dir) {
        Ok(listing) => listing,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut dirs = Vec::new();
    for item in listing {
        let item = item?;
        if !item.file_type()?.is_dir() {
            continue;
        }
        if let Some(name) = item.file_name().to_str() {
            dirs.push((name.to_string(), item.path()));
        }
    }
    Ok(dirs)
}
