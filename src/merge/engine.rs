//! Merge Engine
//!
//! Pre-flight (`prepare`) resolves every sub-query and enforces limits while
//! a non-200 status can still be chosen. Streaming (`PreparedQuery::stream`)
//! then writes NRT records first and deduplicated archive records after.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use super::query::{Query, SubQuery};
use super::tier::TierPlan;
use crate::archive::DayFileIndex;
use crate::config::Config;
use crate::error::{Result, SeisError};
use crate::fetch::{ConcurrentFetcher, ObjectRequest};
use crate::holdings::{ArchiveObject, Holdings};
use crate::identity::{RecordKey, StreamIdentity};
use crate::nrt::NrtCache;
use crate::record::{records, RECORD_LEN};

/// Totals for one streamed response
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamSummary {
    pub bytes: u64,
    pub records: u64,
    /// Records skipped because their key was already written
    pub duplicates_skipped: u64,
    /// Archive files that failed to fetch or decode
    pub files_failed: u64,
}

/// Serves queries across both tiers
pub struct MergeEngine {
    nrt: Arc<NrtCache>,
    holdings: Arc<dyn Holdings>,
    fetcher: Arc<ConcurrentFetcher>,
    bucket: String,
    horizon: Duration,
    max_candidate_files: usize,
    max_archive_days: u64,
    max_sub_queries: usize,
}

impl MergeEngine {
    pub fn new(
        config: &Config,
        nrt: Arc<NrtCache>,
        holdings: Arc<dyn Holdings>,
        fetcher: Arc<ConcurrentFetcher>,
    ) -> Self {
        Self {
            nrt,
            holdings,
            fetcher,
            bucket: config.archive_bucket.clone(),
            horizon: config.horizon,
            max_candidate_files: config.max_candidate_files,
            max_archive_days: config.max_archive_days,
            max_sub_queries: config.max_sub_queries,
        }
    }

    pub fn nrt(&self) -> &Arc<NrtCache> {
        &self.nrt
    }

    pub fn fetcher(&self) -> &Arc<ConcurrentFetcher> {
        &self.fetcher
    }

    /// Boundary between the tiers at `now`
    ///
    /// Saturates at the earliest instant; `Config::validate` rejects
    /// horizons chrono cannot represent.
    pub fn boundary_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        chrono::Duration::from_std(self.horizon)
            .ok()
            .and_then(|horizon| now.checked_sub_signed(horizon))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Resolve and check `query` against the current time
    pub async fn prepare(&self, query: &Query) -> Result<PreparedQuery> {
        self.prepare_at(query, Utc::now()).await
    }

    /// Resolve and check `query` as if the time were `now`
    ///
    /// Fails with `CapacityExceeded` when there are too many sub-queries,
    /// archive days or candidate files, or when one sub-query's archive files
    /// could never fit in fetch memory. Fails with `NoData` when nothing could
    /// match.
    pub async fn prepare_at(&self, query: &Query, now: DateTime<Utc>) -> Result<PreparedQuery> {
        if query.sub_queries.len() > self.max_sub_queries {
            return Err(SeisError::CapacityExceeded {
                what: "sub-queries",
                found: query.sub_queries.len() as u64,
                limit: self.max_sub_queries as u64,
            });
        }

        let boundary = self.boundary_at(now);
        let plans: Vec<TierPlan> = query
            .sub_queries
            .iter()
            .map(|sub| TierPlan::classify(sub.start, sub.end, boundary))
            .collect();

        // Bound the day listings before any of them run
        let archive_days: u64 = query
            .sub_queries
            .iter()
            .zip(&plans)
            .filter(|(_, plan)| plan.uses_archive())
            .map(|(sub, _)| DayFileIndex::covering_day_count(sub.start, sub.end))
            .fold(0u64, u64::saturating_add);
        if archive_days > self.max_archive_days {
            return Err(SeisError::CapacityExceeded {
                what: "archive days",
                found: archive_days,
                limit: self.max_archive_days,
            });
        }

        let mut parts = Vec::with_capacity(query.sub_queries.len());
        let mut candidate_total = 0usize;

        for (sub, plan) in query.sub_queries.iter().zip(plans) {
            let nrt_identities = if plan.uses_nrt() {
                self.nrt.list(&sub.pattern)
            } else {
                Vec::new()
            };
            let candidates = if plan.uses_archive() {
                self.holdings
                    .candidates(&sub.pattern, sub.start, sub.end)
                    .await?
            } else {
                Vec::new()
            };
            candidate_total += candidates.len();

            tracing::debug!(
                pattern = %sub.pattern,
                %plan,
                nrt_identities = nrt_identities.len(),
                candidates = candidates.len(),
                "sub-query resolved"
            );
            parts.push(PreparedSubQuery {
                sub: sub.clone(),
                plan,
                nrt_identities,
                candidates,
            });
        }

        if candidate_total > self.max_candidate_files {
            return Err(SeisError::CapacityExceeded {
                what: "candidate files",
                found: candidate_total as u64,
                limit: self.max_candidate_files as u64,
            });
        }

        // Each sub-query's archive batch is fetched as one reservation
        let memory = self.fetcher.memory();
        for part in &parts {
            let chunks: u64 = part
                .candidates
                .iter()
                .map(|c| memory.chunks_for(c.size))
                .sum();
            if chunks > memory.total_chunks() {
                return Err(SeisError::CapacityExceeded {
                    what: "memory chunks",
                    found: chunks,
                    limit: memory.total_chunks(),
                });
            }
        }

        let nothing = parts
            .iter()
            .all(|p| p.candidates.is_empty() && p.nrt_identities.is_empty());
        if nothing {
            return Err(SeisError::NoData);
        }

        Ok(PreparedQuery { parts })
    }
}

/// One sub-query with its tiers resolved
#[derive(Debug, Clone)]
pub struct PreparedSubQuery {
    pub sub: SubQuery,
    pub plan: TierPlan,
    pub nrt_identities: Vec<StreamIdentity>,
    pub candidates: Vec<ArchiveObject>,
}

/// A query that passed pre-flight and is ready to stream
#[derive(Debug, Clone)]
pub struct PreparedQuery {
    parts: Vec<PreparedSubQuery>,
}

impl PreparedQuery {
    pub fn parts(&self) -> &[PreparedSubQuery] {
        &self.parts
    }

    pub fn candidate_count(&self) -> usize {
        self.parts.iter().map(|p| p.candidates.len()).sum()
    }

    /// Write every matching record to `writer`, sub-query by sub-query
    ///
    /// Within a sub-query NRT records come first. No record key is written
    /// twice in one response. A cancelled token stops new work; archive
    /// files already being fetched are still written before `Cancelled` is
    /// returned.
    pub async fn stream<W>(
        &self,
        engine: &MergeEngine,
        writer: &mut W,
        cancel: CancellationToken,
    ) -> Result<StreamSummary>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let mut summary = StreamSummary::default();
        let mut emitted: HashSet<RecordKey> = HashSet::new();

        for part in &self.parts {
            if cancel.is_cancelled() {
                return Err(SeisError::Cancelled);
            }

            if part.plan.uses_nrt() {
                Self::stream_nrt(engine, part, writer, &cancel, &mut emitted, &mut summary)
                    .await?;
            }

            if part.plan.uses_archive() && !part.candidates.is_empty() {
                Self::stream_archive(engine, part, writer, &cancel, &mut emitted, &mut summary)
                    .await?;
            }
        }

        writer.flush().await?;
        tracing::debug!(
            bytes = summary.bytes,
            records = summary.records,
            duplicates = summary.duplicates_skipped,
            failed = summary.files_failed,
            "query streamed"
        );
        Ok(summary)
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    async fn stream_nrt<W>(
        engine: &MergeEngine,
        part: &PreparedSubQuery,
        writer: &mut W,
        cancel: &CancellationToken,
        emitted: &mut HashSet<RecordKey>,
        summary: &mut StreamSummary,
    ) -> Result<()>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let (start, end) = (part.sub.start, part.sub.end);

        for identity in &part.nrt_identities {
            if cancel.is_cancelled() {
                return Err(SeisError::Cancelled);
            }

            let found = match engine.nrt.records(identity, start, end).await {
                Ok(found) => found,
                Err(e) => {
                    tracing::warn!(%identity, error = %e, "NRT listing failed, skipping identity");
                    continue;
                }
            };

            for record in found {
                if emitted.contains(&record.key) {
                    summary.duplicates_skipped += 1;
                    continue;
                }
                writer.write_all(&record.data).await?;
                summary.bytes += record.data.len() as u64;
                summary.records += 1;
                emitted.insert(record.key);
            }
        }
        Ok(())
    }

    async fn stream_archive<W>(
        engine: &MergeEngine,
        part: &PreparedSubQuery,
        writer: &mut W,
        cancel: &CancellationToken,
        emitted: &mut HashSet<RecordKey>,
        summary: &mut StreamSummary,
    ) -> Result<()>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let requests = part
            .candidates
            .iter()
            .map(|c| ObjectRequest::new(c.key.clone(), c.size))
            .collect();
        let mut hydrated = engine
            .fetcher
            .get_all_concurrently(&engine.bucket, None, requests, cancel.clone())
            .await?;

        while let Some(file) = hydrated.recv().await {
            let data = match file.data {
                Ok(data) => data,
                Err(e) if e.is_not_found() => {
                    tracing::debug!(key = %file.key, "archive object vanished, skipping");
                    continue;
                }
                Err(e) => {
                    tracing::warn!(key = %file.key, error = %e, "archive fetch failed, skipping file");
                    summary.files_failed += 1;
                    continue;
                }
            };

            // Decode the whole file before writing any of it
            let selected = match select_records(&data, &part.sub, emitted) {
                Ok(selected) => selected,
                Err(e) => {
                    tracing::warn!(key = %file.key, error = %e, "archive decode failed, skipping file");
                    summary.files_failed += 1;
                    continue;
                }
            };

            for (offset, key) in selected.records {
                writer.write_all(&data[offset..offset + RECORD_LEN]).await?;
                summary.bytes += RECORD_LEN as u64;
                summary.records += 1;
                emitted.insert(key);
            }
            summary.duplicates_skipped += selected.duplicates;
        }

        if cancel.is_cancelled() {
            return Err(SeisError::Cancelled);
        }
        Ok(())
    }
}

/// Records of one archive file chosen for output
struct Selection {
    records: Vec<(usize, RecordKey)>,
    duplicates: u64,
}

/// Records inside the window, matching the pattern, not yet emitted
fn select_records(
    data: &[u8],
    sub: &SubQuery,
    emitted: &HashSet<RecordKey>,
) -> Result<Selection> {
    let mut selection = Selection {
        records: Vec::new(),
        duplicates: 0,
    };
    let mut seen_here: HashSet<RecordKey> = HashSet::new();

    for item in records(data) {
        let (offset, header) = item?;
        if header.start < sub.start || header.end() > sub.end {
            continue;
        }
        if !sub.pattern.matches(&header.identity) {
            continue;
        }
        let key = header.key();
        if emitted.contains(&key) || !seen_here.insert(key.clone()) {
            selection.duplicates += 1;
            continue;
        }
        selection.records.push((offset, key));
    }
    Ok(selection)
}
