//! Record Index
//!
//! Ordered record boundaries of one day file.

use chrono::{DateTime, Utc};

use crate::error::{Result, SeisError};
use crate::record::{records, RECORD_LEN};

/// Boundaries of one record in a day file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordIndexEntry {
    /// Ordinal position in the file (byte offset = seq * RECORD_LEN)
    pub seq: u32,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Record boundaries ordered by position, with non-decreasing start times
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordIndex {
    entries: Vec<RecordIndexEntry>,
}

impl RecordIndex {
    /// Decode every record of a day file, in order
    ///
    /// O(file size); any malformed record aborts the build.
    pub fn build(data: &[u8]) -> Result<Self> {
        let mut entries = Vec::with_capacity(data.len() / RECORD_LEN);
        for (position, item) in records(data).enumerate() {
            let (_, header) = item?;
            entries.push(RecordIndexEntry {
                seq: position as u32,
                start: header.start,
                end: header.end(),
            });
        }
        Self::from_entries(entries)
    }

    /// Wrap pre-computed entries, checking the ordering invariants
    pub fn from_entries(entries: Vec<RecordIndexEntry>) -> Result<Self> {
        for (position, pair) in entries.windows(2).enumerate() {
            if pair[1].seq <= pair[0].seq {
                return Err(SeisError::MalformedRecord(format!(
                    "record sequence not increasing at position {}",
                    position + 1
                )));
            }
            if pair[1].start < pair[0].start {
                return Err(SeisError::MalformedRecord(format!(
                    "record {} starts at {} before its predecessor ({})",
                    pair[1].seq, pair[1].start, pair[0].start
                )));
            }
        }
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[RecordIndexEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Ordinals `(first, last)` of the records to serve for `[start, end]`
    ///
    /// `first` is the last record starting at or before `start` (the first
    /// record if the window opens before the file). `last` is the last record
    /// starting at or before `end` (the final record if `end` reaches the
    /// file's end). `None` when the window misses the file entirely.
    pub fn span(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Option<(usize, usize)> {
        let first_entry = self.entries.first()?;
        let last_entry = self.entries.last()?;

        if start > end || end < first_entry.start || start > last_entry.end {
            return None;
        }

        let first = self
            .entries
            .partition_point(|e| e.start <= start)
            .saturating_sub(1);

        let last = if end >= last_entry.end {
            self.entries.len() - 1
        } else {
            self.entries.partition_point(|e| e.start <= end) - 1
        };

        Some((first, last.max(first)))
    }

    /// Record-aligned half-open byte range `[from, to)` for `[start, end]`
    pub fn byte_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Option<(u64, u64)> {
        let (first, last) = self.span(start, end)?;
        let len = RECORD_LEN as u64;
        Some((first as u64 * len, (last as u64 + 1) * len))
    }
}
