//! Tier Plan
//!
//! Which tiers a time window needs, relative to the horizon boundary.

use std::fmt;

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierPlan {
    /// Window lies entirely at or after the boundary
    NrtOnly,
    /// Window ends before the boundary
    ArchiveOnly,
    /// Window straddles the boundary; NRT first, then deduplicated archive
    Combined,
}

impl TierPlan {
    /// Classify `[start, end]` against `boundary` (now minus horizon)
    pub fn classify(start: DateTime<Utc>, end: DateTime<Utc>, boundary: DateTime<Utc>) -> Self {
        if end < boundary {
            TierPlan::ArchiveOnly
        } else if start >= boundary {
            TierPlan::NrtOnly
        } else {
            TierPlan::Combined
        }
    }

    pub fn uses_nrt(self) -> bool {
        matches!(self, TierPlan::NrtOnly | TierPlan::Combined)
    }

    pub fn uses_archive(self) -> bool {
        matches!(self, TierPlan::ArchiveOnly | TierPlan::Combined)
    }
}

impl fmt::Display for TierPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TierPlan::NrtOnly => "nrt-only",
            TierPlan::ArchiveOnly => "archive-only",
            TierPlan::Combined => "combined",
        };
        f.write_str(name)
    }
}
