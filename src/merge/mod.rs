//! Merge Module
//!
//! Turns a parsed query into one ordered, duplicate-free record stream.
//!
//! ## Tier Selection
//! ```text
//!                      boundary = now - horizon
//!                               │
//!   ArchiveOnly   [start ── end]│
//!   Combined           [start ──┼── end]
//!   NrtOnly                     │[start ── end]
//! ───────────────────────────────────────────────────→ time
//! ```
//!
//! ## Combined Flow
//! ```text
//! NRT records ──write──→ output, key into `emitted`
//!                                │
//! archive files (ordered fetch) ─┴─ skip if key in `emitted` ──→ output
//! ```

mod engine;
mod query;
mod tier;

pub use engine::{MergeEngine, PreparedQuery, PreparedSubQuery, StreamSummary};
pub use query::{parse_time, Query, SubQuery};
pub use tier::TierPlan;
