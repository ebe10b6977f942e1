//! # seisgate
//!
//! Two-tier miniSEED waveform serving core:
//! - Near-real-time (NRT) tier of individual record files on local disk
//! - Archive tier of immutable per-day files in object storage
//! - Single-flight caches so concurrent misses compute once
//! - Ordered, memory- and worker-bounded concurrent fetching
//! - Merge engine that deduplicates records across the tier boundary
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 HTTP (dataselect query)                      │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                    Merge Engine                              │
//! │       (tier plan, pre-flight limits, dedup by key)           │
//! └──────────┬──────────────────────────────┬───────────────────┘
//!            │                              │
//!            ▼                              ▼
//!   ┌─────────────────┐           ┌───────────────────┐
//!   │    NrtCache     │           │     Holdings      │
//!   │ (listing/record │           │  (DayFileIndex    │
//!   │  single-flight) │           │   listings)       │
//!   └─────────────────┘           └─────────┬─────────┘
//!                                           │ candidates
//!                                           ▼
//!                                 ┌───────────────────┐
//!                                 │ ConcurrentFetcher │
//!                                 │ (ordered fan-in)  │
//!                                 └─────────┬─────────┘
//!                                           │
//!                                           ▼
//!                                 ┌───────────────────┐
//!                                 │   Object store    │
//!                                 └───────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod record;
pub mod identity;
pub mod cache;
pub mod archive;
pub mod nrt;
pub mod fetch;
pub mod holdings;
pub mod merge;
pub mod http;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{Result, SeisError};
pub use config::Config;
pub use identity::{IdentityPattern, RecordKey, StreamIdentity};
pub use archive::{DayFile, DayFileIndex};
pub use nrt::NrtCache;
pub use fetch::ConcurrentFetcher;
pub use merge::MergeEngine;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of seisgate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
