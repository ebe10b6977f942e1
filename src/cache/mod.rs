//! Cache Module
//!
//! Process-wide keyed caches shared by the archive index and the NRT store.
//!
//! ## Responsibilities
//! - Deduplicating get: at most one computation per key in flight
//! - Size-bounded LRU eviction (no TTL)
//! - Generation counter that bounds listing staleness without sweeps
//!
//! ## Fill Flow
//! ```text
//! get_or_try_insert_with(key, init)
//!         │
//!    LRU hit? ──YES──→ clone value
//!         │
//!         NO
//!         ▼
//!   in-flight entry? ──YES──→ wait on leader's watch channel
//!         │                       │
//!         NO                      ├─ Ok(v)  → v
//!         ▼                       ├─ Err(e) → Shared(e), nothing cached
//!   become leader: run init       └─ leader dropped → retry from the top
//!         │
//!   Ok → insert into LRU, publish; Err → publish only
//! ```

mod generation;
mod single_flight;

pub use generation::GenerationClock;
pub use single_flight::{CacheStats, SingleFlightCache};
