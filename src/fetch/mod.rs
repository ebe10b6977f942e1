//! Fetch Module
//!
//! Ordered, memory- and worker-bounded concurrent hydration of objects.
//!
//! ## Responsibilities
//! - Reject requests whose total size could never fit in memory
//! - Bound bytes in flight with a chunked memory pool
//! - Bound per-request and process-wide concurrency with a worker roster
//! - Deliver results in exactly the order they were requested
//!
//! ## Fan-out / Fan-in
//! ```text
//!   requests (in order)
//!        │
//!        ▼
//!   ┌────────────┐  job + oneshot tx   ┌──────────┐
//!   │ dispatcher │ ──────────────────→ │ worker k │ ── get_object
//!   └─────┬──────┘                     └────┬─────┘
//!         │ oneshot rx (FIFO)               │ result
//!         ▼                                 ▼
//!   ┌────────────┐   await head slot   ┌──────────┐
//!   │ reception  │ ──────────────────→ │ drainer  │ ──→ caller channel
//!   │   queue    │                     └──────────┘
//!   └────────────┘
//! ```
//!
//! The receiver of each job's output slot is queued at assignment time, so the
//! drainer can only ever emit results in request order no matter which worker
//! finishes first.

mod fetcher;
mod memory;
mod worker;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

pub use fetcher::ConcurrentFetcher;
pub use memory::{MemoryPool, MemoryReservation};

/// Object-storage read primitive the fetcher hydrates from
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Whole object body; `version` pins a specific object version when set
    async fn get_object(&self, bucket: &str, version: Option<&str>, key: &str) -> Result<Bytes>;
}

/// Concurrency and memory limits for one fetcher instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchConfig {
    /// Workers shared by every request
    pub max_workers: usize,
    /// Workers one request may hold at once
    pub max_workers_per_request: usize,
    /// Bytes that may be reserved at once across all requests
    pub max_bytes: u64,
}

impl FetchConfig {
    /// Bytes per memory chunk (at least 1)
    pub fn chunk_size(&self) -> u64 {
        (self.max_bytes / self.max_workers.max(1) as u64).max(1)
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_workers: 64,
            max_workers_per_request: 8,
            max_bytes: 1024 * 1024 * 1024,
        }
    }
}

/// One object to hydrate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRequest {
    pub key: String,
    /// Expected size in bytes, used only for the memory reservation
    pub size: u64,
}

impl ObjectRequest {
    pub fn new(key: impl Into<String>, size: u64) -> Self {
        Self {
            key: key.into(),
            size,
        }
    }
}

/// Fetch outcome for one requested object
#[derive(Debug)]
pub struct HydratedFile {
    pub key: String,
    pub data: Result<Bytes>,
}
