//! Memory Pool
//!
//! `max_bytes` split into equal chunks, handed out as semaphore permits.
//! Reservations release whatever they still hold when dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::error::{Result, SeisError};

/// Chunked byte budget shared by every request of one fetcher
#[derive(Debug, Clone)]
pub struct MemoryPool {
    inner: Arc<PoolInner>,
}

#[derive(Debug)]
struct PoolInner {
    permits: Semaphore,
    chunk_size: u64,
    total_chunks: u64,
    reserved_chunks: AtomicU64,
    peak_chunks: AtomicU64,
}

impl PoolInner {
    fn release(&self, chunks: u64) {
        // Counter first so observers never see more than the pool holds
        self.reserved_chunks.fetch_sub(chunks, Ordering::AcqRel);
        self.permits.add_permits(chunks as usize);
    }
}

impl MemoryPool {
    /// Pool of `total_chunks` chunks of `chunk_size` bytes each
    pub fn new(chunk_size: u64, total_chunks: usize) -> Self {
        let total_chunks = total_chunks.max(1);
        Self {
            inner: Arc::new(PoolInner {
                permits: Semaphore::new(total_chunks),
                chunk_size: chunk_size.max(1),
                total_chunks: total_chunks as u64,
                reserved_chunks: AtomicU64::new(0),
                peak_chunks: AtomicU64::new(0),
            }),
        }
    }

    pub fn chunk_size(&self) -> u64 {
        self.inner.chunk_size
    }

    pub fn total_chunks(&self) -> u64 {
        self.inner.total_chunks
    }

    /// Chunks an object of `size` bytes needs; empty objects still take one
    pub fn chunks_for(&self, size: u64) -> u64 {
        size.div_ceil(self.inner.chunk_size).max(1)
    }

    /// Wait until `chunks` chunks are free and take them
    ///
    /// Fails immediately if the pool could never hold that many.
    pub async fn reserve(&self, chunks: u64) -> Result<MemoryReservation> {
        if chunks > self.inner.total_chunks {
            return Err(SeisError::CapacityExceeded {
                what: "memory chunks",
                found: chunks,
                limit: self.inner.total_chunks,
            });
        }

        let permit = self
            .inner
            .permits
            .acquire_many(chunks as u32)
            .await
            .map_err(|_| SeisError::Storage("memory pool closed".into()))?;
        permit.forget();

        let now = self.inner.reserved_chunks.fetch_add(chunks, Ordering::AcqRel) + chunks;
        self.inner.peak_chunks.fetch_max(now, Ordering::AcqRel);

        Ok(MemoryReservation {
            inner: Arc::clone(&self.inner),
            chunks,
        })
    }

    /// Bytes currently reserved
    pub fn reserved_bytes(&self) -> u64 {
        self.inner.reserved_chunks.load(Ordering::Acquire) * self.inner.chunk_size
    }

    /// Highest reservation ever observed, in bytes
    pub fn peak_reserved_bytes(&self) -> u64 {
        self.inner.peak_chunks.load(Ordering::Acquire) * self.inner.chunk_size
    }

    pub fn available_chunks(&self) -> u64 {
        self.inner.permits.available_permits() as u64
    }
}

/// Chunks held by one request (or one job split off it)
#[derive(Debug)]
pub struct MemoryReservation {
    inner: Arc<PoolInner>,
    chunks: u64,
}

impl MemoryReservation {
    pub fn chunks(&self) -> u64 {
        self.chunks
    }

    /// Move up to `chunks` chunks into a new reservation
    pub fn split(&mut self, chunks: u64) -> MemoryReservation {
        let taken = chunks.min(self.chunks);
        self.chunks -= taken;
        MemoryReservation {
            inner: Arc::clone(&self.inner),
            chunks: taken,
        }
    }
}

impl Drop for MemoryReservation {
    fn drop(&mut self) {
        if self.chunks > 0 {
            self.inner.release(self.chunks);
        }
    }
}
