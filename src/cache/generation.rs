//! Generation Clock
//!
//! Monotonic counter advanced by a single background ticker. Listing caches
//! embed the current generation in their keys, so a listing is reused for at
//! most one tick interval and older generations simply age out of the LRU.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Cache-bust generation shared by one cache component
#[derive(Debug, Default)]
pub struct GenerationClock {
    generation: AtomicU64,
}

impl GenerationClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generation callers should embed in cache keys right now
    pub fn current(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Advance by one and return the new generation
    pub fn advance(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Spawn the ticker that advances this clock once per `period`
    ///
    /// The task stops on its own once the clock is dropped.
    pub fn spawn_ticker(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let clock: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(clock) = clock.upgrade() else {
                    break;
                };
                let generation = clock.advance();
                tracing::trace!(generation, "cache generation advanced");
            }
        })
    }
}
