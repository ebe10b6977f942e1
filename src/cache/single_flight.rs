//! Single-Flight LRU Cache
//!
//! LRU map plus a table of in-flight fills keyed the same way.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::error::{Result, SeisError};

/// Outcome of one fill, as seen by every waiter
type Fill<V> = std::result::Result<V, Arc<SeisError>>;

/// Slot a leader publishes its outcome into
type FillSlot<V> = watch::Receiver<Option<Fill<V>>>;

/// Point-in-time counters for one cache
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Successful computations (one per leader)
    pub fills: u64,
    /// Failed computations, never cached
    pub failures: u64,
    pub len: usize,
}

/// Keyed cache with a deduplicating get
///
/// ## Concurrency:
/// - `entries`: short critical sections only, never held across `.await`
/// - `in_flight`: one watch channel per key currently being computed
/// - All methods use `&self`
pub struct SingleFlightCache<K, V> {
    /// Name used in log fields
    name: &'static str,

    /// Completed values, least recently used evicted first
    entries: Mutex<LruCache<K, V>>,

    /// Keys whose value is being computed right now
    in_flight: Mutex<HashMap<K, FillSlot<V>>>,

    hits: AtomicU64,
    misses: AtomicU64,
    fills: AtomicU64,
    failures: AtomicU64,
}

enum Role<V> {
    Leader(watch::Sender<Option<Fill<V>>>),
    Follower(FillSlot<V>),
}

impl<K, V> SingleFlightCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    /// Create a cache holding at most `capacity` entries (minimum 1)
    pub fn new(name: &'static str, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            name,
            entries: Mutex::new(LruCache::new(capacity)),
            in_flight: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            fills: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    /// Get the cached value for `key`, computing it with `init` on a miss
    ///
    /// Concurrent callers for the same missing key share one `init` run.
    /// Errors are delivered to every waiter and are not cached. If the
    /// computing caller is dropped mid-fill, waiters retry.
    pub async fn get_or_try_insert_with<F, Fut>(&self, key: K, init: F) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        let mut init = Some(init);

        loop {
            if let Some(value) = self.lookup(&key) {
                return Ok(value);
            }

            match self.join_or_lead(&key) {
                Role::Follower(slot) => match wait_for_leader(slot).await {
                    Some(Ok(value)) => return Ok(value),
                    Some(Err(shared)) => return Err(SeisError::Shared(shared)),
                    None => {
                        tracing::debug!(cache = self.name, "leader abandoned fill, retrying");
                        continue;
                    }
                },
                Role::Leader(publish) => {
                    let Some(init) = init.take() else {
                        // A leader always returns, so init is only consumed once
                        return Err(SeisError::Storage(format!(
                            "{}: fill initializer already consumed",
                            self.name
                        )));
                    };
                    return self.lead(key, init, publish).await;
                }
            }
        }
    }

    /// Peek without computing; refreshes LRU position on hit
    pub fn get(&self, key: &K) -> Option<V> {
        self.entries.lock().get(key).cloned()
    }

    /// Insert or replace a value directly
    pub fn insert(&self, key: K, value: V) {
        self.entries.lock().put(key, value);
    }

    /// Drop a cached value
    pub fn invalidate(&self, key: &K) -> Option<V> {
        self.entries.lock().pop(key)
    }

    /// Number of cached values
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of fills currently running
    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().len()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            fills: self.fills.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            len: self.len(),
        }
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn lookup(&self, key: &K) -> Option<V> {
        let value = self.entries.lock().get(key).cloned();
        if value.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        value
    }

    /// Register as leader for `key`, or subscribe to the running fill
    fn join_or_lead(&self, key: &K) -> Role<V> {
        let mut in_flight = self.in_flight.lock();
        match in_flight.get(key) {
            Some(slot) => Role::Follower(slot.clone()),
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                let (publish, slot) = watch::channel(None);
                in_flight.insert(key.clone(), slot);
                Role::Leader(publish)
            }
        }
    }

    async fn lead<F, Fut>(
        &self,
        key: K,
        init: F,
        publish: watch::Sender<Option<Fill<V>>>,
    ) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        // Removes the in-flight slot however this future ends
        let _registration = InFlightGuard { cache: self, key: &key };

        // A fill may have completed between our lookup and registration
        if let Some(value) = self.get(&key) {
            publish.send_replace(Some(Ok(value.clone())));
            return Ok(value);
        }

        match init().await {
            Ok(value) => {
                self.entries.lock().put(key.clone(), value.clone());
                self.fills.fetch_add(1, Ordering::Relaxed);
                publish.send_replace(Some(Ok(value.clone())));
                tracing::trace!(cache = self.name, "fill complete");
                Ok(value)
            }
            Err(e) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(cache = self.name, error = %e, "fill failed, not cached");
                let shared = Arc::new(e);
                publish.send_replace(Some(Err(Arc::clone(&shared))));
                Err(SeisError::Shared(shared))
            }
        }
    }
}

/// Clears the in-flight registration when the leader finishes or is dropped
struct InFlightGuard<'a, K, V>
where
    K: Eq + Hash,
{
    cache: &'a SingleFlightCache<K, V>,
    key: &'a K,
}

impl<K, V> Drop for InFlightGuard<'_, K, V>
where
    K: Eq + Hash,
{
    fn drop(&mut self) {
        self.cache.in_flight.lock().remove(self.key);
    }
}

/// Wait for the leader's outcome; `None` means the leader went away
async fn wait_for_leader<V: Clone>(mut slot: FillSlot<V>) -> Option<Fill<V>> {
    loop {
        let published = slot.borrow_and_update().clone();
        if published.is_some() {
            return published;
        }
        if slot.changed().await.is_err() {
            return slot.borrow().clone();
        }
    }
}
