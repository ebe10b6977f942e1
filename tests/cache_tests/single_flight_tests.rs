//! Tests for SingleFlightCache and GenerationClock
//!
//! These tests verify:
//! - Concurrent misses for one key run the initializer once
//! - Every waiter observes the same value or the same error
//! - Failures are not cached
//! - A dropped leader lets waiters retry
//! - LRU eviction bounds the entry count
//! - The generation ticker advances and stops with its clock

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use seisgate::cache::{GenerationClock, SingleFlightCache};
use seisgate::SeisError;
use tokio::sync::Barrier;

// =============================================================================
// Helper Functions
// =============================================================================

fn new_cache(capacity: usize) -> Arc<SingleFlightCache<String, Arc<Vec<u32>>>> {
    Arc::new(SingleFlightCache::new("test", capacity))
}

// =============================================================================
// Single-Flight Tests
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_misses_build_once() {
    let cache = new_cache(16);
    let builds = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(32));

    let mut handles = Vec::new();
    for _ in 0..32 {
        let cache = Arc::clone(&cache);
        let builds = Arc::clone(&builds);
        let barrier = Arc::clone(&barrier);
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            cache
                .get_or_try_insert_with("day".to_string(), || async move {
                    builds.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok(Arc::new(vec![1, 2, 3]))
                })
                .await
                .unwrap()
        }));
    }

    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap());
    }

    assert_eq!(builds.load(Ordering::SeqCst), 1);
    for value in &results {
        assert!(Arc::ptr_eq(value, &results[0]));
    }
    assert_eq!(cache.stats().fills, 1);
    assert_eq!(cache.in_flight(), 0);
}

#[tokio::test]
async fn test_hit_after_fill() {
    let cache = new_cache(16);
    let builds = AtomicUsize::new(0);

    for _ in 0..3 {
        let value = cache
            .get_or_try_insert_with("k".to_string(), || async {
                builds.fetch_add(1, Ordering::SeqCst);
                Ok(Arc::new(vec![7]))
            })
            .await
            .unwrap();
        assert_eq!(*value, vec![7]);
    }

    assert_eq!(builds.load(Ordering::SeqCst), 1);
    let stats = cache.stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_error_shared_and_not_cached() {
    let cache = new_cache(16);
    let builds = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(8));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let cache = Arc::clone(&cache);
        let builds = Arc::clone(&builds);
        let barrier = Arc::clone(&barrier);
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            cache
                .get_or_try_insert_with("bad".to_string(), || async move {
                    builds.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Err(SeisError::MalformedRecord("corrupt".into()))
                })
                .await
        }));
    }

    for handle in handles {
        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err.root(), SeisError::MalformedRecord(_)));
    }
    assert_eq!(builds.load(Ordering::SeqCst), 1);
    assert!(cache.is_empty());

    // Next call builds again and can succeed
    let value = cache
        .get_or_try_insert_with("bad".to_string(), || async { Ok(Arc::new(vec![1])) })
        .await
        .unwrap();
    assert_eq!(*value, vec![1]);
    assert_eq!(cache.stats().failures, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_follower_retries_when_leader_dropped() {
    let cache = new_cache(16);

    // Leader parks forever inside its initializer
    let leader_cache = Arc::clone(&cache);
    let leader = tokio::spawn(async move {
        leader_cache
            .get_or_try_insert_with("k".to_string(), || async {
                std::future::pending::<()>().await;
                Ok(Arc::new(vec![0]))
            })
            .await
    });

    // Wait until the leader has registered
    while cache.in_flight() == 0 {
        tokio::task::yield_now().await;
    }

    let follower_cache = Arc::clone(&cache);
    let follower = tokio::spawn(async move {
        follower_cache
            .get_or_try_insert_with("k".to_string(), || async { Ok(Arc::new(vec![42])) })
            .await
    });

    tokio::time::sleep(Duration::from_millis(20)).await;
    leader.abort();

    let value = tokio::time::timeout(Duration::from_secs(5), follower)
        .await
        .expect("follower finished")
        .unwrap()
        .unwrap();
    assert_eq!(*value, vec![42]);
    assert_eq!(cache.in_flight(), 0);
}

#[tokio::test]
async fn test_distinct_keys_build_independently() {
    let cache = new_cache(16);
    let builds = AtomicUsize::new(0);

    for key in ["a", "b", "c"] {
        cache
            .get_or_try_insert_with(key.to_string(), || async {
                builds.fetch_add(1, Ordering::SeqCst);
                Ok(Arc::new(vec![]))
            })
            .await
            .unwrap();
    }

    assert_eq!(builds.load(Ordering::SeqCst), 3);
    assert_eq!(cache.len(), 3);
}

// =============================================================================
// Eviction Tests
// =============================================================================

#[tokio::test]
async fn test_lru_eviction() {
    let cache = new_cache(2);
    cache.insert("a".into(), Arc::new(vec![1]));
    cache.insert("b".into(), Arc::new(vec![2]));

    // Touch "a" so "b" is least recently used
    assert!(cache.get(&"a".to_string()).is_some());
    cache.insert("c".into(), Arc::new(vec![3]));

    assert_eq!(cache.len(), 2);
    assert!(cache.get(&"a".to_string()).is_some());
    assert!(cache.get(&"b".to_string()).is_none());
    assert!(cache.get(&"c".to_string()).is_some());
}

#[tokio::test]
async fn test_invalidate() {
    let cache = new_cache(4);
    cache.insert("a".into(), Arc::new(vec![1]));

    assert!(cache.invalidate(&"a".to_string()).is_some());
    assert!(cache.is_empty());
}

// =============================================================================
// Generation Clock Tests
// =============================================================================

#[test]
fn test_generation_advance() {
    let clock = GenerationClock::new();
    assert_eq!(clock.current(), 0);
    assert_eq!(clock.advance(), 1);
    assert_eq!(clock.advance(), 2);
    assert_eq!(clock.current(), 2);
}

#[tokio::test]
async fn test_generation_ticker() {
    let clock = Arc::new(GenerationClock::new());
    let ticker = clock.spawn_ticker(Duration::from_millis(20));

    // First tick is one full period away
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(clock.current(), 0);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(clock.current() >= 1);

    drop(clock);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(ticker.is_finished());
}
