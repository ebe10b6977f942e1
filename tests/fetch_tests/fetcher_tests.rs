//! Tests for the concurrent fetcher and memory pool
//!
//! These tests verify:
//! - Results arrive in request order whatever the completion order
//! - Oversized batches are rejected before any download
//! - Reserved memory never exceeds the budget
//! - A request never uses more than its share of workers
//! - Per-object failures travel inside the result
//! - Cancellation stops new assignments and closes the stream
//! - Workers and memory are returned once a request finishes

#[path = "../common/mod.rs"]
mod common;

use std::sync::Arc;
use std::time::Duration;

use common::MemoryStore;
use seisgate::fetch::{
    ConcurrentFetcher, FetchConfig, HydratedFile, MemoryPool, ObjectRequest,
};
use seisgate::SeisError;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

// =============================================================================
// Helper Functions
// =============================================================================

/// 8 workers, 3 per request, 8 chunks of 1 KiB
fn small_config() -> FetchConfig {
    FetchConfig {
        max_workers: 8,
        max_workers_per_request: 3,
        max_bytes: 8 * 1024,
    }
}

/// Store holding `count` objects `obj-00`, `obj-01`, ... of `size` bytes,
/// each filled with its own index
fn store_with_objects(count: usize, size: usize) -> (Arc<MemoryStore>, Vec<ObjectRequest>) {
    let store = MemoryStore::new();
    let mut requests = Vec::new();
    for i in 0..count {
        let key = format!("obj-{:02}", i);
        store.put_object(&key, vec![i as u8; size]);
        requests.push(ObjectRequest::new(key, size as u64));
    }
    (store, requests)
}

async fn collect(mut rx: mpsc::Receiver<HydratedFile>) -> Vec<HydratedFile> {
    let mut out = Vec::new();
    while let Some(file) = rx.recv().await {
        out.push(file);
    }
    out
}

async fn wait_until_idle(fetcher: &ConcurrentFetcher) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while fetcher.idle_workers() < fetcher.config().max_workers
            || fetcher.memory().reserved_bytes() > 0
        {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("workers and memory returned");
}

// =============================================================================
// Memory Pool Tests
// =============================================================================

#[test]
fn test_chunk_size_from_config() {
    assert_eq!(small_config().chunk_size(), 1024);
    assert_eq!(FetchConfig::default().chunk_size(), 16 * 1024 * 1024);

    let tiny = FetchConfig {
        max_workers: 10,
        max_workers_per_request: 1,
        max_bytes: 3,
    };
    assert_eq!(tiny.chunk_size(), 1);
}

#[test]
fn test_chunks_for_rounds_up() {
    let pool = MemoryPool::new(1024, 8);
    assert_eq!(pool.chunks_for(0), 1);
    assert_eq!(pool.chunks_for(1), 1);
    assert_eq!(pool.chunks_for(1024), 1);
    assert_eq!(pool.chunks_for(1025), 2);
    assert_eq!(pool.chunks_for(8 * 1024), 8);
}

#[tokio::test]
async fn test_reservation_split_and_release() {
    let pool = MemoryPool::new(1024, 8);

    let mut reservation = pool.reserve(5).await.unwrap();
    assert_eq!(pool.available_chunks(), 3);
    assert_eq!(pool.reserved_bytes(), 5 * 1024);

    let part = reservation.split(2);
    assert_eq!(part.chunks(), 2);
    assert_eq!(reservation.chunks(), 3);

    drop(part);
    assert_eq!(pool.available_chunks(), 5);
    drop(reservation);
    assert_eq!(pool.available_chunks(), 8);
    assert_eq!(pool.reserved_bytes(), 0);
    assert_eq!(pool.peak_reserved_bytes(), 5 * 1024);
}

#[tokio::test]
async fn test_reserve_beyond_pool_fails() {
    let pool = MemoryPool::new(1024, 8);

    match pool.reserve(9).await {
        Err(SeisError::CapacityExceeded { found, limit, .. }) => {
            assert_eq!((found, limit), (9, 8));
        }
        other => panic!("expected CapacityExceeded, got {:?}", other.map(|r| r.chunks())),
    }
}

#[tokio::test]
async fn test_reserve_waits_for_release() {
    let pool = MemoryPool::new(1024, 4);
    let held = pool.reserve(3).await.unwrap();

    let waiter = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.reserve(2).await.map(|r| r.chunks()) })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(!waiter.is_finished());

    drop(held);
    let chunks = tokio::time::timeout(Duration::from_secs(5), waiter)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(chunks, 2);
}

// =============================================================================
// Ordering Tests
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_results_in_request_order() {
    let (store, requests) = store_with_objects(8, 512);
    store.set_latency(1, 40);
    let fetcher = ConcurrentFetcher::new(store.clone(), small_config());

    let rx = fetcher
        .get_all_concurrently("bucket", None, requests.clone(), CancellationToken::new())
        .await
        .unwrap();
    let files = collect(rx).await;

    assert_eq!(files.len(), 8);
    for (i, (file, request)) in files.iter().zip(&requests).enumerate() {
        assert_eq!(file.key, request.key);
        let data = file.data.as_ref().unwrap();
        assert_eq!(data.len(), 512);
        assert!(data.iter().all(|b| *b == i as u8));
    }
    assert_eq!(MemoryStore::calls(&store.get_object_calls), 8);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_per_request_worker_bound() {
    let (store, requests) = store_with_objects(8, 100);
    store.set_latency(10, 20);
    let fetcher = ConcurrentFetcher::new(store.clone(), small_config());

    let rx = fetcher
        .get_all_concurrently("bucket", None, requests, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(collect(rx).await.len(), 8);

    let peak = MemoryStore::calls(&store.peak_in_flight);
    assert!(peak >= 1 && peak <= 3, "peak in flight was {}", peak);
}

#[tokio::test]
async fn test_empty_request_closes_immediately() {
    let (store, _) = store_with_objects(0, 0);
    let fetcher = ConcurrentFetcher::new(store, small_config());

    let rx = fetcher
        .get_all_concurrently("bucket", None, Vec::new(), CancellationToken::new())
        .await
        .unwrap();
    assert!(collect(rx).await.is_empty());
}

// =============================================================================
// Capacity Tests
// =============================================================================

#[tokio::test]
async fn test_batch_over_budget_rejected() {
    // 5 objects of 2000 bytes need 2 chunks each
    let (store, requests) = store_with_objects(5, 2000);
    let fetcher = ConcurrentFetcher::new(store.clone(), small_config());

    let err = fetcher
        .get_all_concurrently("bucket", None, requests, CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        SeisError::CapacityExceeded { found, limit, .. } => {
            assert_eq!(found, 10);
            assert_eq!(limit, 8);
        }
        other => panic!("expected CapacityExceeded, got {:?}", other),
    }
    assert_eq!(MemoryStore::calls(&store.get_object_calls), 0);
    assert_eq!(fetcher.memory().reserved_bytes(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_share_budget() {
    let (store, requests) = store_with_objects(6, 1024);
    store.set_latency(5, 25);
    let fetcher = Arc::new(ConcurrentFetcher::new(store.clone(), small_config()));

    // Two requests of 6 chunks each cannot both hold memory at once
    let mut handles = Vec::new();
    for _ in 0..2 {
        let fetcher = Arc::clone(&fetcher);
        let requests = requests.clone();
        handles.push(tokio::spawn(async move {
            let rx = fetcher
                .get_all_concurrently("bucket", None, requests, CancellationToken::new())
                .await
                .unwrap();
            collect(rx).await
        }));
    }

    for handle in handles {
        let files = handle.await.unwrap();
        assert_eq!(files.len(), 6);
        assert!(files.iter().all(|f| f.data.is_ok()));
    }

    let max_bytes = small_config().max_bytes;
    assert!(fetcher.memory().peak_reserved_bytes() <= max_bytes);
    assert!(fetcher.memory().peak_reserved_bytes() >= 6 * 1024);
    wait_until_idle(&fetcher).await;
}

// =============================================================================
// Failure and Cancellation Tests
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_object_errors_stay_in_place() {
    let (store, mut requests) = store_with_objects(4, 256);
    store.fail_object("obj-01");
    requests.insert(3, ObjectRequest::new("missing", 10));
    store.set_latency(1, 15);
    let fetcher = ConcurrentFetcher::new(store.clone(), small_config());

    let rx = fetcher
        .get_all_concurrently("bucket", Some("v1"), requests, CancellationToken::new())
        .await
        .unwrap();
    let files = collect(rx).await;

    let keys: Vec<_> = files.iter().map(|f| f.key.as_str()).collect();
    assert_eq!(keys, vec!["obj-00", "obj-01", "obj-02", "missing", "obj-03"]);
    assert!(files[0].data.is_ok());
    assert!(matches!(files[1].data, Err(SeisError::Storage(_))));
    assert!(files[2].data.is_ok());
    assert!(files[3].data.as_ref().unwrap_err().is_not_found());
    assert!(files[4].data.is_ok());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cancel_stops_assignments() {
    let (store, requests) = store_with_objects(8, 100);
    store.set_latency(50, 50);
    let config = FetchConfig {
        max_workers_per_request: 1,
        ..small_config()
    };
    let fetcher = ConcurrentFetcher::new(store.clone(), config);
    let cancel = CancellationToken::new();

    let rx = fetcher
        .get_all_concurrently("bucket", None, requests.clone(), cancel.clone())
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    cancel.cancel();

    let files = tokio::time::timeout(Duration::from_secs(5), collect(rx))
        .await
        .expect("stream closes after cancel");

    assert!(!files.is_empty() && files.len() < 8, "got {} files", files.len());
    for (file, request) in files.iter().zip(&requests) {
        assert_eq!(file.key, request.key);
        assert!(file.data.is_ok());
    }
    wait_until_idle(&fetcher).await;
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let (store, requests) = store_with_objects(2, 100);
    let fetcher = ConcurrentFetcher::new(store.clone(), small_config());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = fetcher
        .get_all_concurrently("bucket", None, requests, cancel)
        .await;

    assert!(matches!(result, Err(SeisError::Cancelled)));
    assert_eq!(MemoryStore::calls(&store.get_object_calls), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_workers_and_memory_returned() {
    let (store, requests) = store_with_objects(5, 700);
    store.set_latency(1, 10);
    let fetcher = ConcurrentFetcher::new(store.clone(), small_config());

    for _ in 0..3 {
        let rx = fetcher
            .get_all_concurrently("bucket", None, requests.clone(), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(collect(rx).await.len(), 5);
    }

    wait_until_idle(&fetcher).await;
    assert_eq!(fetcher.idle_workers(), 8);
    assert_eq!(fetcher.memory().available_chunks(), 8);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_dropped_receiver_releases_resources() {
    let (store, requests) = store_with_objects(6, 100);
    store.set_latency(10, 20);
    let fetcher = ConcurrentFetcher::new(store.clone(), small_config());

    let mut rx = fetcher
        .get_all_concurrently("bucket", None, requests, CancellationToken::new())
        .await
        .unwrap();
    assert!(rx.recv().await.is_some());
    drop(rx);

    wait_until_idle(&fetcher).await;
}
