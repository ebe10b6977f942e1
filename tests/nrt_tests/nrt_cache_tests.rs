//! Tests for the NRT layout and cache
//!
//! These tests verify:
//! - Record paths follow the weekday/hour layout
//! - Written records are found after a refresh
//! - Only records fully inside the window are served
//! - Records deleted between listing and fetch are skipped
//! - Listings are stable within a generation

#[path = "../common/mod.rs"]
mod common;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use common::{anmo, identity, record, ts};
use seisgate::nrt::{parse_record_name, record_path, write_record};
use seisgate::{IdentityPattern, NrtCache, SeisError};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

/// Write `count` one-minute records of IU.ANMO.00.BHZ starting at 2016-03-19T07:00
async fn write_minutes(root: &std::path::Path, count: u32) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    for minute in 0..count {
        let start = ts(2016, 3, 19, 7, minute, 0, 0);
        // 60 samples at 1 Hz ends 59 s after the start
        let path = write_record(root, &record(&anmo(), start, 60, 1.0))
            .await
            .unwrap();
        paths.push(path);
    }
    paths
}

async fn refreshed_cache(root: &std::path::Path) -> NrtCache {
    let cache = NrtCache::new(root, 16, 64);
    cache.refresh().await.unwrap();
    cache
}

// =============================================================================
// Layout Tests
// =============================================================================

#[test]
fn test_record_path_layout() {
    let start = ts(2016, 3, 19, 7, 15, 0, 0);
    let end = ts(2016, 3, 19, 7, 15, 59, 0);
    let path = record_path(
        std::path::Path::new("/nrt"),
        &identity("IU", "ANMO", "", "BHZ"),
        start,
        end,
    )
    .unwrap();

    let expected = format!(
        "/nrt/IU/ANMO/--/BHZ/Saturday/07/{}-{}",
        start.timestamp_nanos_opt().unwrap(),
        end.timestamp_nanos_opt().unwrap()
    );
    assert_eq!(path, PathBuf::from(expected));
}

#[test]
fn test_parse_record_name() {
    let start = ts(2016, 3, 19, 7, 15, 0, 0);
    let end = ts(2016, 3, 19, 7, 15, 59, 0);
    let name = format!(
        "{}-{}",
        start.timestamp_nanos_opt().unwrap(),
        end.timestamp_nanos_opt().unwrap()
    );

    assert_eq!(parse_record_name(&name), Some((start, end)));
    assert_eq!(parse_record_name("5-5").map(|(s, e)| s == e), Some(true));
    assert_eq!(parse_record_name("9-3"), None);
    assert_eq!(parse_record_name("notes.txt"), None);
    assert_eq!(parse_record_name("12-"), None);
    assert_eq!(parse_record_name("1-2.tmp"), None);
}

#[tokio::test]
async fn test_write_record_rejects_wrong_length() {
    let dir = TempDir::new().unwrap();
    let block = record(&anmo(), ts(2016, 3, 19, 7, 0, 0, 0), 60, 1.0);

    let result = write_record(dir.path(), &block[..256]).await;
    assert!(matches!(result, Err(SeisError::MalformedRecord(_))));
}

// =============================================================================
// Identity Listing Tests
// =============================================================================

#[tokio::test]
async fn test_refresh_finds_written_identities() {
    let dir = TempDir::new().unwrap();
    write_minutes(dir.path(), 1).await;
    let wlf = identity("GE", "WLF", "", "HHZ");
    write_record(dir.path(), &record(&wlf, ts(2016, 3, 19, 7, 0, 0, 0), 100, 100.0))
        .await
        .unwrap();

    let cache = NrtCache::new(dir.path(), 16, 64);
    assert!(cache.identities().is_empty());
    assert_eq!(cache.refresh().await.unwrap(), 2);
    assert_eq!(*cache.identities(), vec![wlf.clone(), anmo()]);

    assert!(dir.path().join("GE/WLF/--/HHZ").is_dir());

    let pattern = IdentityPattern::from_glob("GE", "*", "--", "HH?").unwrap();
    assert_eq!(cache.list(&pattern), vec![wlf]);
}

#[tokio::test]
async fn test_list_patterns() {
    let dir = TempDir::new().unwrap();
    write_minutes(dir.path(), 1).await;
    let cache = refreshed_cache(dir.path()).await;

    assert_eq!(
        cache.list_patterns(&["IU", "AN.*", "00", "BH[ZNE]"]).unwrap(),
        vec![anmo()]
    );
    assert!(cache
        .list_patterns(&["IU", "ANM", "00", "BHZ"])
        .unwrap()
        .is_empty());

    match cache.list_patterns(&["IU", "(", "00", "BHZ"]) {
        Err(SeisError::InvalidPattern { field, .. }) => assert_eq!(field, "station"),
        other => panic!("expected InvalidPattern, got {:?}", other),
    }
}

#[tokio::test]
async fn test_refresh_of_missing_root_is_empty() {
    let dir = TempDir::new().unwrap();
    let cache = NrtCache::new(dir.path().join("absent"), 4, 4);

    assert_eq!(cache.refresh().await.unwrap(), 0);
}

#[tokio::test]
async fn test_periodic_refresh_picks_up_new_identities() {
    let dir = TempDir::new().unwrap();
    let cache = Arc::new(NrtCache::new(dir.path(), 16, 64));
    let task = cache.spawn_refresh(Duration::from_millis(20));

    write_minutes(dir.path(), 1).await;
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(*cache.identities(), vec![anmo()]);

    drop(cache);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(task.is_finished());
}

// =============================================================================
// Record Tests
// =============================================================================

#[tokio::test]
async fn test_records_fully_inside_window() {
    let dir = TempDir::new().unwrap();
    write_minutes(dir.path(), 5).await;
    let cache = refreshed_cache(dir.path()).await;

    // Window cuts into minute 1 and minute 4: only 2 and 3 lie inside
    let records = cache
        .records(&anmo(), ts(2016, 3, 19, 7, 1, 30, 0), ts(2016, 3, 19, 7, 4, 30, 0))
        .await
        .unwrap();

    let starts: Vec<_> = records.iter().map(|r| r.key.start).collect();
    assert_eq!(
        starts,
        vec![ts(2016, 3, 19, 7, 2, 0, 0), ts(2016, 3, 19, 7, 3, 0, 0)]
    );
    for r in &records {
        assert_eq!(r.key.identity, anmo());
        assert_eq!(r.data.len(), 512);
        assert_eq!(r.end, r.key.start + chrono::Duration::seconds(59));
    }
}

#[tokio::test]
async fn test_get_writes_records_in_order() {
    let dir = TempDir::new().unwrap();
    let paths = write_minutes(dir.path(), 3).await;
    let cache = refreshed_cache(dir.path()).await;

    let mut out = Vec::new();
    let written = cache
        .get(&anmo(), ts(2016, 3, 19, 7, 0, 0, 0), ts(2016, 3, 19, 8, 0, 0, 0), &mut out)
        .await
        .unwrap();

    assert_eq!(written, 3 * 512);
    let mut expected = Vec::new();
    for path in &paths {
        expected.extend(std::fs::read(path).unwrap());
    }
    assert_eq!(out, expected);
}

#[tokio::test]
async fn test_deleted_record_is_skipped() {
    let dir = TempDir::new().unwrap();
    let paths = write_minutes(dir.path(), 3).await;
    let cache = refreshed_cache(dir.path()).await;

    // Populate the listing while touching only minute 0's bytes
    let first = cache
        .records(&anmo(), ts(2016, 3, 19, 7, 0, 0, 0), ts(2016, 3, 19, 7, 0, 59, 0))
        .await
        .unwrap();
    assert_eq!(first.len(), 1);

    std::fs::remove_file(&paths[1]).unwrap();

    let records = cache
        .records(&anmo(), ts(2016, 3, 19, 7, 0, 0, 0), ts(2016, 3, 19, 8, 0, 0, 0))
        .await
        .unwrap();
    let starts: Vec<_> = records.iter().map(|r| r.key.start).collect();
    assert_eq!(
        starts,
        vec![ts(2016, 3, 19, 7, 0, 0, 0), ts(2016, 3, 19, 7, 2, 0, 0)]
    );
}

#[tokio::test]
async fn test_listing_follows_generation() {
    let dir = TempDir::new().unwrap();
    write_minutes(dir.path(), 2).await;
    let cache = refreshed_cache(dir.path()).await;
    let (start, end) = (ts(2016, 3, 19, 7, 0, 0, 0), ts(2016, 3, 19, 8, 0, 0, 0));

    assert_eq!(cache.records(&anmo(), start, end).await.unwrap().len(), 2);

    write_record(dir.path(), &record(&anmo(), ts(2016, 3, 19, 7, 30, 0, 0), 60, 1.0))
        .await
        .unwrap();
    assert_eq!(cache.records(&anmo(), start, end).await.unwrap().len(), 2);

    cache.generation().advance();
    assert_eq!(cache.records(&anmo(), start, end).await.unwrap().len(), 3);
    assert_eq!(cache.listing_stats().fills, 2);
}

#[tokio::test]
async fn test_records_for_unknown_identity_or_inverted_window() {
    let dir = TempDir::new().unwrap();
    write_minutes(dir.path(), 2).await;
    let cache = refreshed_cache(dir.path()).await;

    let unknown = identity("XX", "NONE", "", "HHZ");
    assert!(cache
        .records(&unknown, ts(2016, 3, 19, 0, 0, 0, 0), ts(2016, 3, 20, 0, 0, 0, 0))
        .await
        .unwrap()
        .is_empty());
    assert!(cache
        .records(&anmo(), ts(2016, 3, 19, 8, 0, 0, 0), ts(2016, 3, 19, 7, 0, 0, 0))
        .await
        .unwrap()
        .is_empty());
}
