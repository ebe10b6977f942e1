//! Shared fixtures for integration tests
//!
//! - Record and day-file builders
//! - In-memory archive / object store that counts calls and can add latency

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, TimeZone, Utc};
use parking_lot::Mutex;
use rand::Rng;

use seisgate::archive::{ArchiveStore, DayFile};
use seisgate::fetch::ObjectStore;
use seisgate::record::RecordHeader;
use seisgate::{Result, SeisError, StreamIdentity};

// =============================================================================
// Record Builders
// =============================================================================

pub fn identity(network: &str, station: &str, location: &str, channel: &str) -> StreamIdentity {
    StreamIdentity::new(network, station, location, channel)
}

pub fn anmo() -> StreamIdentity {
    identity("IU", "ANMO", "00", "BHZ")
}

/// UTC timestamp with microsecond precision
pub fn ts(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32, micros: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap() + ChronoDuration::microseconds(micros as i64)
}

pub fn day(y: i32, mo: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, mo, d).unwrap()
}

/// One encoded 512-byte record
pub fn record(
    identity: &StreamIdentity,
    start: DateTime<Utc>,
    samples: u16,
    rate: f64,
) -> Vec<u8> {
    RecordHeader::new(identity.clone(), start, samples, rate)
        .encode()
        .to_vec()
}

/// Concatenated records with increasing sequence numbers
pub fn day_file_bytes(
    identity: &StreamIdentity,
    starts: &[DateTime<Utc>],
    samples: u16,
    rate: f64,
) -> Vec<u8> {
    let mut out = Vec::with_capacity(starts.len() * 512);
    for (i, start) in starts.iter().enumerate() {
        let mut header = RecordHeader::new(identity.clone(), *start, samples, rate);
        header.sequence = i as u32 + 1;
        out.extend_from_slice(&header.encode());
    }
    out
}

/// `count` back-to-back records of `samples` at `rate`, starting at `first`
pub fn contiguous_starts(
    first: DateTime<Utc>,
    count: usize,
    samples: u16,
    rate: f64,
) -> Vec<DateTime<Utc>> {
    let step = ChronoDuration::nanoseconds((samples as f64 / rate * 1e9).round() as i64);
    (0..count).map(|i| first + step * i as i32).collect()
}

/// Leading record starts of the 2016-03-19 IU.ANMO.00.BHZ day file
pub fn anmo_2016_079_starts() -> Vec<DateTime<Utc>> {
    vec![
        ts(2016, 3, 19, 0, 0, 1, 968_393),
        ts(2016, 3, 19, 0, 0, 6, 928_393),
        ts(2016, 3, 19, 0, 0, 11, 888_393),
    ]
}

// =============================================================================
// In-Memory Store
// =============================================================================

struct StoredFile {
    data: Bytes,
    modified: DateTime<Utc>,
}

/// Archive and object store held in memory
///
/// Counts calls per primitive, tracks concurrent `get_object` calls and can
/// inject random latency or per-key failures.
#[derive(Default)]
pub struct MemoryStore {
    files: Mutex<HashMap<DayFile, StoredFile>>,
    objects: Mutex<HashMap<String, Bytes>>,
    failing: Mutex<HashSet<String>>,
    latency_ms: Mutex<Option<(u64, u64)>>,

    pub fetch_whole_calls: AtomicUsize,
    pub fetch_range_calls: AtomicUsize,
    pub list_calls: AtomicUsize,
    pub get_object_calls: AtomicUsize,
    in_flight: AtomicUsize,
    pub peak_in_flight: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Random latency in `[min_ms, max_ms]` on every read
    pub fn set_latency(&self, min_ms: u64, max_ms: u64) {
        *self.latency_ms.lock() = Some((min_ms, max_ms));
    }

    /// Store a day file; also addressable as an object under its key
    pub fn put_day_file(&self, file: &DayFile, data: Vec<u8>, modified: DateTime<Utc>) {
        let data = Bytes::from(data);
        self.objects.lock().insert(file.to_string(), data.clone());
        self.files
            .lock()
            .insert(file.clone(), StoredFile { data, modified });
    }

    pub fn remove_day_file(&self, file: &DayFile) {
        self.files.lock().remove(file);
        self.objects.lock().remove(&file.to_string());
    }

    pub fn put_object(&self, key: &str, data: Vec<u8>) {
        self.objects.lock().insert(key.to_string(), Bytes::from(data));
    }

    /// Make `get_object` fail for `key` with a storage error
    pub fn fail_object(&self, key: &str) {
        self.failing.lock().insert(key.to_string());
    }

    pub fn calls(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    async fn delay(&self) {
        let bounds = *self.latency_ms.lock();
        if let Some((min, max)) = bounds {
            let ms = rand::thread_rng().gen_range(min..=max);
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }

    fn stored(&self, file: &DayFile) -> Result<(Bytes, DateTime<Utc>)> {
        self.files
            .lock()
            .get(file)
            .map(|f| (f.data.clone(), f.modified))
            .ok_or_else(|| SeisError::NotFound(file.to_string()))
    }
}

#[async_trait]
impl ArchiveStore for MemoryStore {
    async fn fetch_whole(&self, file: &DayFile) -> Result<Bytes> {
        self.fetch_whole_calls.fetch_add(1, Ordering::SeqCst);
        self.delay().await;
        Ok(self.stored(file)?.0)
    }

    async fn modified_time(&self, file: &DayFile) -> Result<DateTime<Utc>> {
        Ok(self.stored(file)?.1)
    }

    async fn fetch_range(&self, file: &DayFile, from: u64, to: u64) -> Result<Bytes> {
        self.fetch_range_calls.fetch_add(1, Ordering::SeqCst);
        let data = self.stored(file)?.0;
        let end = (to as usize).min(data.len());
        let start = (from as usize).min(end);
        Ok(data.slice(start..end))
    }

    async fn list_identities(&self, date: NaiveDate) -> Result<Vec<StreamIdentity>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.delay().await;
        Ok(self
            .files
            .lock()
            .keys()
            .filter(|f| f.date == date)
            .map(|f| f.identity.clone())
            .collect())
    }

    fn object_key(&self, file: &DayFile) -> String {
        file.to_string()
    }

    async fn object_size(&self, file: &DayFile) -> Result<u64> {
        Ok(self.stored(file)?.0.len() as u64)
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get_object(&self, _bucket: &str, _version: Option<&str>, key: &str) -> Result<Bytes> {
        self.get_object_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        self.delay().await;

        let result = if self.failing.lock().contains(key) {
            Err(SeisError::Storage(format!("injected failure for {}", key)))
        } else {
            self.objects
                .lock()
                .get(key)
                .cloned()
                .ok_or_else(|| SeisError::NotFound(key.to_string()))
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}
