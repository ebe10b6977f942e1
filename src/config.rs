//! Configuration for seisgate
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Result, SeisError};
use crate::fetch::FetchConfig;

/// Main configuration for a seisgate instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root of the archive day files
    /// Internal structure:
    ///   {archive_root}/YYYY/NET/STA/CHA.D/NET.STA.LOC.CHA.D.YYYY.DDD
    pub archive_root: PathBuf,

    /// Root of the near-real-time record store
    /// Internal structure:
    ///   {nrt_root}/NET/STA/LOC/CHA/<Weekday>/<HH>/<startNanos>-<endNanos>
    pub nrt_root: PathBuf,

    /// Bucket (root-relative directory) holding the day files; used both for
    /// listing and for the fetcher's object reads
    pub archive_bucket: String,

    /// Boundary between the NRT tier and the archive tier (now - horizon)
    pub horizon: Duration,

    // -------------------------------------------------------------------------
    // Fetcher Configuration
    // -------------------------------------------------------------------------
    /// Global cap on concurrent object downloads
    pub max_workers: usize,

    /// How many of those workers a single request may borrow
    pub max_workers_per_request: usize,

    /// Global in-flight memory budget (bytes), split into `max_workers` chunks
    pub max_bytes: u64,

    // -------------------------------------------------------------------------
    // Request Limits
    // -------------------------------------------------------------------------
    /// Max archive files a single request may resolve to
    pub max_candidate_files: usize,

    /// Max sub-queries bundled in a single request
    pub max_sub_queries: usize,

    /// Max archive days (summed over sub-queries) a single request may list
    pub max_archive_days: u64,

    /// Per-request deadline
    pub request_timeout: Duration,

    // -------------------------------------------------------------------------
    // Cache Configuration
    // -------------------------------------------------------------------------
    /// How often the NRT identity list is rescanned
    pub nrt_refresh_interval: Duration,

    /// How often listing cache generations advance
    pub generation_interval: Duration,

    /// Max cached record indexes
    pub index_cache_capacity: usize,

    /// Max cached listings (archive days + NRT identities)
    pub listing_cache_capacity: usize,

    /// Max cached NRT record payloads
    pub record_cache_capacity: usize,

    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// HTTP listen address
    pub listen_addr: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            archive_root: PathBuf::from("./archive"),
            nrt_root: PathBuf::from("./nrt"),
            archive_bucket: String::new(),
            horizon: Duration::from_secs(48 * 3600),
            max_workers: 64,
            max_workers_per_request: 8,
            max_bytes: 1024 * 1024 * 1024, // 1 GB
            max_candidate_files: 20_000,
            max_sub_queries: 1_000,
            max_archive_days: 3_660,
            request_timeout: Duration::from_secs(300),
            nrt_refresh_interval: Duration::from_secs(60),
            generation_interval: Duration::from_secs(60),
            index_cache_capacity: 10_000,
            listing_cache_capacity: 50_000,
            record_cache_capacity: 100_000,
            listen_addr: "127.0.0.1:8080".to_string(),
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Reject settings the fetcher or caches cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.max_workers == 0 {
            return Err(SeisError::Config("max_workers must be at least 1".into()));
        }
        if self.max_workers_per_request == 0 {
            return Err(SeisError::Config(
                "max_workers_per_request must be at least 1".into(),
            ));
        }
        if self.max_workers_per_request > self.max_workers {
            return Err(SeisError::Config(format!(
                "max_workers_per_request ({}) exceeds max_workers ({})",
                self.max_workers_per_request, self.max_workers
            )));
        }
        if self.max_bytes < self.max_workers as u64 {
            return Err(SeisError::Config(format!(
                "max_bytes ({}) is smaller than one byte per worker ({})",
                self.max_bytes, self.max_workers
            )));
        }
        if chrono::Duration::from_std(self.horizon).is_err() {
            return Err(SeisError::Config(format!(
                "horizon ({:?}) is out of range",
                self.horizon
            )));
        }
        if self.max_archive_days == 0 {
            return Err(SeisError::Config("max_archive_days must be at least 1".into()));
        }
        if self.index_cache_capacity == 0
            || self.listing_cache_capacity == 0
            || self.record_cache_capacity == 0
        {
            return Err(SeisError::Config("cache capacities must be non-zero".into()));
        }
        Ok(())
    }

    /// Fetcher settings derived from this config
    pub fn fetch_config(&self) -> FetchConfig {
        FetchConfig {
            max_workers: self.max_workers,
            max_workers_per_request: self.max_workers_per_request,
            max_bytes: self.max_bytes,
        }
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the archive root directory
    pub fn archive_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.archive_root = path.into();
        self
    }

    /// Set the NRT root directory
    pub fn nrt_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.nrt_root = path.into();
        self
    }

    /// Set the archive bucket
    pub fn archive_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.config.archive_bucket = bucket.into();
        self
    }

    /// Set the NRT/archive horizon
    pub fn horizon(mut self, horizon: Duration) -> Self {
        self.config.horizon = horizon;
        self
    }

    /// Set the global worker cap
    pub fn max_workers(mut self, count: usize) -> Self {
        self.config.max_workers = count;
        self
    }

    /// Set the per-request worker cap
    pub fn max_workers_per_request(mut self, count: usize) -> Self {
        self.config.max_workers_per_request = count;
        self
    }

    /// Set the global memory budget (in bytes)
    pub fn max_bytes(mut self, bytes: u64) -> Self {
        self.config.max_bytes = bytes;
        self
    }

    /// Set the candidate file limit
    pub fn max_candidate_files(mut self, count: usize) -> Self {
        self.config.max_candidate_files = count;
        self
    }

    /// Set the sub-query limit
    pub fn max_sub_queries(mut self, count: usize) -> Self {
        self.config.max_sub_queries = count;
        self
    }

    /// Set the archive day limit
    pub fn max_archive_days(mut self, days: u64) -> Self {
        self.config.max_archive_days = days;
        self
    }

    /// Set the per-request deadline
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Set the NRT rescan interval
    pub fn nrt_refresh_interval(mut self, interval: Duration) -> Self {
        self.config.nrt_refresh_interval = interval;
        self
    }

    /// Set the listing generation interval
    pub fn generation_interval(mut self, interval: Duration) -> Self {
        self.config.generation_interval = interval;
        self
    }

    /// Set the index cache capacity (entries)
    pub fn index_cache_capacity(mut self, capacity: usize) -> Self {
        self.config.index_cache_capacity = capacity;
        self
    }

    /// Set the listing cache capacity (entries)
    pub fn listing_cache_capacity(mut self, capacity: usize) -> Self {
        self.config.listing_cache_capacity = capacity;
        self
    }

    /// Set the NRT record cache capacity (entries)
    pub fn record_cache_capacity(mut self, capacity: usize) -> Self {
        self.config.record_cache_capacity = capacity;
        self
    }

    /// Set the HTTP listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
