//! seisgate Server Binary
//!
//! Wires the caches, fetcher and merge engine together and serves HTTP.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use seisgate::archive::{ArchiveStore, DayFileIndex, LocalArchive};
use seisgate::fetch::{ConcurrentFetcher, ObjectStore};
use seisgate::holdings::ArchiveHoldings;
use seisgate::http::{AppState, HttpServer};
use seisgate::{Config, MergeEngine, NrtCache};
use tracing_subscriber::{fmt, EnvFilter};

/// seisgate Server
#[derive(Parser, Debug)]
#[command(name = "seisgate-server")]
#[command(about = "Two-tier miniSEED waveform server")]
#[command(version)]
struct Args {
    /// Archive root (day files)
    #[arg(short, long, default_value = "./archive")]
    archive_root: String,

    /// NRT root (individual records)
    #[arg(short, long, default_value = "./nrt")]
    nrt_root: String,

    /// Bucket (archive-relative prefix) holding the day files
    #[arg(long, default_value = "")]
    bucket: String,

    /// Listen address (host:port)
    #[arg(short, long, default_value = "127.0.0.1:8080")]
    listen: String,

    /// Hours of data served from the NRT tier
    #[arg(long, default_value = "48")]
    horizon_hours: u64,

    /// Global concurrent download cap
    #[arg(short = 'w', long, default_value = "64")]
    max_workers: usize,

    /// Downloads a single request may run at once
    #[arg(long, default_value = "8")]
    max_workers_per_request: usize,

    /// In-flight memory budget in MB
    #[arg(short = 'm', long, default_value = "1024")]
    max_memory_mb: u64,

    /// Archive files a single request may touch
    #[arg(long, default_value = "20000")]
    max_candidate_files: usize,

    /// Sub-queries a single request may bundle
    #[arg(long, default_value = "1000")]
    max_sub_queries: usize,

    /// Archive days a single request may list
    #[arg(long, default_value = "3660")]
    max_archive_days: u64,

    /// Per-request deadline in seconds
    #[arg(long, default_value = "300")]
    timeout_secs: u64,
}

#[tokio::main]
async fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,seisgate=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("seisgate server v{}", seisgate::VERSION);
    tracing::info!("Archive root: {}", args.archive_root);
    tracing::info!("NRT root: {}", args.nrt_root);
    tracing::info!("Listen address: {}", args.listen);

    // Build config from args
    let config = Config::builder()
        .archive_root(&args.archive_root)
        .nrt_root(&args.nrt_root)
        .archive_bucket(&args.bucket)
        .listen_addr(&args.listen)
        .horizon(Duration::from_secs(args.horizon_hours * 3600))
        .max_workers(args.max_workers)
        .max_workers_per_request(args.max_workers_per_request)
        .max_bytes(args.max_memory_mb * 1024 * 1024)
        .max_candidate_files(args.max_candidate_files)
        .max_sub_queries(args.max_sub_queries)
        .max_archive_days(args.max_archive_days)
        .request_timeout(Duration::from_secs(args.timeout_secs))
        .build();

    if let Err(e) = config.validate() {
        tracing::error!("Invalid configuration: {}", e);
        std::process::exit(1);
    }

    // Archive tier
    let archive = match LocalArchive::new(&config.archive_root).with_bucket(&config.archive_bucket) {
        Ok(archive) => Arc::new(archive),
        Err(e) => {
            tracing::error!("Invalid archive bucket: {}", e);
            std::process::exit(1);
        }
    };
    let index = Arc::new(DayFileIndex::new(
        Arc::clone(&archive) as Arc<dyn ArchiveStore>,
        config.index_cache_capacity,
        config.listing_cache_capacity,
    ));
    index.spawn_generation_ticker(config.generation_interval);

    // NRT tier
    let nrt = Arc::new(NrtCache::new(
        &config.nrt_root,
        config.listing_cache_capacity,
        config.record_cache_capacity,
    ));
    match nrt.refresh().await {
        Ok(count) => tracing::info!("NRT identities: {}", count),
        Err(e) => tracing::warn!("Initial NRT scan failed: {}", e),
    }
    nrt.spawn_refresh(config.nrt_refresh_interval);
    nrt.spawn_generation_ticker(config.generation_interval);

    // Fetcher and merge engine
    let fetcher = Arc::new(ConcurrentFetcher::new(
        archive as Arc<dyn ObjectStore>,
        config.fetch_config(),
    ));
    let holdings = Arc::new(ArchiveHoldings::new(index));
    let engine = Arc::new(MergeEngine::new(&config, nrt, holdings, fetcher));

    tracing::info!("Engine initialized successfully");

    let state = Arc::new(AppState {
        engine,
        request_timeout: config.request_timeout,
    });
    let server = match HttpServer::bind(&config.listen_addr, state).await {
        Ok(server) => server,
        Err(e) => {
            tracing::error!("Failed to start server: {}", e);
            std::process::exit(1);
        }
    };

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("Received Ctrl+C, initiating shutdown...");
    };

    if let Err(e) = server.run(shutdown).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }

    tracing::info!("Server stopped");
}
