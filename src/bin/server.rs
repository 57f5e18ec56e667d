//! SPQueue Server Binary
//!
//! Starts the TCP server for SPQueue.

use std::sync::Arc;

use clap::Parser;
use spqueue::network::Server;
use spqueue::{Config, HealthMonitor, QueueRegistry, QueueType, WalSyncStrategy};
use tracing_subscriber::{fmt, EnvFilter};

/// SPQueue Server
#[derive(Parser, Debug)]
#[command(name = "spqueue-server")]
#[command(about = "Sorting priority queue service")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./spqueue_data")]
    data_dir: String,

    /// Listen address (host:port)
    #[arg(short, long, default_value = "127.0.0.1:9090")]
    listen: String,

    /// Maximum concurrent connections
    #[arg(short, long, default_value = "1024")]
    max_connections: usize,

    /// WAL entries per queue before a snapshot is taken
    #[arg(short = 's', long, default_value = "10000")]
    snapshot_threshold: u64,

    /// fsync the WAL every N entries instead of on every write
    #[arg(long)]
    sync_every: Option<usize>,

    /// Max time a WAL write or fsync may take, in milliseconds
    #[arg(long, default_value = "5000")]
    wal_timeout_ms: u64,

    /// Queue lock timeout in milliseconds
    #[arg(long, default_value = "5000")]
    lock_timeout_ms: u64,

    /// Type of the default queue (durable | in-memory)
    #[arg(long, default_value = "durable")]
    default_queue_type: QueueType,

    /// Feature names of the default queue, highest precedence first
    #[arg(long, value_delimiter = ',', default_value = "feature_name")]
    default_features: Vec<String>,

    /// Interval between health Watch events in milliseconds
    #[arg(long, default_value = "1000")]
    watch_interval_ms: u64,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,spqueue=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("SPQueue Server v{}", spqueue::VERSION);
    tracing::info!("Data directory: {}", args.data_dir);
    tracing::info!("Listen address: {}", args.listen);

    let sync_strategy = match args.sync_every {
        Some(count) if count > 1 => WalSyncStrategy::EveryNEntries { count },
        _ => WalSyncStrategy::EveryWrite,
    };

    // Build config from args
    let config = Config::builder()
        .data_dir(&args.data_dir)
        .listen_addr(&args.listen)
        .max_connections(args.max_connections)
        .snapshot_threshold(args.snapshot_threshold)
        .wal_sync_strategy(sync_strategy)
        .wal_timeout_ms(args.wal_timeout_ms)
        .lock_timeout_ms(args.lock_timeout_ms)
        .default_queue_type(args.default_queue_type)
        .default_queue_features(args.default_features)
        .watch_interval_ms(args.watch_interval_ms)
        .build();

    // Open registry (recovers the default queue)
    let registry = match QueueRegistry::open(config.clone()) {
        Ok(r) => Arc::new(r),
        Err(e) => {
            tracing::error!("Failed to open queue registry: {}", e);
            std::process::exit(1);
        }
    };

    let health = Arc::new(HealthMonitor::from_config(&config));

    tracing::info!("Registry initialized successfully");

    let server = match Server::bind(config, registry, health) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("Failed to start server: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = server.run() {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }

    tracing::info!("Server stopped");
}
