//! Configuration for SPQueue
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::queue::QueueType;

/// Main configuration for an SPQueue instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all durable queues
    /// Internal structure:
    ///   {data_dir}/
    ///     └── queues/
    ///         └── {hex(queue name)}/
    ///             ├── snapshot.snap   (latest snapshot)
    ///             └── wal.log         (write-ahead log since the snapshot)
    pub data_dir: PathBuf,

    // -------------------------------------------------------------------------
    // WAL Configuration
    // -------------------------------------------------------------------------
    /// Sync strategy: how often to fsync the WAL
    pub wal_sync_strategy: WalSyncStrategy,

    /// Number of WAL entries after which a queue writes a snapshot and
    /// truncates its log
    pub snapshot_threshold: u64,

    /// Max time a single WAL write or fsync may take before the mutation
    /// fails with a durability error (milliseconds)
    pub wal_timeout_ms: u64,

    // -------------------------------------------------------------------------
    // Queue Configuration
    // -------------------------------------------------------------------------
    /// Max time an operation waits for a queue lock (milliseconds)
    pub lock_timeout_ms: u64,

    /// Type of the reserved default queue
    pub default_queue_type: QueueType,

    /// Feature schema of the reserved default queue
    pub default_queue_features: Vec<String>,

    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// TCP listen address
    pub listen_addr: String,

    /// Max concurrent client connections
    pub max_connections: usize,

    /// Connection read timeout (milliseconds, 0 = none)
    pub read_timeout_ms: u64,

    /// Connection write timeout (milliseconds, 0 = none)
    pub write_timeout_ms: u64,

    // -------------------------------------------------------------------------
    // Health Configuration
    // -------------------------------------------------------------------------
    /// Interval between Watch events (milliseconds)
    pub watch_interval_ms: u64,

    /// Per-subscriber Watch buffer (events)
    pub watch_buffer: usize,

    /// Consecutive full-buffer ticks before a Watch subscriber is evicted
    pub max_missed_ticks: u32,
}

/// WAL sync strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalSyncStrategy {
    /// fsync after every write (safest, slowest)
    EveryWrite,

    /// fsync after N uncommitted entries (balanced durability/performance)
    ///
    /// Acknowledged mutations since the last fsync can be lost on power failure.
    EveryNEntries { count: usize },
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./spqueue_data"),
            wal_sync_strategy: WalSyncStrategy::EveryWrite,
            snapshot_threshold: 10_000,
            wal_timeout_ms: 5000,
            lock_timeout_ms: 5000,
            default_queue_type: QueueType::Durable,
            default_queue_features: vec!["feature_name".to_string()],
            listen_addr: "127.0.0.1:9090".to_string(),
            max_connections: 1024,
            read_timeout_ms: 0,
            write_timeout_ms: 5000,
            watch_interval_ms: 1000,
            watch_buffer: 16,
            max_missed_ticks: 5,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Lock timeout as a Duration
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    /// WAL write timeout as a Duration (never zero)
    pub fn wal_timeout(&self) -> Duration {
        Duration::from_millis(self.wal_timeout_ms.max(1))
    }

    /// Watch interval as a Duration
    pub fn watch_interval(&self) -> Duration {
        Duration::from_millis(self.watch_interval_ms)
    }

    /// Directory holding one sub-directory per durable queue
    pub fn queues_dir(&self) -> PathBuf {
        self.data_dir.join("queues")
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for all storage)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the WAL sync strategy
    pub fn wal_sync_strategy(mut self, strategy: WalSyncStrategy) -> Self {
        self.config.wal_sync_strategy = strategy;
        self
    }

    /// Set the number of WAL entries that triggers a snapshot
    pub fn snapshot_threshold(mut self, entries: u64) -> Self {
        self.config.snapshot_threshold = entries;
        self
    }

    /// Set the WAL write timeout (in milliseconds)
    pub fn wal_timeout_ms(mut self, ms: u64) -> Self {
        self.config.wal_timeout_ms = ms;
        self
    }

    /// Set the queue lock timeout (in milliseconds)
    pub fn lock_timeout_ms(mut self, ms: u64) -> Self {
        self.config.lock_timeout_ms = ms;
        self
    }

    /// Set the type of the default queue
    pub fn default_queue_type(mut self, queue_type: QueueType) -> Self {
        self.config.default_queue_type = queue_type;
        self
    }

    /// Set the feature schema of the default queue
    pub fn default_queue_features<I, S>(mut self, features: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.default_queue_features = features.into_iter().map(Into::into).collect();
        self
    }

    /// Set the TCP listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    /// Set the maximum number of concurrent connections
    pub fn max_connections(mut self, count: usize) -> Self {
        self.config.max_connections = count;
        self
    }

    /// Set the read timeout (in milliseconds)
    pub fn read_timeout_ms(mut self, ms: u64) -> Self {
        self.config.read_timeout_ms = ms;
        self
    }

    /// Set the write timeout (in milliseconds)
    pub fn write_timeout_ms(mut self, ms: u64) -> Self {
        self.config.write_timeout_ms = ms;
        self
    }

    /// Set the Watch event interval (in milliseconds)
    pub fn watch_interval_ms(mut self, ms: u64) -> Self {
        self.config.watch_interval_ms = ms;
        self
    }

    /// Set the per-subscriber Watch buffer
    pub fn watch_buffer(mut self, events: usize) -> Self {
        self.config.watch_buffer = events;
        self
    }

    /// Set how many full-buffer ticks a Watch subscriber survives
    pub fn max_missed_ticks(mut self, ticks: u32) -> Self {
        self.config.max_missed_ticks = ticks;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
