//! Durable Store
//!
//! Owns the on-disk state of one durable queue: its snapshot and its WAL.
//!
//! ## Responsibilities
//! - Run recovery when the queue is opened and persist the new epoch
//! - Append mutations to the WAL before they are applied in memory
//! - Checkpoint: write a snapshot and truncate the WAL

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::WalSyncStrategy;
use crate::error::{QueueError, Result};
use crate::index::{FeatureSchema, PriorityIndex};
use crate::queue::QueueType;
use crate::wal::{Operation, WalWorker, WalWriter};

use super::{RecoveredState, RecoveryManager, Snapshot, SNAPSHOT_FILENAME, WAL_FILENAME};

/// Persistent half of a durable queue
///
/// Not synchronized; the queue calls it with its write lock held.
pub struct DurableStore {
    name: String,
    schema: FeatureSchema,
    dir: PathBuf,
    wal: WalWorker,
    epoch: u64,
    snapshot_threshold: u64,
}

impl DurableStore {
    /// Open (recovering if needed) the queue stored in `dir`
    ///
    /// On return the incremented epoch is on disk: a fresh snapshot holding
    /// the recovered items has replaced the old one and the WAL is empty.
    /// Every later WAL write gives up after `wal_timeout`.
    pub fn open(
        dir: &Path,
        name: &str,
        schema: &FeatureSchema,
        sync_strategy: WalSyncStrategy,
        snapshot_threshold: u64,
        wal_timeout: Duration,
    ) -> Result<(Self, RecoveredState)> {
        fs::create_dir_all(dir).map_err(|e| QueueError::recovery(name, e))?;

        let recovered = RecoveryManager::recover(dir, name, schema)?;

        let wal = WalWriter::resume(&dir.join(WAL_FILENAME), sync_strategy, recovered.last_lsn + 1)
            .and_then(|writer| WalWorker::spawn(writer, wal_timeout))
            .map_err(|e| QueueError::recovery(name, e))?;

        let mut store = Self {
            name: name.to_string(),
            schema: recovered.schema.clone(),
            dir: dir.to_path_buf(),
            wal,
            epoch: recovered.epoch,
            snapshot_threshold,
        };

        store
            .checkpoint(&recovered.index, recovered.next_sequence)
            .map_err(|e| QueueError::recovery(name, e))?;

        tracing::info!(
            "Queue '{}' recovered: epoch={}, items={}, replayed={}, skipped={}, fresh={}",
            name,
            recovered.epoch,
            recovered.index.len(),
            recovered.stats.entries_replayed,
            recovered.stats.entries_skipped,
            recovered.stats.fresh
        );

        Ok((store, recovered))
    }

    /// Append a mutation to the WAL
    ///
    /// Any failure is a `DurabilityFailure`; the caller must not apply the
    /// mutation in memory.
    pub fn append(&mut self, operation: Operation) -> Result<u64> {
        self.wal.append(self.epoch, operation).map_err(|e| {
            tracing::error!("Queue '{}': WAL append failed: {}", self.name, e);
            QueueError::DurabilityFailure(e.to_string())
        })
    }

    /// True once the WAL holds enough entries to be compacted
    pub fn should_checkpoint(&self) -> bool {
        self.wal.entry_count() >= self.snapshot_threshold.max(1)
    }

    /// Write a snapshot of `index` and truncate the WAL
    ///
    /// If the process dies between the two steps, recovery skips the WAL
    /// entries already covered by the snapshot.
    pub fn checkpoint(&mut self, index: &PriorityIndex, next_sequence: u64) -> Result<()> {
        let snapshot = Snapshot {
            name: self.name.clone(),
            queue_type: QueueType::Durable,
            schema: self.schema.clone(),
            epoch: self.epoch,
            last_lsn: self.wal.current_lsn() - 1,
            next_sequence,
            items: index.iter().cloned().collect(),
        };

        snapshot.write(&self.snapshot_path())?;
        self.wal.truncate()?;

        tracing::debug!(
            "Queue '{}': checkpoint at LSN {} with {} items",
            self.name,
            snapshot.last_lsn,
            snapshot.items.len()
        );

        Ok(())
    }

    /// Force the WAL to stable storage
    pub fn sync(&mut self) -> Result<()> {
        self.wal.sync()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Entries in the WAL since the last checkpoint
    pub fn wal_entries(&self) -> u64 {
        self.wal.entry_count()
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.dir.join(SNAPSHOT_FILENAME)
    }

    pub fn wal_path(&self) -> &Path {
        self.wal.path()
    }
}
