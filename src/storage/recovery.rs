//! Recovery Manager
//!
//! Rebuilds a durable queue from its snapshot and the log written after it.

use std::path::Path;

use crate::error::{QueueError, Result};
use crate::index::{FeatureSchema, Item, PriorityIndex};
use crate::wal::{Operation, RecoveryResult, WalRecovery};

use super::{Snapshot, SNAPSHOT_FILENAME, WAL_FILENAME};

/// State rebuilt from disk
#[derive(Debug)]
pub struct RecoveredState {
    /// Epoch the queue runs in from now on (already incremented)
    pub epoch: u64,
    pub schema: FeatureSchema,
    pub index: PriorityIndex,
    pub next_sequence: u64,
    /// Highest LSN applied; new log entries must use larger LSNs
    pub last_lsn: u64,
    pub stats: RecoveryStats,
}

/// What recovery found
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryStats {
    /// No snapshot and no log existed
    pub fresh: bool,
    /// Items loaded from the snapshot
    pub snapshot_items: usize,
    /// Log entries applied on top of the snapshot
    pub entries_replayed: u64,
    /// Log entries already covered by the snapshot
    pub entries_skipped: u64,
    /// A torn final log write was discarded
    pub torn_tail: bool,
}

/// Rebuilds queue state from a queue directory
pub struct RecoveryManager;

impl RecoveryManager {
    /// Recover the queue stored in `dir`
    ///
    /// 1. Load the snapshot (if any)
    /// 2. Replay log entries with an LSN above the snapshot's, in order
    /// 3. Increment the epoch
    ///
    /// Nothing is written here; the caller persists the new epoch.
    /// `schema` is only used when no prior state exists. Any unreadable or
    /// inconsistent state is a `RecoveryFailure`.
    pub fn recover(dir: &Path, queue_name: &str, schema: &FeatureSchema) -> Result<RecoveredState> {
        let snapshot_path = dir.join(SNAPSHOT_FILENAME);
        let wal_path = dir.join(WAL_FILENAME);

        let snapshot = if snapshot_path.exists() {
            Some(Snapshot::load(&snapshot_path).map_err(|e| QueueError::recovery(queue_name, e))?)
        } else {
            None
        };

        let (entries, wal_result) = if wal_path.exists() {
            WalRecovery::recover(&wal_path).map_err(|e| QueueError::recovery(queue_name, e))?
        } else {
            (Vec::new(), RecoveryResult::default())
        };

        if !wal_result.is_clean_or_torn() {
            return Err(QueueError::recovery(
                queue_name,
                format!(
                    "WAL entry after LSN {} failed verification",
                    wal_result.last_lsn
                ),
            ));
        }
        if wal_result.was_truncated {
            tracing::warn!(
                "Queue '{}': discarding torn WAL tail after LSN {}",
                queue_name,
                wal_result.last_lsn
            );
        }

        let snapshot = match snapshot {
            Some(snapshot) => snapshot,
            None if entries.is_empty() => {
                return Ok(RecoveredState {
                    epoch: 1,
                    schema: schema.clone(),
                    index: PriorityIndex::new(schema.clone()),
                    next_sequence: 0,
                    last_lsn: wal_result.last_lsn,
                    stats: RecoveryStats {
                        fresh: true,
                        torn_tail: wal_result.was_truncated,
                        ..RecoveryStats::default()
                    },
                });
            }
            None => {
                return Err(QueueError::recovery(
                    queue_name,
                    format!("{} WAL entries but no snapshot", entries.len()),
                ));
            }
        };

        if snapshot.name != queue_name {
            return Err(QueueError::recovery(
                queue_name,
                format!("snapshot belongs to queue '{}'", snapshot.name),
            ));
        }

        let mut stats = RecoveryStats {
            snapshot_items: snapshot.items.len(),
            torn_tail: wal_result.was_truncated,
            ..RecoveryStats::default()
        };

        let mut index = PriorityIndex::new(snapshot.schema.clone());
        for item in snapshot.items {
            index.insert(item);
        }

        let mut next_sequence = snapshot.next_sequence;
        let mut last_lsn = snapshot.last_lsn;

        for entry in entries {
            // Already part of the snapshot (recovery or checkpoint was
            // interrupted before the log was truncated)
            if entry.lsn <= snapshot.last_lsn {
                stats.entries_skipped += 1;
                continue;
            }

            if entry.epoch != snapshot.epoch {
                return Err(QueueError::recovery(
                    queue_name,
                    format!(
                        "LSN {} written in epoch {} but snapshot is at epoch {}",
                        entry.lsn, entry.epoch, snapshot.epoch
                    ),
                ));
            }

            match entry.operation {
                Operation::Enqueue {
                    sequence,
                    payload,
                    features,
                } => {
                    if sequence < next_sequence {
                        return Err(QueueError::recovery(
                            queue_name,
                            format!("LSN {} reuses sequence {}", entry.lsn, sequence),
                        ));
                    }
                    index.insert(Item::new(sequence, payload, features));
                    next_sequence = sequence + 1;
                }
                Operation::Dequeue { sequence } => match index.pop_max() {
                    Some(item) if item.sequence == sequence => {}
                    Some(item) => {
                        return Err(QueueError::recovery(
                            queue_name,
                            format!(
                                "LSN {} removed sequence {} but replay yields {}",
                                entry.lsn, sequence, item.sequence
                            ),
                        ));
                    }
                    None => {
                        return Err(QueueError::recovery(
                            queue_name,
                            format!("LSN {} removes from an empty queue", entry.lsn),
                        ));
                    }
                },
            }

            last_lsn = entry.lsn;
            stats.entries_replayed += 1;
        }

        Ok(RecoveredState {
            epoch: snapshot.epoch + 1,
            schema: snapshot.schema,
            index,
            next_sequence,
            last_lsn,
            stats,
        })
    }
}
