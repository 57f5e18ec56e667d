//! Queue Module
//!
//! A single named sorting priority queue.
//!
//! ## Responsibilities
//! - Serialize mutations through one lock per queue
//! - Log mutations (durable queues) before touching the index
//! - Checkpoint the WAL once it grows past the configured threshold
//! - Expose size, epoch and non-mutating peek

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{QueueError, Result};
use crate::index::{collect_features, Feature, FeatureSchema, Item, PriorityIndex};
use crate::storage::{check_durable_name, queue_dir, DurableStore};
use crate::wal::Operation;

/// Persistence class of a queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QueueType {
    /// Logged and snapshotted; survives restarts
    Durable,

    /// Lives only as long as the process
    InMemory,
}

impl QueueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueType::Durable => "durable",
            QueueType::InMemory => "in-memory",
        }
    }
}

impl TryFrom<i32> for QueueType {
    type Error = QueueError;

    /// Wire values: 0 = DURABLE, 1 = IN_MEMORY
    fn try_from(value: i32) -> Result<Self> {
        match value {
            0 => Ok(QueueType::Durable),
            1 => Ok(QueueType::InMemory),
            other => Err(QueueError::InvalidArgument(format!(
                "unsupported queue type {}",
                other
            ))),
        }
    }
}

impl From<QueueType> for i32 {
    fn from(queue_type: QueueType) -> i32 {
        match queue_type {
            QueueType::Durable => 0,
            QueueType::InMemory => 1,
        }
    }
}

impl FromStr for QueueType {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "durable" => Ok(QueueType::Durable),
            "in-memory" | "in_memory" | "memory" => Ok(QueueType::InMemory),
            other => Err(QueueError::InvalidArgument(format!(
                "unsupported queue type '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for QueueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of Dequeue and Peek
#[derive(Debug, Clone, PartialEq)]
pub struct QueueItem {
    /// The head item, `None` when the queue was empty
    pub item: Option<Item>,

    /// Queue size after the operation
    pub size: u64,
}

impl QueueItem {
    pub fn has_item(&self) -> bool {
        self.item.is_some()
    }

    /// Payload of the item, empty when there is none
    pub fn payload(&self) -> Bytes {
        self.item
            .as_ref()
            .map(|item| item.payload.clone())
            .unwrap_or_default()
    }
}

/// Mutable state guarded by the queue lock
struct QueueState {
    index: PriorityIndex,
    next_sequence: u64,
    epoch: u64,
    /// Present for durable queues only
    store: Option<DurableStore>,
}

impl QueueState {
    /// Compact the WAL if it is due; the mutation is already durable, so a
    /// failure here is logged rather than returned
    fn maybe_checkpoint(&mut self, queue_name: &str) {
        if let Some(store) = self.store.as_mut() {
            if store.should_checkpoint() {
                if let Err(e) = store.checkpoint(&self.index, self.next_sequence) {
                    tracing::error!("Queue '{}': checkpoint failed: {}", queue_name, e);
                }
            }
        }
    }
}

/// A named sorting priority queue
///
/// ## Concurrency Model
///
/// - **Mutations** (enqueue/dequeue/checkpoint) take the state lock
///   exclusively, so the WAL append and the index update happen as one step
///   and two dequeues can never return the same item.
/// - **Reads** (peek/size/epoch) take it shared and see either all or none
///   of a mutation.
/// - Every acquisition is bounded by `lock_timeout`; on expiry the caller
///   gets `Busy`.
/// - Every WAL write is bounded by `wal_timeout`; on expiry the mutation
///   fails with `DurabilityFailure` and the index is left untouched.
pub struct Queue {
    name: String,
    queue_type: QueueType,
    schema: FeatureSchema,
    lock_timeout: Duration,
    state: RwLock<QueueState>,
}

impl Queue {
    /// Open a queue of the given type
    ///
    /// Durable queues run recovery here and are only returned once their
    /// persisted state is loaded and the new epoch is on disk. The schema of
    /// a recovered queue is the persisted one.
    pub fn open(name: &str, queue_type: QueueType, schema: FeatureSchema, config: &Config) -> Result<Self> {
        match queue_type {
            QueueType::InMemory => Ok(Self::in_memory(name, schema, config.lock_timeout())),
            QueueType::Durable => Self::open_durable(name, Some(schema), config),
        }
    }

    /// Reopen a durable queue from its persisted state alone
    ///
    /// Used for queues found on disk that nobody created in this process.
    pub fn recover(name: &str, config: &Config) -> Result<Self> {
        Self::open_durable(name, None, config)
    }

    /// Create an in-memory queue (epoch fixed at 1)
    pub fn in_memory(name: &str, schema: FeatureSchema, lock_timeout: Duration) -> Self {
        Self {
            name: name.to_string(),
            queue_type: QueueType::InMemory,
            schema: schema.clone(),
            lock_timeout,
            state: RwLock::new(QueueState {
                index: PriorityIndex::new(schema),
                next_sequence: 0,
                epoch: 1,
                store: None,
            }),
        }
    }

    fn open_durable(name: &str, requested: Option<FeatureSchema>, config: &Config) -> Result<Self> {
        check_durable_name(name)?;

        let dir = queue_dir(&config.queues_dir(), name);
        let schema = requested.clone().unwrap_or_default();
        let (store, recovered) = DurableStore::open(
            &dir,
            name,
            &schema,
            config.wal_sync_strategy,
            config.snapshot_threshold,
            config.wal_timeout(),
        )?;

        if requested.is_some() && recovered.schema != schema {
            tracing::warn!(
                "Queue '{}': keeping persisted schema {:?}, requested {:?}",
                name,
                recovered.schema.names(),
                schema.names()
            );
        }

        Ok(Self {
            name: name.to_string(),
            queue_type: QueueType::Durable,
            schema: recovered.schema,
            lock_timeout: config.lock_timeout(),
            state: RwLock::new(QueueState {
                index: recovered.index,
                next_sequence: recovered.next_sequence,
                epoch: recovered.epoch,
                store: Some(store),
            }),
        })
    }

    /// Add an item; returns the size after insertion
    ///
    /// Steps:
    /// 1. Validate features (before any lock or log write)
    /// 2. Acquire the write lock
    /// 3. Append to the WAL (durable queues)
    /// 4. Insert into the index
    pub fn enqueue(&self, payload: impl Into<Bytes>, features: &[Feature]) -> Result<u64> {
        let features = collect_features(features)?;
        let payload = payload.into();

        let mut state = self.write_state()?;
        let sequence = state.next_sequence;

        if let Some(store) = state.store.as_mut() {
            store.append(Operation::Enqueue {
                sequence,
                payload: payload.clone(),
                features: features.clone(),
            })?;
        }

        state.next_sequence += 1;
        state.index.insert(Item::new(sequence, payload, features));
        state.maybe_checkpoint(&self.name);

        Ok(state.index.len() as u64)
    }

    /// Remove the highest-priority item
    ///
    /// An empty queue is not an error: the result simply has no item.
    pub fn dequeue(&self) -> Result<QueueItem> {
        let mut state = self.write_state()?;

        let sequence = match state.index.peek_max() {
            Some(item) => item.sequence,
            None => {
                return Ok(QueueItem {
                    item: None,
                    size: 0,
                })
            }
        };

        if let Some(store) = state.store.as_mut() {
            store.append(Operation::Dequeue { sequence })?;
        }

        let item = state.index.pop_max();
        state.maybe_checkpoint(&self.name);

        Ok(QueueItem {
            item,
            size: state.index.len() as u64,
        })
    }

    /// Look at the highest-priority item without removing it
    pub fn peek(&self) -> Result<QueueItem> {
        let state = self.read_state()?;

        Ok(QueueItem {
            item: state.index.peek_max().cloned(),
            size: state.index.len() as u64,
        })
    }

    /// Current number of items
    pub fn size(&self) -> Result<u64> {
        Ok(self.read_state()?.index.len() as u64)
    }

    /// Current epoch (number of loads from disk for durable queues, 1 otherwise)
    pub fn epoch(&self) -> Result<u64> {
        Ok(self.read_state()?.epoch)
    }

    /// Snapshot the queue and truncate its WAL (no-op for in-memory queues)
    pub fn checkpoint(&self) -> Result<()> {
        let mut state = self.write_state()?;
        let QueueState {
            index,
            next_sequence,
            store,
            ..
        } = &mut *state;

        match store.as_mut() {
            Some(store) => store.checkpoint(index, *next_sequence),
            None => Ok(()),
        }
    }

    /// Flush pending WAL writes to stable storage
    pub fn sync(&self) -> Result<()> {
        let mut state = self.write_state()?;
        match state.store.as_mut() {
            Some(store) => store.sync(),
            None => Ok(()),
        }
    }

    /// Checkpoint and sync a durable queue before it is dropped
    pub fn close(&self) -> Result<()> {
        if !self.is_durable() {
            return Ok(());
        }

        self.checkpoint()?;
        self.sync()?;
        tracing::debug!("Queue '{}' closed", self.name);
        Ok(())
    }

    /// Number of WAL entries since the last checkpoint (0 for in-memory)
    pub fn wal_entries(&self) -> Result<u64> {
        let state = self.read_state()?;
        Ok(state.store.as_ref().map(|s| s.wal_entries()).unwrap_or(0))
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn queue_type(&self) -> QueueType {
        self.queue_type
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn is_durable(&self) -> bool {
        self.queue_type == QueueType::Durable
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn write_state(&self) -> Result<RwLockWriteGuard<'_, QueueState>> {
        self.state
            .try_write_for(self.lock_timeout)
            .ok_or(QueueError::Busy)
    }

    fn read_state(&self) -> Result<RwLockReadGuard<'_, QueueState>> {
        self.state
            .try_read_for(self.lock_timeout)
            .ok_or(QueueError::Busy)
    }
}

impl fmt::Debug for Queue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Queue")
            .field("name", &self.name)
            .field("queue_type", &self.queue_type)
            .field("schema", &self.schema.names())
            .finish()
    }
}
