//! Registry Module
//!
//! Name → queue mapping for a running service.
//!
//! ## Responsibilities
//! - Create queues (idempotent by name)
//! - Resolve names, with the empty name meaning the default queue
//! - Lazily recover durable queues found on disk
//! - Route protocol commands to the right queue

use std::collections::HashMap;
use std::fs;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::config::Config;
use crate::error::{QueueError, Result};
use crate::index::FeatureSchema;
use crate::protocol::{Command, Reply};
use crate::queue::{Queue, QueueType};
use crate::storage::{has_persisted_state, persisted_queue_names};

/// Reserved name of the queue served to requests without a queue name
pub const DEFAULT_QUEUE_NAME: &str = "__default__";

/// All queues of one service instance
///
/// ## Locking
///
/// - `queues` is only held for map lookups and inserts, never while a queue
///   is being opened, so recovering one queue does not stall lookups of
///   others.
/// - `creating` serializes structural changes (create, lazy recovery) so a
///   queue is opened at most once.
pub struct QueueRegistry {
    config: Config,
    queues: RwLock<HashMap<String, Arc<Queue>>>,
    creating: Mutex<()>,
}

impl QueueRegistry {
    /// Open the registry and its default queue
    ///
    /// A durable default queue is recovered here, so a corrupt default queue
    /// fails startup.
    pub fn open(config: Config) -> Result<Self> {
        if config.default_queue_type == QueueType::Durable {
            fs::create_dir_all(config.queues_dir())?;
        }

        let registry = Self {
            config,
            queues: RwLock::new(HashMap::new()),
            creating: Mutex::new(()),
        };

        let schema = FeatureSchema::new(registry.config.default_queue_features.iter().cloned())
            .map_err(|e| QueueError::Config(format!("default queue features: {}", e)))?;
        let default = registry.create_queue(DEFAULT_QUEUE_NAME, registry.config.default_queue_type, schema)?;

        tracing::info!(
            "Registry ready: default queue is {} with features {:?}, epoch {}",
            default.queue_type(),
            default.schema().names(),
            default.epoch()?
        );

        Ok(registry)
    }

    /// Create a queue, or return the existing one with that name
    ///
    /// A name with persisted state is recovered from disk as the durable
    /// queue it was, even when another type is requested. A durable queue is
    /// recovered before it becomes visible.
    pub fn create_queue(&self, name: &str, queue_type: QueueType, schema: FeatureSchema) -> Result<Arc<Queue>> {
        if name.is_empty() {
            return Err(QueueError::InvalidArgument(
                "queue name must not be empty".to_string(),
            ));
        }

        if let Some(queue) = self.get(name) {
            Self::warn_on_mismatch(&queue, queue_type, &schema);
            return Ok(queue);
        }

        let _guard = self.creating.lock();

        // Another thread may have won the race
        if let Some(queue) = self.get(name) {
            Self::warn_on_mismatch(&queue, queue_type, &schema);
            return Ok(queue);
        }

        // A durable queue left on disk owns the name whatever type is asked for
        let queue = if has_persisted_state(&self.config.queues_dir(), name) {
            let queue = Queue::recover(name, &self.config)?;
            Self::warn_on_mismatch(&queue, queue_type, &schema);
            queue
        } else {
            Queue::open(name, queue_type, schema, &self.config)?
        };

        let queue = Arc::new(queue);
        self.queues.write().insert(name.to_string(), Arc::clone(&queue));

        tracing::debug!(
            "Created {} queue '{}' with features {:?}",
            queue.queue_type(),
            name,
            queue.schema().names()
        );

        Ok(queue)
    }

    /// Look up a queue by name
    ///
    /// The empty name selects the default queue. A name not yet loaded in
    /// this process but persisted on disk is recovered on first use.
    pub fn resolve(&self, name: &str) -> Result<Arc<Queue>> {
        let name = if name.is_empty() { DEFAULT_QUEUE_NAME } else { name };

        if let Some(queue) = self.get(name) {
            return Ok(queue);
        }

        if !has_persisted_state(&self.config.queues_dir(), name) {
            return Err(QueueError::QueueNotFound(name.to_string()));
        }

        let _guard = self.creating.lock();

        if let Some(queue) = self.get(name) {
            return Ok(queue);
        }

        let queue = Arc::new(Queue::recover(name, &self.config)?);
        self.queues.write().insert(name.to_string(), Arc::clone(&queue));

        tracing::info!("Recovered durable queue '{}' on first access", name);

        Ok(queue)
    }

    /// Execute a queue command
    ///
    /// `Check` and `Watch` belong to the health service and are rejected here.
    pub fn execute(&self, command: Command) -> Result<Reply> {
        match command {
            Command::CreateQueue(request) => {
                let queue_type = QueueType::try_from(request.queue_type)?;
                let schema = FeatureSchema::new(request.features)?;
                let queue = self.create_queue(&request.name, queue_type, schema)?;
                Ok(Reply::QueueCreated {
                    name: queue.name().to_string(),
                })
            }
            Command::Enqueue(request) => {
                let queue = self.resolve(&request.queue_name)?;
                let size = queue.enqueue(request.item, &request.features)?;
                Ok(Reply::Size { size })
            }
            Command::Dequeue(request) => {
                let result = self.resolve(&request.queue_name)?.dequeue()?;
                Ok(Reply::Item {
                    has_item: result.has_item(),
                    item: result.payload(),
                    size: result.size,
                })
            }
            Command::Peek(request) => {
                let result = self.resolve(&request.queue_name)?.peek()?;
                Ok(Reply::Item {
                    has_item: result.has_item(),
                    item: result.payload(),
                    size: result.size,
                })
            }
            Command::GetSize(request) => {
                let size = self.resolve(&request.queue_name)?.size()?;
                Ok(Reply::Size { size })
            }
            Command::GetEpoch(request) => {
                let epoch = self.resolve(&request.queue_name)?.epoch()?;
                Ok(Reply::Epoch { epoch })
            }
            Command::Check | Command::Watch => Err(QueueError::InvalidArgument(
                "health commands are not routed to queues".to_string(),
            )),
        }
    }

    /// Names of every queue loaded or persisted, sorted
    pub fn queue_names(&self) -> Result<Vec<String>> {
        let mut names = persisted_queue_names(&self.config.queues_dir())?;
        names.extend(self.queues.read().keys().cloned());
        names.sort();
        names.dedup();
        Ok(names)
    }

    /// Checkpoint and sync every loaded durable queue
    ///
    /// Every queue is attempted; the first failure is returned.
    pub fn close(&self) -> Result<()> {
        let queues: Vec<Arc<Queue>> = self.queues.read().values().cloned().collect();
        let mut first_error = None;

        for queue in queues {
            if let Err(e) = queue.close() {
                tracing::error!("Failed to close queue '{}': {}", queue.name(), e);
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// The reserved default queue
    pub fn default_queue(&self) -> Result<Arc<Queue>> {
        self.resolve(DEFAULT_QUEUE_NAME)
    }

    /// Number of queues loaded in this process
    pub fn loaded_count(&self) -> usize {
        self.queues.read().len()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn get(&self, name: &str) -> Option<Arc<Queue>> {
        self.queues.read().get(name).cloned()
    }

    fn warn_on_mismatch(queue: &Queue, queue_type: QueueType, schema: &FeatureSchema) {
        if queue.queue_type() != queue_type || queue.schema() != schema {
            tracing::warn!(
                "Queue '{}' already exists as {} {:?}; ignoring requested {} {:?}",
                queue.name(),
                queue.queue_type(),
                queue.schema().names(),
                queue_type,
                schema.names()
            );
        }
    }
}
