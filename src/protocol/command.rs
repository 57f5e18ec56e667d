//! Command definitions
//!
//! Represents requests from clients.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::index::Feature;
use crate::queue::QueueType;

/// Command types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CommandType {
    CreateQueue = 0x01,
    Enqueue = 0x02,
    Dequeue = 0x03,
    Peek = 0x04,
    GetSize = 0x05,
    GetEpoch = 0x06,
    Check = 0x07,
    Watch = 0x08,

    // Legacy single-queue opcodes, accepted on decode only
    AddItem = 0x11,
    GetNextItem = 0x12,
    PeekNextItem = 0x13,
}

/// CreateQueue request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateQueueRequest {
    pub name: String,
    /// 0 = DURABLE, 1 = IN_MEMORY; anything else is rejected
    pub queue_type: i32,
    pub features: Vec<String>,
}

/// Enqueue request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnqueueRequest {
    /// Empty selects the default queue
    pub queue_name: String,
    pub item: Bytes,
    pub features: Vec<Feature>,
}

/// Request that only names a queue (Dequeue, Peek, GetSize, GetEpoch)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueRequest {
    /// Empty selects the default queue
    pub queue_name: String,
}

/// Legacy AddItem payload (no queue name)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct AddItemRequest {
    pub item: Bytes,
    pub features: Vec<Feature>,
}

/// A parsed command
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    CreateQueue(CreateQueueRequest),
    Enqueue(EnqueueRequest),
    Dequeue(QueueRequest),
    Peek(QueueRequest),
    GetSize(QueueRequest),
    GetEpoch(QueueRequest),

    /// Point-in-time health check
    Check,

    /// Stream health updates until the client disconnects
    Watch,
}

impl Command {
    /// Get the command type
    pub fn command_type(&self) -> CommandType {
        match self {
            Command::CreateQueue(_) => CommandType::CreateQueue,
            Command::Enqueue(_) => CommandType::Enqueue,
            Command::Dequeue(_) => CommandType::Dequeue,
            Command::Peek(_) => CommandType::Peek,
            Command::GetSize(_) => CommandType::GetSize,
            Command::GetEpoch(_) => CommandType::GetEpoch,
            Command::Check => CommandType::Check,
            Command::Watch => CommandType::Watch,
        }
    }

    pub fn create_queue<I, S>(name: impl Into<String>, queue_type: QueueType, features: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Command::CreateQueue(CreateQueueRequest {
            name: name.into(),
            queue_type: queue_type.into(),
            features: features.into_iter().map(Into::into).collect(),
        })
    }

    pub fn enqueue(queue_name: impl Into<String>, item: impl Into<Bytes>, features: Vec<Feature>) -> Self {
        Command::Enqueue(EnqueueRequest {
            queue_name: queue_name.into(),
            item: item.into(),
            features,
        })
    }

    pub fn dequeue(queue_name: impl Into<String>) -> Self {
        Command::Dequeue(QueueRequest {
            queue_name: queue_name.into(),
        })
    }

    pub fn peek(queue_name: impl Into<String>) -> Self {
        Command::Peek(QueueRequest {
            queue_name: queue_name.into(),
        })
    }

    pub fn get_size(queue_name: impl Into<String>) -> Self {
        Command::GetSize(QueueRequest {
            queue_name: queue_name.into(),
        })
    }

    pub fn get_epoch(queue_name: impl Into<String>) -> Self {
        Command::GetEpoch(QueueRequest {
            queue_name: queue_name.into(),
        })
    }
}
