//! Response definitions
//!
//! Represents responses to clients.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{QueueError, Result};
use crate::health::ServingStatus;

/// Response status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    Ok = 0x00,
    NotFound = 0x01,
    InvalidArgument = 0x02,
    Unavailable = 0x03,
    Error = 0x04,
}

/// Body of a successful response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Reply {
    /// CreateQueue
    QueueCreated { name: String },

    /// Enqueue, GetSize
    Size { size: u64 },

    /// Dequeue, Peek
    Item { has_item: bool, item: Bytes, size: u64 },

    /// GetEpoch
    Epoch { epoch: u64 },

    /// Check, and every Watch event
    Health { status: ServingStatus },
}

/// A response to send to client
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// Status code
    pub status: Status,

    /// Optional payload (bincode `Reply` for OK, error message otherwise)
    pub payload: Option<Vec<u8>>,
}

impl Response {
    /// Create an OK response carrying `reply`
    pub fn ok(reply: &Reply) -> Self {
        match bincode::serialize(reply) {
            Ok(payload) => Self {
                status: Status::Ok,
                payload: Some(payload),
            },
            Err(e) => Self::error(&format!("failed to encode reply: {}", e)),
        }
    }

    /// Create a NOT_FOUND response
    pub fn not_found(message: &str) -> Self {
        Self::with_message(Status::NotFound, message)
    }

    /// Create an ERROR response
    pub fn error(message: &str) -> Self {
        Self::with_message(Status::Error, message)
    }

    /// Map a queue error onto a status code
    pub fn from_error(err: &QueueError) -> Self {
        let status = match err {
            QueueError::QueueNotFound(_) => Status::NotFound,
            QueueError::InvalidArgument(_) | QueueError::Protocol(_) => Status::InvalidArgument,
            e if e.is_unavailable() => Status::Unavailable,
            _ => Status::Error,
        };
        Self::with_message(status, &err.to_string())
    }

    fn with_message(status: Status, message: &str) -> Self {
        Self {
            status,
            payload: Some(message.as_bytes().to_vec()),
        }
    }

    /// Decode the reply of an OK response, or turn an error status back
    /// into a `QueueError`
    pub fn into_reply(self) -> Result<Reply> {
        let payload = self.payload.unwrap_or_default();

        if self.status == Status::Ok {
            return bincode::deserialize(&payload)
                .map_err(|e| QueueError::Protocol(format!("undecodable reply: {}", e)));
        }

        let message = String::from_utf8_lossy(&payload).into_owned();
        Err(match self.status {
            Status::NotFound => QueueError::QueueNotFound(message),
            Status::InvalidArgument => QueueError::InvalidArgument(message),
            Status::Unavailable => QueueError::Unavailable(message),
            _ => QueueError::Remote(message),
        })
    }
}
