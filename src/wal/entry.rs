//! WAL Entry definitions
//!
//! Defines the structure of individual WAL log entries and their framing.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{QueueError, Result};

/// Frame header size: LSN (8) + CRC (4) + Len (4)
pub const HEADER_SIZE: usize = 16;

/// Upper bound on a single entry's data section (64 MB)
pub const MAX_ENTRY_SIZE: u32 = 64 * 1024 * 1024;

/// A single entry in the WAL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalEntry {
    /// Log Sequence Number - monotonically increasing, never reused
    pub lsn: u64,

    /// Epoch of the queue when the entry was written
    pub epoch: u64,

    /// Timestamp (unix millis) when entry was created
    pub timestamp: u64,

    /// The operation to replay
    pub operation: Operation,
}

/// Queue mutations that can be logged
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operation {
    /// An item was inserted
    Enqueue {
        sequence: u64,
        payload: Bytes,
        features: BTreeMap<String, f64>,
    },

    /// The head item (with this sequence) was removed
    Dequeue { sequence: u64 },
}

impl Operation {
    /// Item sequence the operation refers to
    pub fn sequence(&self) -> u64 {
        match self {
            Operation::Enqueue { sequence, .. } => *sequence,
            Operation::Dequeue { sequence } => *sequence,
        }
    }
}

impl WalEntry {
    /// Create an entry stamped with the current time
    pub fn new(lsn: u64, epoch: u64, operation: Operation) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        Self {
            lsn,
            epoch,
            timestamp,
            operation,
        }
    }

    /// Encode as `LSN (8) | CRC (4) | Len (4) | data`
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let data = bincode::serialize(self)?;

        if data.len() > MAX_ENTRY_SIZE as usize {
            return Err(QueueError::WalWrite(format!(
                "entry of {} bytes exceeds the {} byte limit",
                data.len(),
                MAX_ENTRY_SIZE
            )));
        }

        let crc = crc32fast::hash(&data);

        let mut bytes = Vec::with_capacity(HEADER_SIZE + data.len());
        bytes.extend_from_slice(&self.lsn.to_le_bytes());
        bytes.extend_from_slice(&crc.to_le_bytes());
        bytes.extend_from_slice(&(data.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&data);

        Ok(bytes)
    }

    /// Decode one framed entry, verifying its checksum
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(QueueError::WalCorruption(format!(
                "incomplete header: expected {} bytes, got {}",
                HEADER_SIZE,
                bytes.len()
            )));
        }

        let header = FrameHeader::parse(&bytes[..HEADER_SIZE]);
        let end = HEADER_SIZE + header.len as usize;

        if bytes.len() < end {
            return Err(QueueError::WalCorruption(format!(
                "incomplete entry: expected {} bytes, got {}",
                end,
                bytes.len()
            )));
        }

        header.decode(&bytes[HEADER_SIZE..end])
    }
}

/// Parsed frame header
#[derive(Debug, Clone, Copy)]
pub(crate) struct FrameHeader {
    pub lsn: u64,
    pub crc: u32,
    pub len: u32,
}

impl FrameHeader {
    pub(crate) fn parse(header: &[u8]) -> Self {
        let mut lsn = [0u8; 8];
        let mut crc = [0u8; 4];
        let mut len = [0u8; 4];
        lsn.copy_from_slice(&header[0..8]);
        crc.copy_from_slice(&header[8..12]);
        len.copy_from_slice(&header[12..16]);

        Self {
            lsn: u64::from_le_bytes(lsn),
            crc: u32::from_le_bytes(crc),
            len: u32::from_le_bytes(len),
        }
    }

    /// Verify the data section against this header and decode it
    pub(crate) fn decode(&self, data: &[u8]) -> Result<WalEntry> {
        let actual = crc32fast::hash(data);
        if actual != self.crc {
            return Err(QueueError::WalCorruption(format!(
                "CRC mismatch at LSN {}: expected {:08x}, got {:08x}",
                self.lsn, self.crc, actual
            )));
        }

        let entry: WalEntry = bincode::deserialize(data)
            .map_err(|e| QueueError::WalCorruption(format!("undecodable entry: {}", e)))?;

        if entry.lsn != self.lsn {
            return Err(QueueError::WalCorruption(format!(
                "header LSN {} does not match entry LSN {}",
                self.lsn, entry.lsn
            )));
        }

        Ok(entry)
    }
}
