//! Queue snapshots
//!
//! A snapshot captures the complete item set of a durable queue together
//! with its epoch and the last LSN it covers.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{QueueError, Result};
use crate::index::{FeatureSchema, Item};
use crate::queue::QueueType;

use super::{HEADER_SIZE, MAGIC, VERSION};

/// Full persisted state of one queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub name: String,
    pub queue_type: QueueType,
    pub schema: FeatureSchema,
    /// Epoch the queue was running in when the snapshot was taken
    pub epoch: u64,
    /// Highest LSN whose effect is included
    pub last_lsn: u64,
    /// Sequence the next enqueued item receives
    pub next_sequence: u64,
    pub items: Vec<Item>,
}

impl Snapshot {
    /// Write the snapshot atomically
    ///
    /// The data goes to a temporary sibling, is fsynced, then renamed over
    /// `path`, so a crash leaves either the old or the new snapshot.
    pub fn write(&self, path: &Path) -> Result<()> {
        let body = bincode::serialize(self)?;
        let crc = crc32fast::hash(&body);

        let tmp_path = path.with_extension("tmp");
        {
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp_path)?;
            let mut writer = BufWriter::new(file);

            writer.write_all(MAGIC)?;
            writer.write_all(&VERSION.to_le_bytes())?;
            writer.write_all(&(body.len() as u64).to_le_bytes())?;
            writer.write_all(&crc.to_le_bytes())?;
            writer.write_all(&body)?;
            writer.flush()?;

            let file = writer.into_inner().map_err(|e| {
                QueueError::DurabilityFailure(format!("Failed to flush snapshot: {}", e))
            })?;
            file.sync_all()?;
        }

        fs::rename(&tmp_path, path)?;
        sync_parent_dir(path)?;

        Ok(())
    }

    /// Load and verify a snapshot
    pub fn load(path: &Path) -> Result<Self> {
        let mut file = File::open(path)?;
        let file_size = file.metadata()?.len();

        if file_size < HEADER_SIZE {
            return Err(QueueError::SnapshotCorruption(format!(
                "file of {} bytes is shorter than the header",
                file_size
            )));
        }

        let mut header = [0u8; HEADER_SIZE as usize];
        file.read_exact(&mut header)?;

        if &header[0..4] != MAGIC {
            return Err(QueueError::SnapshotCorruption(format!(
                "Invalid snapshot magic: expected SPQS, got {:?}",
                &header[0..4]
            )));
        }

        let version = u16::from_le_bytes([header[4], header[5]]);
        if version != VERSION {
            return Err(QueueError::SnapshotCorruption(format!(
                "Unsupported snapshot version: {}",
                version
            )));
        }

        let mut len = [0u8; 8];
        len.copy_from_slice(&header[6..14]);
        let body_len = u64::from_le_bytes(len);

        let mut crc = [0u8; 4];
        crc.copy_from_slice(&header[14..18]);
        let expected_crc = u32::from_le_bytes(crc);

        if file_size - HEADER_SIZE != body_len {
            return Err(QueueError::SnapshotCorruption(format!(
                "body length {} does not match file size {}",
                body_len, file_size
            )));
        }

        let mut body = vec![0u8; body_len as usize];
        file.read_exact(&mut body)?;

        let actual_crc = crc32fast::hash(&body);
        if actual_crc != expected_crc {
            return Err(QueueError::SnapshotCorruption(format!(
                "CRC mismatch: expected {:08x}, got {:08x}",
                expected_crc, actual_crc
            )));
        }

        bincode::deserialize(&body)
            .map_err(|e| QueueError::SnapshotCorruption(format!("undecodable body: {}", e)))
    }
}

#[cfg(unix)]
fn sync_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        File::open(parent)?.sync_all()?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) -> Result<()> {
    Ok(())
}
