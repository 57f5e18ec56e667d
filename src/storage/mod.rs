//! Storage Module
//!
//! Persistent state of durable queues.
//!
//! ## Responsibilities
//! - Snapshot the full item set and epoch of a queue
//! - Recover a queue from snapshot + WAL at first access
//! - Compact the WAL by checkpointing
//!
//! ## Directory Layout
//! ```text
//! {data_dir}/queues/
//!   └── {hex(queue name)}/
//!       ├── snapshot.snap
//!       └── wal.log
//! ```
//!
//! ## Snapshot Format
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │ Header (18 bytes)                                          │
//! │   Magic: "SPQS" (4) | Version: u16 (2) | BodyLen: u64 (8)  │
//! │   BodyCRC: u32 (4)                                         │
//! ├────────────────────────────────────────────────────────────┤
//! │ Body: bincode(Snapshot)                                    │
//! │   name, queue type, schema, epoch, last LSN,               │
//! │   next sequence, items                                     │
//! └────────────────────────────────────────────────────────────┘
//! ```

mod manager;
mod recovery;
mod snapshot;

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{QueueError, Result};

pub use manager::DurableStore;
pub use recovery::{RecoveredState, RecoveryManager, RecoveryStats};
pub use snapshot::Snapshot;

/// Magic bytes identifying an SPQueue snapshot file
pub(crate) const MAGIC: &[u8; 4] = b"SPQS";

/// Current snapshot format version
pub(crate) const VERSION: u16 = 1;

/// Header size: Magic (4) + Version (2) + BodyLen (8) + CRC (4)
pub(crate) const HEADER_SIZE: u64 = 18;

pub const SNAPSHOT_FILENAME: &str = "snapshot.snap";
pub const WAL_FILENAME: &str = "wal.log";

/// Longest durable queue name in bytes; its hex directory name must fit in
/// a 255-byte path component
pub const MAX_DURABLE_NAME_LEN: usize = 120;

/// Reject names whose directory could not be created
pub fn check_durable_name(name: &str) -> Result<()> {
    if name.len() > MAX_DURABLE_NAME_LEN {
        return Err(QueueError::InvalidArgument(format!(
            "durable queue names are limited to {} bytes, got {}",
            MAX_DURABLE_NAME_LEN,
            name.len()
        )));
    }
    Ok(())
}

/// Directory of a queue under `queues_dir`
///
/// Names are hex encoded so any string maps to a safe directory name.
pub fn queue_dir(queues_dir: &Path, name: &str) -> PathBuf {
    let encoded: String = name.bytes().map(|b| format!("{:02x}", b)).collect();
    queues_dir.join(encoded)
}

/// True when persisted state exists for `name`
pub fn has_persisted_state(queues_dir: &Path, name: &str) -> bool {
    let dir = queue_dir(queues_dir, name);
    dir.join(SNAPSHOT_FILENAME).exists() || dir.join(WAL_FILENAME).exists()
}

/// Names of all queues with a directory under `queues_dir`
pub fn persisted_queue_names(queues_dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();

    if !queues_dir.exists() {
        return Ok(names);
    }

    for entry in fs::read_dir(queues_dir)? {
        let entry = entry?;
        if !entry.path().is_dir() {
            continue;
        }
        if let Some(name) = decode_dir_name(&entry.file_name().to_string_lossy()) {
            names.push(name);
        }
    }

    names.sort();
    Ok(names)
}

/// "71" → Some("q")
fn decode_dir_name(dir_name: &str) -> Option<String> {
    if dir_name.len() % 2 != 0 {
        return None;
    }

    let bytes = (0..dir_name.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(dir_name.get(i..i + 2)?, 16).ok())
        .collect::<Option<Vec<u8>>>()?;

    String::from_utf8(bytes).ok()
}
