//! WAL Recovery
//!
//! Reads back a WAL after a crash and reports what survived.

use std::path::Path;

use crate::error::Result;
use super::reader::{Frame, WalReader};
use super::WalEntry;

/// Handles WAL recovery after crash
pub struct WalRecovery;

/// Result of a recovery operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryResult {
    /// Number of entries successfully recovered
    pub entries_recovered: u64,

    /// Number of complete entries that failed verification (0 or 1, reading
    /// stops at the first one)
    pub entries_corrupted: u64,

    /// Last valid LSN (0 when nothing was recovered)
    pub last_lsn: u64,

    /// Whether bytes after the last valid entry were discarded
    pub was_truncated: bool,

    /// Length of the valid prefix of the file
    pub valid_len: u64,
}

impl RecoveryResult {
    /// Only a torn final write was dropped; every complete entry verified
    pub fn is_clean_or_torn(&self) -> bool {
        self.entries_corrupted == 0
    }
}

impl WalRecovery {
    /// Recover entries from a WAL file
    ///
    /// This will:
    /// 1. Read all valid entries in order
    /// 2. Stop at the first partial or corrupted entry
    /// 3. Report whether trailing bytes were discarded
    ///
    /// The file itself is left untouched; `WalWriter::open` cuts the
    /// invalid tail when the log is reopened for writing.
    pub fn recover(path: &Path) -> Result<(Vec<WalEntry>, RecoveryResult)> {
        let mut entries = Vec::new();
        let result = Self::scan(path, |entry| entries.push(entry))?;
        Ok((entries, result))
    }

    /// Verify integrity of a WAL file without modifying it
    pub fn verify(path: &Path) -> Result<RecoveryResult> {
        Self::scan(path, |_| {})
    }

    fn scan<F: FnMut(WalEntry)>(path: &Path, mut on_entry: F) -> Result<RecoveryResult> {
        let mut reader = WalReader::open(path)?;
        let mut result = RecoveryResult::default();

        loop {
            match reader.read_frame()? {
                Frame::Entry(entry) => {
                    result.entries_recovered += 1;
                    result.last_lsn = entry.lsn;
                    on_entry(entry);
                }
                Frame::End => break,
                Frame::Partial => {
                    result.was_truncated = true;
                    break;
                }
                Frame::Corrupt(reason) => {
                    tracing::warn!("WAL {} corrupted: {}", path.display(), reason);
                    result.entries_corrupted += 1;
                    result.was_truncated = true;
                    break;
                }
            }
        }

        result.valid_len = reader.position();

        Ok(result)
    }
}
