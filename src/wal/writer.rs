//! WAL Writer
//!
//! Handles appending entries to the WAL file.

use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::config::WalSyncStrategy;
use crate::error::{QueueError, Result};
use super::{Operation, WalEntry, WalRecovery};

/// Position of a writer between two appends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalMark {
    offset: u64,
    next_lsn: u64,
    entries_in_file: u64,
}

/// Writes entries to the WAL file
///
/// A failed append is rolled back to the last complete entry so the log
/// never carries a torn frame in its middle. If the rollback itself fails
/// the writer is poisoned and refuses further appends.
pub struct WalWriter {
    path: PathBuf,
    file: File,
    next_lsn: u64,
    sync_strategy: WalSyncStrategy,
    /// Entries written since the last fsync
    unsynced: usize,
    /// Entries written since the file was last truncated
    entries_in_file: u64,
    /// End of the last complete entry
    offset: u64,
    poisoned: bool,
}

impl WalWriter {
    /// Open or create a WAL file
    ///
    /// An existing file is scanned; LSNs continue after the last valid entry
    /// and any invalid tail is cut off.
    pub fn open(path: &Path, sync_strategy: WalSyncStrategy) -> Result<Self> {
        Self::resume(path, sync_strategy, 1)
    }

    /// Open a WAL whose next LSN must be at least `min_next_lsn`
    ///
    /// Used after a truncation so LSNs are never reused.
    pub fn resume(path: &Path, sync_strategy: WalSyncStrategy, min_next_lsn: u64) -> Result<Self> {
        let (valid_len, last_lsn, entries) = if path.exists() {
            let result = WalRecovery::verify(path)?;
            (result.valid_len, result.last_lsn, result.entries_recovered)
        } else {
            (0, 0, 0)
        };

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(path)?;

        if file.metadata()?.len() > valid_len {
            tracing::warn!(
                "Discarding {} trailing bytes of WAL {}",
                file.metadata()?.len() - valid_len,
                path.display()
            );
            file.set_len(valid_len)?;
            file.sync_all()?;
        }
        file.seek(SeekFrom::Start(valid_len))?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
            next_lsn: (last_lsn + 1).max(min_next_lsn.max(1)),
            sync_strategy,
            unsynced: 0,
            entries_in_file: entries,
            offset: valid_len,
            poisoned: false,
        })
    }

    /// Append an entry to the WAL
    ///
    /// Returns the LSN assigned to the entry. With `EveryWrite` the entry is
    /// on stable storage when this returns.
    pub fn append(&mut self, epoch: u64, operation: Operation) -> Result<u64> {
        if self.poisoned {
            return Err(QueueError::WalWrite(format!(
                "WAL {} is unusable after a failed rollback",
                self.path.display()
            )));
        }

        let lsn = self.next_lsn;
        let bytes = WalEntry::new(lsn, epoch, operation).serialize()?;

        if let Err(e) = self.write_frame(&bytes) {
            self.rollback();
            return Err(QueueError::WalWrite(e.to_string()));
        }

        self.offset += bytes.len() as u64;
        self.next_lsn += 1;
        self.entries_in_file += 1;

        Ok(lsn)
    }

    fn write_frame(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.file.write_all(bytes)?;
        self.unsynced += 1;

        let due = match self.sync_strategy {
            WalSyncStrategy::EveryWrite => true,
            WalSyncStrategy::EveryNEntries { count } => self.unsynced >= count.max(1),
        };
        if due {
            self.file.sync_data()?;
            self.unsynced = 0;
        }

        Ok(())
    }

    /// Cut the file back to the last complete entry
    fn rollback(&mut self) {
        let restored = self
            .file
            .set_len(self.offset)
            .and_then(|_| self.file.seek(SeekFrom::Start(self.offset)).map(|_| ()));

        if let Err(e) = restored {
            tracing::error!("WAL {} rollback failed: {}", self.path.display(), e);
            self.poisoned = true;
        }
    }

    /// Current position, to `rewind` to later
    pub fn mark(&self) -> WalMark {
        WalMark {
            offset: self.offset,
            next_lsn: self.next_lsn,
            entries_in_file: self.entries_in_file,
        }
    }

    /// Discard every entry appended after `mark`, LSNs included
    ///
    /// A mark taken before a truncation is ignored. If the file cannot be cut
    /// back the writer is poisoned.
    pub fn rewind(&mut self, mark: WalMark) -> Result<()> {
        if mark.offset >= self.offset {
            return Ok(());
        }

        let restored = self
            .file
            .set_len(mark.offset)
            .and_then(|_| self.file.seek(SeekFrom::Start(mark.offset)).map(|_| ()))
            .and_then(|_| self.file.sync_data());

        if let Err(e) = restored {
            tracing::error!("WAL {} rewind failed: {}", self.path.display(), e);
            self.poisoned = true;
            return Err(QueueError::WalWrite(e.to_string()));
        }

        tracing::warn!(
            "WAL {}: discarded {} entries after LSN {}",
            self.path.display(),
            self.next_lsn - mark.next_lsn,
            mark.next_lsn - 1
        );

        self.offset = mark.offset;
        self.next_lsn = mark.next_lsn;
        self.entries_in_file = mark.entries_in_file;
        self.unsynced = 0;
        Ok(())
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Force sync to disk
    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_data()?;
        self.unsynced = 0;
        Ok(())
    }

    /// Drop every entry (their effects are captured elsewhere)
    ///
    /// LSNs keep counting from where they were.
    pub fn truncate(&mut self) -> Result<()> {
        self.file.set_len(0)?;
        self.file.seek(SeekFrom::Start(0))?;
        self.file.sync_all()?;

        self.offset = 0;
        self.unsynced = 0;
        self.entries_in_file = 0;
        self.poisoned = false;

        Ok(())
    }

    /// Get the LSN the next append will use
    pub fn current_lsn(&self) -> u64 {
        self.next_lsn
    }

    /// Number of entries in the file since the last truncation
    pub fn entry_count(&self) -> u64 {
        self.entries_in_file
    }

    /// Size of the valid log in bytes
    pub fn len(&self) -> u64 {
        self.offset
    }

    pub fn is_empty(&self) -> bool {
        self.offset == 0
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
