//! WAL Reader
//!
//! Handles reading entries from the WAL file.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::error::{QueueError, Result};
use super::entry::{FrameHeader, HEADER_SIZE, MAX_ENTRY_SIZE};
use super::WalEntry;

/// Outcome of reading one frame
#[derive(Debug)]
pub(crate) enum Frame {
    /// A complete, verified entry
    Entry(WalEntry),

    /// Clean end of file
    End,

    /// The file ends inside a frame (torn write)
    Partial,

    /// A complete frame failed verification
    Corrupt(String),
}

/// Reads entries from the WAL file
pub struct WalReader {
    reader: BufReader<File>,
    position: u64,
    file_len: u64,
    last_lsn: u64,
}

impl WalReader {
    /// Open a WAL file for reading
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let file_len = file.metadata()?.len();

        Ok(Self {
            reader: BufReader::new(file),
            position: 0,
            file_len,
            last_lsn: 0,
        })
    }

    /// Read the next entry from the WAL
    ///
    /// Returns `Ok(None)` at a clean end of file. A torn or corrupted frame
    /// is reported as `WalCorruption`.
    pub fn next_entry(&mut self) -> Result<Option<WalEntry>> {
        match self.read_frame()? {
            Frame::Entry(entry) => Ok(Some(entry)),
            Frame::End => Ok(None),
            Frame::Partial => Err(QueueError::WalCorruption(format!(
                "partial entry at offset {}",
                self.position
            ))),
            Frame::Corrupt(reason) => Err(QueueError::WalCorruption(reason)),
        }
    }

    /// Iterate over all valid entries
    pub fn entries(self) -> WalIterator {
        WalIterator {
            reader: self,
            done: false,
        }
    }

    /// Byte offset just past the last entry read successfully
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Size of the file when it was opened
    pub fn file_len(&self) -> u64 {
        self.file_len
    }

    /// Read one frame; the position only advances past verified entries
    pub(crate) fn read_frame(&mut self) -> Result<Frame> {
        let remaining = self.file_len - self.position;

        if remaining == 0 {
            return Ok(Frame::End);
        }
        if remaining < HEADER_SIZE as u64 {
            return Ok(Frame::Partial);
        }

        let mut header = [0u8; HEADER_SIZE];
        self.reader.read_exact(&mut header)?;
        let header = FrameHeader::parse(&header);

        if header.len > MAX_ENTRY_SIZE {
            return Ok(Frame::Corrupt(format!(
                "entry length {} at offset {} exceeds limit",
                header.len, self.position
            )));
        }

        let frame_len = HEADER_SIZE as u64 + header.len as u64;
        if remaining < frame_len {
            return Ok(Frame::Partial);
        }

        let mut data = vec![0u8; header.len as usize];
        self.reader.read_exact(&mut data)?;

        let entry = match header.decode(&data) {
            Ok(entry) => entry,
            Err(QueueError::WalCorruption(reason)) => return Ok(Frame::Corrupt(reason)),
            Err(e) => return Err(e),
        };

        if entry.lsn <= self.last_lsn {
            return Ok(Frame::Corrupt(format!(
                "LSN {} follows LSN {} at offset {}",
                entry.lsn, self.last_lsn, self.position
            )));
        }

        self.position += frame_len;
        self.last_lsn = entry.lsn;

        Ok(Frame::Entry(entry))
    }
}

/// Iterator over WAL entries
///
/// Yields entries in order and stops after the first error.
pub struct WalIterator {
    reader: WalReader,
    done: bool,
}

impl Iterator for WalIterator {
    type Item = Result<WalEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        match self.reader.next_entry() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
