//! Write-Ahead Log (WAL) Module
//!
//! Provides durability guarantees through append-only logging.
//!
//! ## Responsibilities
//! - Append queue mutations before the in-memory index changes
//! - CRC32 checksums for corruption detection
//! - Log Sequence Numbers (LSN) for ordering and replay dedup
//! - Crash recovery and replay
//! - Bounded waits on log writes (the writer runs on its own thread)
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ Entry 1                                 │
//! │ ┌─────────┬─────────┬────────┬────────┐ │
//! │ │ LSN (8) │ CRC (4) │Len (4) │ Data   │ │
//! │ └─────────┴─────────┴────────┴────────┘ │
//! ├─────────────────────────────────────────┤
//! │ Entry 2                                 │
//! │ ┌─────────┬─────────┬────────┬────────┐ │
//! │ │ LSN (8) │ CRC (4) │Len (4) │ Data   │ │
//! │ └─────────┴─────────┴────────┴────────┘ │
//! └─────────────────────────────────────────┘
//! ```
//!
//! Data is the bincode encoding of [`WalEntry`]: LSN, epoch, timestamp and
//! the operation (`Enqueue` with the full item, or `Dequeue` with the
//! sequence of the removed item).

mod entry;
mod writer;
mod reader;
mod recovery;
mod worker;

pub use entry::{WalEntry, Operation, HEADER_SIZE, MAX_ENTRY_SIZE};
pub use writer::{WalMark, WalWriter};
pub use worker::WalWorker;
pub use reader::{WalReader, WalIterator};
pub use recovery::{WalRecovery, RecoveryResult};
