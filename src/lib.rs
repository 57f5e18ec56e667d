//! # SPQueue
//!
//! A sorting priority queue service with:
//! - Named queues ordered by per-item numeric features
//! - Durable queues backed by a write-ahead log and snapshots
//! - An epoch counter that grows on every recovery
//! - Health check and watch streams
//! - TCP-based client protocol
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      TCP Server                              │
//! │                  (Multiple Clients)                          │
//! └──────────┬──────────────────────────────────┬───────────────┘
//!            │                                  │
//! ┌──────────▼──────────────────┐    ┌──────────▼──────────────┐
//! │       Queue Registry         │    │     Health Monitor      │
//! │  (name → queue, default Q)   │    │   (check / watch)       │
//! └──────────┬──────────────────┘    └─────────────────────────┘
//!            │
//! ┌──────────▼──────────────────┐
//! │            Queue             │
//! │   (one RwLock per queue)     │
//! └──────────┬──────────────────┘
//!            │
//!   ┌────────┴─────────┐
//!   │                  │
//!   ▼                  ▼
//! ┌─────────────┐  ┌───────────────┐
//! │     WAL     │  │ PriorityIndex │
//! │  (Append)   │  │  (BinaryHeap) │
//! └──────┬──────┘  └───────────────┘
//!        │ checkpoint
//!        ▼
//! ┌─────────────┐
//! │  Snapshot   │
//! └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod index;
pub mod wal;
pub mod storage;
pub mod queue;
pub mod registry;
pub mod health;
pub mod protocol;
pub mod network;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{QueueError, Result};
pub use config::{Config, WalSyncStrategy};
pub use health::{HealthMonitor, ServingStatus};
pub use index::{Feature, FeatureSchema};
pub use queue::{Queue, QueueItem, QueueType};
pub use registry::{QueueRegistry, DEFAULT_QUEUE_NAME};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of SPQueue
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
