//! Tests for WAL Worker
//!
//! These tests verify:
//! - Appends, syncs and truncations through the writer thread
//! - A stalled write fails within the timeout
//! - A write whose caller gave up never stays in the log
//! - Closing does not hang on a stalled thread

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use bytes::Bytes;
use spqueue::config::WalSyncStrategy;
use spqueue::wal::{Operation, WalEntry, WalReader, WalWorker, WalWriter};
use spqueue::QueueError;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_worker(timeout: Duration) -> (TempDir, PathBuf, WalWorker) {
    let temp_dir = TempDir::new().unwrap();
    let wal_path = temp_dir.path().join("test.wal");
    let writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite).unwrap();
    let worker = WalWorker::spawn(writer, timeout).unwrap();
    (temp_dir, wal_path, worker)
}

fn enqueue(sequence: u64) -> Operation {
    Operation::Enqueue {
        sequence,
        payload: Bytes::from(format!("item{}", sequence)),
        features: BTreeMap::new(),
    }
}

fn read_all(path: &PathBuf) -> Vec<WalEntry> {
    WalReader::open(path)
        .unwrap()
        .entries()
        .collect::<Result<Vec<_>, _>>()
        .unwrap()
}

/// Occupy the writer thread for `duration`
fn stall(worker: &WalWorker, duration: Duration) -> spqueue::Result<()> {
    worker.submit(move |_writer| {
        thread::sleep(duration);
        Ok(())
    })
}

// =============================================================================
// Basic Tests
// =============================================================================

#[test]
fn test_append_through_worker() {
    let (_temp, wal_path, mut worker) = setup_worker(Duration::from_secs(5));

    assert_eq!(worker.append(1, enqueue(0)).unwrap(), 1);
    assert_eq!(worker.append(1, enqueue(1)).unwrap(), 2);
    worker.sync().unwrap();

    assert_eq!(worker.current_lsn(), 3);
    assert_eq!(worker.entry_count(), 2);
    assert_eq!(read_all(&wal_path).len(), 2);
}

#[test]
fn test_truncate_through_worker() {
    let (_temp, wal_path, mut worker) = setup_worker(Duration::from_secs(5));

    worker.append(1, enqueue(0)).unwrap();
    worker.truncate().unwrap();

    assert_eq!(worker.entry_count(), 0);
    assert!(read_all(&wal_path).is_empty());
    assert_eq!(worker.append(1, enqueue(1)).unwrap(), 2);
}

#[test]
fn test_writer_errors_are_returned() {
    let (_temp, _wal_path, worker) = setup_worker(Duration::from_secs(5));

    let result: spqueue::Result<()> =
        worker.submit(|_writer| Err(QueueError::WalWrite("disk gone".to_string())));

    match result {
        Err(QueueError::WalWrite(message)) => assert_eq!(message, "disk gone"),
        other => panic!("expected WalWrite, got {:?}", other),
    }
}

// =============================================================================
// Timeout Tests
// =============================================================================

#[test]
fn test_stalled_write_times_out() {
    let (_temp, _wal_path, worker) = setup_worker(Duration::from_millis(50));

    let start = Instant::now();
    let result = stall(&worker, Duration::from_millis(400));

    assert!(matches!(result, Err(QueueError::WalWrite(_))));
    assert!(start.elapsed() < Duration::from_millis(300));
}

#[test]
fn test_abandoned_append_is_rewound() {
    let (_temp, wal_path, mut worker) = setup_worker(Duration::from_millis(50));

    worker.append(1, enqueue(0)).unwrap();

    assert!(stall(&worker, Duration::from_millis(300)).is_err());

    // Queued behind the stall: the caller gives up before it runs
    assert!(worker.append(1, enqueue(1)).is_err());
    assert_eq!(worker.current_lsn(), 2);
    assert_eq!(worker.entry_count(), 1);

    // Let the stall end and the abandoned append run and be discarded
    thread::sleep(Duration::from_millis(600));

    assert_eq!(worker.append(1, enqueue(2)).unwrap(), 2);

    let entries = read_all(&wal_path);
    let sequences: Vec<u64> = entries.iter().map(|e| e.operation.sequence()).collect();
    let lsns: Vec<u64> = entries.iter().map(|e| e.lsn).collect();
    assert_eq!(sequences, vec![0, 2]);
    assert_eq!(lsns, vec![1, 2]);
}

#[test]
fn test_drop_does_not_hang_on_stalled_thread() {
    let (_temp, _wal_path, worker) = setup_worker(Duration::from_millis(50));

    assert!(stall(&worker, Duration::from_secs(2)).is_err());

    let start = Instant::now();
    drop(worker);
    assert!(start.elapsed() < Duration::from_secs(1));
}
