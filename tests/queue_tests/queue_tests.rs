//! Tests for Queue
//!
//! These tests verify:
//! - Priority order and FIFO ties through the public queue API
//! - Size accounting and non-mutating peek
//! - Durable queues surviving restarts, with the epoch growing each time
//! - Automatic checkpointing
//! - Concurrent producers and consumers never losing or duplicating items
//! - Failed log appends and lock timeouts leaving the queue unchanged

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use spqueue::index::{Feature, FeatureSchema};
use spqueue::storage::MAX_DURABLE_NAME_LEN;
use spqueue::wal::MAX_ENTRY_SIZE;
use spqueue::{Config, Queue, QueueError, QueueType};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn test_config(dir: &TempDir) -> Config {
    Config::builder()
        .data_dir(dir.path())
        .snapshot_threshold(1_000)
        .lock_timeout_ms(1_000)
        .build()
}

fn schema() -> FeatureSchema {
    FeatureSchema::new(["priority"]).unwrap()
}

fn priority(value: f64) -> Vec<Feature> {
    vec![Feature::new("priority", value)]
}

fn open_durable(config: &Config) -> Queue {
    Queue::open("jobs", QueueType::Durable, schema(), config).unwrap()
}

fn payloads(queue: &Queue) -> Vec<String> {
    let mut out = Vec::new();
    loop {
        let result = queue.dequeue().unwrap();
        if !result.has_item() {
            return out;
        }
        out.push(String::from_utf8(result.payload().to_vec()).unwrap());
    }
}

// =============================================================================
// Ordering Tests
// =============================================================================

#[test]
fn test_dequeue_order_by_priority() {
    let queue = Queue::in_memory("q", schema(), Duration::from_secs(1));

    queue.enqueue("one", &priority(1.0)).unwrap();
    queue.enqueue("five", &priority(5.0)).unwrap();
    queue.enqueue("three", &priority(3.0)).unwrap();

    assert_eq!(payloads(&queue), vec!["five", "three", "one"]);
}

#[test]
fn test_ties_dequeue_fifo() {
    let queue = Queue::in_memory("q", schema(), Duration::from_secs(1));

    for name in ["first", "second", "third"] {
        queue.enqueue(name, &priority(7.0)).unwrap();
    }

    assert_eq!(payloads(&queue), vec!["first", "second", "third"]);
}

#[test]
fn test_enqueue_and_dequeue_report_size() {
    let queue = Queue::in_memory("q", schema(), Duration::from_secs(1));

    assert_eq!(queue.enqueue("a", &priority(1.0)).unwrap(), 1);
    assert_eq!(queue.enqueue("b", &priority(2.0)).unwrap(), 2);

    let result = queue.dequeue().unwrap();
    assert_eq!(result.payload().as_ref(), b"b");
    assert_eq!(result.size, 1);
    assert_eq!(queue.size().unwrap(), 1);
}

#[test]
fn test_dequeue_empty_is_not_an_error() {
    let queue = Queue::in_memory("q", schema(), Duration::from_secs(1));

    let result = queue.dequeue().unwrap();
    assert!(!result.has_item());
    assert_eq!(result.size, 0);
    assert!(result.payload().is_empty());
}

#[test]
fn test_peek_is_idempotent() {
    let queue = Queue::in_memory("q", schema(), Duration::from_secs(1));
    queue.enqueue("low", &priority(1.0)).unwrap();
    queue.enqueue("high", &priority(2.0)).unwrap();

    let first = queue.peek().unwrap();
    let second = queue.peek().unwrap();

    assert_eq!(first, second);
    assert_eq!(first.payload().as_ref(), b"high");
    assert_eq!(first.size, 2);
    assert_eq!(queue.size().unwrap(), 2);
    assert_eq!(queue.epoch().unwrap(), 1);
}

#[test]
fn test_peek_empty() {
    let queue = Queue::in_memory("q", schema(), Duration::from_secs(1));

    let result = queue.peek().unwrap();
    assert!(!result.has_item());
    assert_eq!(result.size, 0);
}

#[test]
fn test_invalid_features_rejected_without_side_effects() {
    let queue = Queue::in_memory("q", schema(), Duration::from_secs(1));

    let err = queue.enqueue("bad", &priority(f64::NAN)).unwrap_err();
    assert!(matches!(err, QueueError::InvalidArgument(_)));
    assert_eq!(queue.size().unwrap(), 0);

    // The rejected item did not consume a sequence: ties still FIFO
    queue.enqueue("a", &priority(1.0)).unwrap();
    queue.enqueue("b", &priority(1.0)).unwrap();
    assert_eq!(payloads(&queue), vec!["a", "b"]);
}

// =============================================================================
// Durability Tests
// =============================================================================

#[test]
fn test_durable_items_survive_restart() {
    let temp = TempDir::new().unwrap();
    let config = test_config(&temp);

    {
        let queue = open_durable(&config);
        queue.enqueue("one", &priority(1.0)).unwrap();
        queue.enqueue("five", &priority(5.0)).unwrap();
        queue.enqueue("three", &priority(3.0)).unwrap();
        queue.enqueue("three-again", &priority(3.0)).unwrap();
        queue.dequeue().unwrap();
    }

    let queue = open_durable(&config);
    assert_eq!(queue.size().unwrap(), 3);
    assert_eq!(payloads(&queue), vec!["three", "three-again", "one"]);
}

#[test]
fn test_epoch_grows_on_every_recovery() {
    let temp = TempDir::new().unwrap();
    let config = test_config(&temp);

    let initial = open_durable(&config).epoch().unwrap();
    assert!(initial > 0);

    for n in 1..=3 {
        let queue = open_durable(&config);
        assert_eq!(queue.epoch().unwrap(), initial + n);
    }
}

#[test]
fn test_in_memory_queue_forgets_on_restart() {
    let temp = TempDir::new().unwrap();
    let config = test_config(&temp);

    {
        let queue = Queue::open("mem", QueueType::InMemory, schema(), &config).unwrap();
        queue.enqueue("x", &priority(1.0)).unwrap();
        assert!(!queue.is_durable());
    }

    let queue = Queue::open("mem", QueueType::InMemory, schema(), &config).unwrap();
    assert_eq!(queue.size().unwrap(), 0);
    assert_eq!(queue.epoch().unwrap(), 1);
}

#[test]
fn test_automatic_checkpoint_compacts_wal() {
    let temp = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp.path())
        .snapshot_threshold(10)
        .build();

    {
        let queue = open_durable(&config);
        for i in 0..25 {
            queue.enqueue(format!("item{}", i), &priority(i as f64)).unwrap();
        }
        assert!(queue.wal_entries().unwrap() < 10);
    }

    let queue = open_durable(&config);
    assert_eq!(queue.size().unwrap(), 25);
    assert_eq!(queue.peek().unwrap().payload().as_ref(), b"item24");
}

#[test]
fn test_explicit_checkpoint_and_close() {
    let temp = TempDir::new().unwrap();
    let config = test_config(&temp);

    {
        let queue = open_durable(&config);
        queue.enqueue("a", &priority(1.0)).unwrap();
        queue.enqueue("b", &priority(2.0)).unwrap();
        assert_eq!(queue.wal_entries().unwrap(), 2);

        queue.checkpoint().unwrap();
        assert_eq!(queue.wal_entries().unwrap(), 0);

        queue.enqueue("c", &priority(3.0)).unwrap();
        queue.close().unwrap();
        assert_eq!(queue.wal_entries().unwrap(), 0);
    }

    let queue = open_durable(&config);
    assert_eq!(payloads(&queue), vec!["c", "b", "a"]);
}

#[test]
fn test_recovered_queue_keeps_persisted_schema() {
    let temp = TempDir::new().unwrap();
    let config = test_config(&temp);

    drop(open_durable(&config));

    let other = FeatureSchema::new(["size", "age"]).unwrap();
    let queue = Queue::open("jobs", QueueType::Durable, other, &config).unwrap();
    assert_eq!(queue.schema(), &schema());
    drop(queue);

    let recovered = Queue::recover("jobs", &config).unwrap();
    assert_eq!(recovered.schema(), &schema());
    assert_eq!(recovered.epoch().unwrap(), 3);
}

#[test]
fn test_sequences_keep_increasing_after_restart() {
    let temp = TempDir::new().unwrap();
    let config = test_config(&temp);

    {
        let queue = open_durable(&config);
        queue.enqueue("before", &priority(1.0)).unwrap();
    }

    let queue = open_durable(&config);
    queue.enqueue("after", &priority(1.0)).unwrap();

    // Equal priority: the older item must still come out first
    assert_eq!(payloads(&queue), vec!["before", "after"]);
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_concurrent_dequeues_never_duplicate() {
    let temp = TempDir::new().unwrap();
    let config = test_config(&temp);
    let queue = Arc::new(open_durable(&config));

    for i in 0..200 {
        queue.enqueue(format!("{}", i), &priority((i % 7) as f64)).unwrap();
    }

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                let mut seen = Vec::new();
                loop {
                    let result = queue.dequeue().unwrap();
                    if !result.has_item() {
                        return seen;
                    }
                    seen.push(result.payload());
                }
            })
        })
        .collect();

    let mut all = HashSet::new();
    let mut total = 0;
    for handle in handles {
        for payload in handle.join().unwrap() {
            all.insert(payload);
            total += 1;
        }
    }

    assert_eq!(total, 200);
    assert_eq!(all.len(), 200);
    assert_eq!(queue.size().unwrap(), 0);
}

#[test]
fn test_concurrent_producers_size_accounting() {
    let queue = Arc::new(Queue::in_memory("q", schema(), Duration::from_secs(5)));

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                for i in 0..100 {
                    queue
                        .enqueue(format!("{}-{}", t, i), &priority(i as f64))
                        .unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(queue.size().unwrap(), 800);
}

// =============================================================================
// Failure Tests
// =============================================================================

#[test]
fn test_failed_log_append_leaves_queue_untouched() {
    let temp = TempDir::new().unwrap();
    let config = test_config(&temp);
    let queue = open_durable(&config);

    queue.enqueue("a", &priority(1.0)).unwrap();
    let head_before = queue.peek().unwrap();

    let oversized = vec![0u8; MAX_ENTRY_SIZE as usize];
    let err = queue.enqueue(oversized, &priority(9.0)).unwrap_err();
    assert!(matches!(err, QueueError::DurabilityFailure(_)));
    assert!(err.is_unavailable());

    assert_eq!(queue.size().unwrap(), 1);
    assert_eq!(queue.peek().unwrap(), head_before);
    assert_eq!(queue.wal_entries().unwrap(), 1);

    // The failed enqueue did not consume a sequence
    queue.enqueue("b", &priority(1.0)).unwrap();
    let first = queue.dequeue().unwrap().item.unwrap();
    let second = queue.dequeue().unwrap().item.unwrap();
    assert_eq!((first.sequence, second.sequence), (0, 1));
    assert_eq!(second.payload.as_ref(), b"b");
}

#[test]
fn test_failed_log_append_not_replayed_after_restart() {
    let temp = TempDir::new().unwrap();
    let config = test_config(&temp);

    {
        let queue = open_durable(&config);
        queue.enqueue("kept", &priority(1.0)).unwrap();
        let oversized = vec![0u8; MAX_ENTRY_SIZE as usize];
        assert!(queue.enqueue(oversized, &priority(9.0)).is_err());
    }

    let queue = open_durable(&config);
    assert_eq!(payloads(&queue), vec!["kept"]);
}

#[test]
fn test_lock_timeout_reports_busy() {
    let temp = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp.path())
        .snapshot_threshold(1_000_000)
        .lock_timeout_ms(0)
        .build();
    let queue = Arc::new(open_durable(&config));

    for i in 0..5_000 {
        queue.enqueue(format!("{:0>64}", i), &priority(i as f64)).unwrap();
    }

    // Each checkpoint holds the write lock while the snapshot is written
    let writer = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || {
            let mut completed = 0;
            while completed < 5 {
                if queue.checkpoint().is_ok() {
                    completed += 1;
                }
            }
        })
    };

    let mut busy = 0;
    while !writer.is_finished() && busy == 0 {
        if let Err(QueueError::Busy) = queue.size() {
            busy += 1;
        }
    }
    writer.join().unwrap();

    assert!(busy > 0);
    assert_eq!(queue.size().unwrap(), 5_000);
}

#[test]
fn test_long_durable_name_rejected() {
    let temp = TempDir::new().unwrap();
    let config = test_config(&temp);
    let name = "n".repeat(MAX_DURABLE_NAME_LEN + 1);

    let err = Queue::open(&name, QueueType::Durable, schema(), &config).unwrap_err();
    assert!(matches!(err, QueueError::InvalidArgument(_)));

    // In-memory queues have no directory to fit
    let queue = Queue::open(&name, QueueType::InMemory, schema(), &config).unwrap();
    assert_eq!(queue.name(), name);
}

#[test]
fn test_longest_durable_name_survives_restart() {
    let temp = TempDir::new().unwrap();
    let config = test_config(&temp);
    let name = "n".repeat(MAX_DURABLE_NAME_LEN);

    {
        let queue = Queue::open(&name, QueueType::Durable, schema(), &config).unwrap();
        queue.enqueue("x", &priority(1.0)).unwrap();
    }

    let queue = Queue::recover(&name, &config).unwrap();
    assert_eq!(queue.size().unwrap(), 1);
}
