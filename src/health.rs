//! Health Monitor
//!
//! Process liveness, independent of any queue.
//!
//! `check` reads the current status. `watch` registers a subscriber with its
//! own bounded channel; a publisher thread pushes the status on every tick
//! and on every change. The publisher never blocks: a subscriber whose
//! buffer stays full for too many ticks is evicted, and dropping a
//! [`WatchStream`] removes its registration.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TrySendError};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::config::Config;

/// Serving status, numbered like the standard gRPC health protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServingStatus {
    Unknown,
    Serving,
    NotServing,
    ServiceUnknown,
}

impl ServingStatus {
    pub fn code(&self) -> i32 {
        match self {
            ServingStatus::Unknown => 0,
            ServingStatus::Serving => 1,
            ServingStatus::NotServing => 2,
            ServingStatus::ServiceUnknown => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ServingStatus::Unknown => "UNKNOWN",
            ServingStatus::Serving => "SERVING",
            ServingStatus::NotServing => "NOT_SERVING",
            ServingStatus::ServiceUnknown => "SERVICE_UNKNOWN",
        }
    }
}

struct Subscriber {
    tx: Sender<ServingStatus>,
    /// Consecutive publishes that found the buffer full
    missed: u32,
}

/// State shared by the monitor, its publisher thread and every stream
struct Shared {
    status: RwLock<ServingStatus>,
    subscribers: Mutex<HashMap<u64, Subscriber>>,
    next_id: AtomicU64,
    buffer: usize,
    max_missed_ticks: u32,
}

impl Shared {
    fn publish(&self, status: ServingStatus) {
        let mut subscribers = self.subscribers.lock();

        subscribers.retain(|id, sub| match sub.tx.try_send(status) {
            Ok(()) => {
                sub.missed = 0;
                true
            }
            Err(TrySendError::Full(_)) => {
                sub.missed += 1;
                if sub.missed >= self.max_missed_ticks {
                    tracing::warn!("Evicting health watcher {} after {} missed events", id, sub.missed);
                    false
                } else {
                    true
                }
            }
            Err(TrySendError::Disconnected(_)) => {
                tracing::debug!("Health watcher {} went away", id);
                false
            }
        });
    }
}

/// Shortest accepted interval between Watch ticks
pub const MIN_WATCH_INTERVAL: Duration = Duration::from_millis(1);

/// Process-wide liveness state with Watch subscriptions
pub struct HealthMonitor {
    shared: Arc<Shared>,
    shutdown_tx: Mutex<Option<Sender<()>>>,
    publisher: Mutex<Option<JoinHandle<()>>>,
}

impl HealthMonitor {
    /// Start a monitor reporting `Serving`, publishing every `interval`
    ///
    /// Intervals below [`MIN_WATCH_INTERVAL`] are raised to it.
    pub fn new(interval: Duration, buffer: usize, max_missed_ticks: u32) -> Self {
        let interval = interval.max(MIN_WATCH_INTERVAL);
        let shared = Arc::new(Shared {
            status: RwLock::new(ServingStatus::Serving),
            subscribers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            buffer: buffer.max(1),
            max_missed_ticks: max_missed_ticks.max(1),
        });

        let (shutdown_tx, shutdown_rx) = channel::bounded::<()>(0);
        let publisher_shared = Arc::clone(&shared);

        let publisher = thread::Builder::new()
            .name("health-publisher".to_string())
            .spawn(move || {
                let ticker = channel::tick(interval);
                loop {
                    crossbeam::select! {
                        recv(ticker) -> _ => {
                            let status = *publisher_shared.status.read();
                            publisher_shared.publish(status);
                        }
                        recv(shutdown_rx) -> _ => break,
                    }
                }
            })
            .ok();

        if publisher.is_none() {
            tracing::error!("Failed to spawn health publisher; Watch streams will only see status changes");
        }

        Self {
            shared,
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
            publisher: Mutex::new(publisher),
        }
    }

    /// Build a monitor from the watch settings in `config`
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.watch_interval(), config.watch_buffer, config.max_missed_ticks)
    }

    /// Current status (never blocks on subscribers)
    pub fn check(&self) -> ServingStatus {
        *self.shared.status.read()
    }

    /// Change the status; watchers are notified right away
    pub fn set_status(&self, status: ServingStatus) {
        let changed = {
            let mut current = self.shared.status.write();
            let changed = *current != status;
            *current = status;
            changed
        };

        if changed {
            tracing::info!("Health status changed to {}", status.as_str());
            self.shared.publish(status);
        }
    }

    /// Subscribe to status updates
    ///
    /// The first item is the current status. The stream ends when the
    /// monitor stops or the subscriber is evicted.
    pub fn watch(&self) -> WatchStream {
        let (tx, rx) = channel::bounded(self.shared.buffer);
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);

        let mut subscribers = self.shared.subscribers.lock();
        // Fresh channel with capacity >= 1
        let _ = tx.try_send(self.check());
        subscribers.insert(id, Subscriber { tx, missed: 0 });

        tracing::debug!("Health watcher {} registered", id);

        WatchStream {
            id,
            rx,
            shared: Arc::clone(&self.shared),
        }
    }

    /// Number of live Watch registrations
    pub fn subscriber_count(&self) -> usize {
        self.shared.subscribers.lock().len()
    }

    /// Report `NotServing`, stop the publisher and end every stream
    pub fn stop(&self) {
        self.set_status(ServingStatus::NotServing);

        // Dropping the sender wakes the publisher's select
        self.shutdown_tx.lock().take();
        if let Some(handle) = self.publisher.lock().take() {
            let _ = handle.join();
        }

        self.shared.subscribers.lock().clear();
    }
}

impl Default for HealthMonitor {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

/// One Watch subscription; unregisters itself when dropped
pub struct WatchStream {
    id: u64,
    rx: Receiver<ServingStatus>,
    shared: Arc<Shared>,
}

impl WatchStream {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait at most `timeout` for the next status
    ///
    /// `Ok(None)` on timeout; a closed stream returns
    /// `Err(RecvTimeoutError::Disconnected)`.
    pub fn next_timeout(&self, timeout: Duration) -> Result<Option<ServingStatus>, RecvTimeoutError> {
        match self.rx.recv_timeout(timeout) {
            Ok(status) => Ok(Some(status)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

impl Iterator for WatchStream {
    type Item = ServingStatus;

    fn next(&mut self) -> Option<Self::Item> {
        self.rx.recv().ok()
    }
}

impl Drop for WatchStream {
    fn drop(&mut self) {
        if self.shared.subscribers.lock().remove(&self.id).is_some() {
            tracing::debug!("Health watcher {} unregistered", self.id);
        }
    }
}
