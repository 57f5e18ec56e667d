//! WAL Worker
//!
//! Runs a [`WalWriter`] on its own thread so that every log write can be
//! waited on with a deadline.
//!
//! A caller that gives up on a job marks it abandoned. When the thread later
//! finishes an abandoned job it rewinds any entries the job appended, so the
//! log never holds a mutation whose caller was told it failed.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, SendTimeoutError, Sender};
use parking_lot::{Condvar, Mutex};

use crate::error::{QueueError, Result};
use super::{Operation, WalWriter};

/// Jobs that may wait for the thread before submission itself times out
const QUEUE_DEPTH: usize = 16;

type Job = Box<dyn FnOnce(&mut WalWriter) + Send>;

enum SlotState<T> {
    Pending,
    Done(Result<T>),
    Abandoned,
}

/// Hand-off point between the log thread and one waiting caller
struct Slot<T> {
    state: Mutex<SlotState<T>>,
    ready: Condvar,
}

impl<T> Slot<T> {
    fn new() -> Self {
        Self {
            state: Mutex::new(SlotState::Pending),
            ready: Condvar::new(),
        }
    }

    /// Deliver a result; false if the caller already gave up
    fn fulfil(&self, result: Result<T>) -> bool {
        let mut state = self.state.lock();
        if matches!(*state, SlotState::Abandoned) {
            return false;
        }
        *state = SlotState::Done(result);
        self.ready.notify_one();
        true
    }

    /// Wait until `deadline`; on expiry the slot is abandoned
    fn wait_until(&self, deadline: Instant) -> Option<Result<T>> {
        let mut state = self.state.lock();
        loop {
            let finished = matches!(*state, SlotState::Done(_))
                || self.ready.wait_until(&mut state, deadline).timed_out();

            if finished {
                return match std::mem::replace(&mut *state, SlotState::Abandoned) {
                    SlotState::Done(result) => Some(result),
                    _ => None,
                };
            }
        }
    }
}

/// A WAL writer owned by a dedicated thread
///
/// Every operation returns within `timeout`. LSN and entry counters are
/// mirrored on the caller side from completed jobs only.
pub struct WalWorker {
    path: PathBuf,
    timeout: Duration,
    jobs: Option<Sender<Job>>,
    exited: Receiver<()>,
    thread: Option<JoinHandle<()>>,
    next_lsn: u64,
    entries: u64,
}

impl WalWorker {
    /// Move `writer` onto a new thread
    pub fn spawn(writer: WalWriter, timeout: Duration) -> Result<Self> {
        let path = writer.path().to_path_buf();
        let next_lsn = writer.current_lsn();
        let entries = writer.entry_count();

        let (jobs_tx, jobs_rx) = channel::bounded::<Job>(QUEUE_DEPTH);
        let (exited_tx, exited_rx) = channel::bounded::<()>(1);

        let thread = thread::Builder::new()
            .name("wal-writer".to_string())
            .spawn(move || {
                let mut writer = writer;
                for job in jobs_rx {
                    job(&mut writer);
                }
                drop(writer);
                let _ = exited_tx.send(());
            })?;

        Ok(Self {
            path,
            timeout,
            jobs: Some(jobs_tx),
            exited: exited_rx,
            thread: Some(thread),
            next_lsn,
            entries,
        })
    }

    /// Append an entry; returns its LSN
    ///
    /// On timeout the entry is never applied: if the stalled write completes
    /// later it is rewound before the next job runs.
    pub fn append(&mut self, epoch: u64, operation: Operation) -> Result<u64> {
        let lsn = self.submit(move |writer| writer.append(epoch, operation))?;
        self.next_lsn = lsn + 1;
        self.entries += 1;
        Ok(lsn)
    }

    /// Force sync to disk
    pub fn sync(&mut self) -> Result<()> {
        self.submit(|writer| writer.sync())
    }

    /// Drop every entry; LSNs keep counting
    pub fn truncate(&mut self) -> Result<()> {
        self.submit(|writer| writer.truncate())?;
        self.entries = 0;
        Ok(())
    }

    /// Run `task` on the log thread and wait at most `timeout` for it
    pub fn submit<T, F>(&self, task: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut WalWriter) -> Result<T> + Send + 'static,
    {
        let deadline = Instant::now() + self.timeout;
        let slot = Arc::new(Slot::new());
        let job_slot = Arc::clone(&slot);

        let job: Job = Box::new(move |writer: &mut WalWriter| {
            let mark = writer.mark();
            let result = task(writer);
            if !job_slot.fulfil(result) {
                // Nobody is waiting: this write must not survive
                if let Err(e) = writer.rewind(mark) {
                    tracing::error!("WAL {}: abandoned write kept: {}", writer.path().display(), e);
                }
            }
        });

        let jobs = self.jobs.as_ref().ok_or_else(|| self.stopped())?;
        match jobs.send_timeout(job, deadline.saturating_duration_since(Instant::now())) {
            Ok(()) => {}
            Err(SendTimeoutError::Timeout(_)) => return Err(self.timed_out()),
            Err(SendTimeoutError::Disconnected(_)) => return Err(self.stopped()),
        }

        slot.wait_until(deadline).unwrap_or_else(|| Err(self.timed_out()))
    }

    /// LSN the next successful append will get
    pub fn current_lsn(&self) -> u64 {
        self.next_lsn
    }

    /// Entries appended since the last truncation
    pub fn entry_count(&self) -> u64 {
        self.entries
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn timed_out(&self) -> QueueError {
        tracing::error!(
            "WAL {}: write did not complete within {:?}",
            self.path.display(),
            self.timeout
        );
        QueueError::WalWrite(format!(
            "write to {} timed out after {:?}",
            self.path.display(),
            self.timeout
        ))
    }

    fn stopped(&self) -> QueueError {
        QueueError::WalWrite(format!("writer thread for {} has stopped", self.path.display()))
    }
}

impl Drop for WalWorker {
    /// Let queued jobs finish, but never wait on a stalled disk for longer
    /// than one timeout
    fn drop(&mut self) {
        self.jobs.take();

        match self.exited.recv_timeout(self.timeout) {
            Ok(()) | Err(channel::RecvTimeoutError::Disconnected) => {
                if let Some(thread) = self.thread.take() {
                    let _ = thread.join();
                }
            }
            Err(channel::RecvTimeoutError::Timeout) => {
                tracing::warn!(
                    "WAL {}: writer thread still busy at close, detaching",
                    self.path.display()
                );
            }
        }
    }
}
