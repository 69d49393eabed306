//! Asynchronous rotating log writer
//!
//! Callers submit entries through a bounded channel; a dedicated worker thread
//! applies them in order and performs every rollover. Writes never block and
//! never fail from the caller's point of view.

use std::fs::{self, OpenOptions};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, TryLockError};
use std::thread::{self, JoinHandle};

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::level::{LogEntry, LogLevel};
use super::policy::{Clock, LogPolicy, SystemClock};
use super::retention::{list_log_files, list_log_files_sorted, LogFileInfo};
use super::rollover::Roller;
use crate::error::{FileLoggerError, Result};

/// Default queue capacity between callers and the worker
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Work items processed by the worker, strictly in submission order
enum Command {
    Append(LogEntry),
    Flush(oneshot::Sender<()>),
    DeleteAll(oneshot::Sender<Result<usize>>),
}

/// Handle to a running worker thread
struct Worker {
    sender: mpsc::Sender<Command>,
    cancelled: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl Worker {
    fn spawn(roller: Roller, capacity: usize) -> Result<Self> {
        let (sender, receiver) = mpsc::channel(capacity);
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);

        let thread = thread::Builder::new()
            .name("file-logger".to_string())
            .spawn(move || run(receiver, roller, flag))
            .map_err(|e| FileLoggerError::io("failed to spawn writer for", "file-logger", e))?;

        Ok(Self {
            sender,
            cancelled,
            thread: Some(thread),
        })
    }

    /// Stop the worker, discarding everything still queued
    fn cancel(mut self) {
        self.cancelled.store(true, Ordering::Release);
        self.join();
    }

    fn join(&mut self) {
        // Replace the sender so the receiver observes a closed channel
        let (closed, _) = mpsc::channel(1);
        drop(std::mem::replace(&mut self.sender, closed));
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Log writer thread panicked");
            }
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        // Drains pending entries unless cancelled
        self.join();
    }
}

fn run(mut receiver: mpsc::Receiver<Command>, mut roller: Roller, cancelled: Arc<AtomicBool>) {
    while let Some(command) = receiver.blocking_recv() {
        if cancelled.load(Ordering::Acquire) {
            debug!("Log writer reconfigured, discarding queued entries");
            break;
        }

        match command {
            Command::Append(entry) => {
                if let Err(e) = roller.append(&entry) {
                    warn!(
                        error = %e,
                        severity = entry.level.as_str(),
                        "Failed to write log entry"
                    );
                }
            }
            Command::Flush(done) => {
                if let Err(e) = roller.flush() {
                    warn!(error = %e, "Failed to flush log file");
                }
                let _ = done.send(());
            }
            Command::DeleteAll(reply) => {
                let _ = reply.send(roller.delete_all());
            }
        }
    }

    if let Err(e) = roller.flush() {
        warn!(error = %e, "Failed to flush log file on shutdown");
    }
}

enum WriterState {
    Unconfigured,
    Configured {
        policy: LogPolicy,
        worker: Worker,
        /// Bumped by every successful `configure`
        generation: u64,
    },
}

impl WriterState {
    fn generation(&self) -> Option<u64> {
        match self {
            WriterState::Configured { generation, .. } => Some(*generation),
            WriterState::Unconfigured => None,
        }
    }
}

/// Rotating file writer with an explicit `Unconfigured`/`Configured` lifecycle
pub struct RotatingLogWriter {
    state: RwLock<WriterState>,
    clock: Arc<dyn Clock>,
    queue_capacity: usize,
    dropped: AtomicU64,
    generation: AtomicU64,
    #[cfg(test)]
    fail_next_start: AtomicBool,
}

impl Default for RotatingLogWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl RotatingLogWriter {
    /// Create an unconfigured writer using the local clock
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an unconfigured writer with a custom date source
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: RwLock::new(WriterState::Unconfigured),
            clock,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            dropped: AtomicU64::new(0),
            generation: AtomicU64::new(0),
            #[cfg(test)]
            fail_next_start: AtomicBool::new(false),
        }
    }

    /// Set the queue capacity used by subsequent `configure` calls
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Whether a policy is currently active
    pub fn is_configured(&self) -> bool {
        matches!(
            *self.state.read().unwrap_or_else(PoisonError::into_inner),
            WriterState::Configured { .. }
        )
    }

    /// The policy in effect, if any
    pub fn policy(&self) -> Option<LogPolicy> {
        match &*self.state.read().unwrap_or_else(PoisonError::into_inner) {
            WriterState::Configured { policy, .. } => Some(policy.clone()),
            WriterState::Unconfigured => None,
        }
    }

    /// Number of entries dropped because the queue was full
    pub fn dropped_entries(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Apply `policy`, replacing any running configuration
    ///
    /// Entries queued under the previous configuration are discarded. On
    /// failure the previous configuration stays in place.
    pub fn configure(&self, policy: LogPolicy) -> Result<()> {
        self.apply(policy, None).map(|_| ())
    }

    /// Install `policy`; with `expected` set, only while that generation is current
    ///
    /// Returns `Ok(false)` when a newer configuration won.
    fn apply(&self, policy: LogPolicy, expected: Option<u64>) -> Result<bool> {
        if expected.is_some() && self.current_generation() != expected {
            return Ok(false);
        }

        policy.validate()?;

        fs::create_dir_all(&policy.directory).map_err(|source| {
            FileLoggerError::Configuration {
                path: policy.directory.clone(),
                source,
            }
        })?;

        // Check writability while the previous worker still owns the file
        let active_path = policy.names().active();
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&active_path)
            .map_err(|source| FileLoggerError::Configuration {
                path: active_path.clone(),
                source,
            })?;

        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if expected.is_some() && state.generation() != expected {
            return Ok(false);
        }

        let previous = match std::mem::replace(&mut *state, WriterState::Unconfigured) {
            WriterState::Configured { policy, worker, .. } => {
                worker.cancel();
                Some(policy)
            }
            WriterState::Unconfigured => None,
        };

        match self.start(&policy) {
            Ok(worker) => {
                let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
                info!(
                    dir = %policy.directory.display(),
                    scheme = ?policy.scheme(),
                    generation,
                    "Log writer configured"
                );
                *state = WriterState::Configured {
                    policy,
                    worker,
                    generation,
                };
                Ok(true)
            }
            Err(e) => {
                if let Some(previous) = previous {
                    match self.start(&previous) {
                        Ok(worker) => {
                            let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
                            warn!(error = %e, "Reconfiguration failed, previous log policy restored");
                            *state = WriterState::Configured {
                                policy: previous,
                                worker,
                                generation,
                            };
                        }
                        Err(restore) => {
                            warn!(error = %restore, "Failed to restore previous log policy");
                        }
                    }
                }
                Err(e)
            }
        }
    }

    fn start(&self, policy: &LogPolicy) -> Result<Worker> {
        #[cfg(test)]
        {
            if self.fail_next_start.swap(false, Ordering::SeqCst) {
                return Err(FileLoggerError::Configuration {
                    path: policy.names().active(),
                    source: std::io::Error::other("writer start failed"),
                });
            }
        }

        let roller = Roller::open(policy, Arc::clone(&self.clock))?;
        Worker::spawn(roller, self.queue_capacity)
    }

    fn current_generation(&self) -> Option<u64> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .generation()
    }

    /// Queue a message for the active file
    ///
    /// Never blocks. Entries are dropped when unconfigured, while a
    /// reconfiguration is in progress, or when the queue is full.
    pub fn write(&self, level: LogLevel, message: impl Into<String>) {
        // A reconfiguration in progress holds the lock; its queue is being discarded anyway
        let state = match self.state.try_read() {
            Ok(state) => state,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => {
                debug!("Log writer reconfiguring, dropping entry");
                return;
            }
        };
        let WriterState::Configured { worker, .. } = &*state else {
            return;
        };

        match worker
            .sender
            .try_send(Command::Append(LogEntry::new(level, message)))
        {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(dropped, "Log queue full, dropping entry");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!("Log writer stopped, dropping entry");
            }
        }
    }

    /// Wait until every entry submitted so far is on disk
    pub async fn flush(&self) -> Result<()> {
        let Some(sender) = self.sender() else {
            return Ok(());
        };
        let (done, wait) = oneshot::channel();
        sender
            .send(Command::Flush(done))
            .await
            .map_err(|_| FileLoggerError::WriterStopped)?;
        drop(sender);
        wait.await.map_err(|_| FileLoggerError::WriterStopped)
    }

    /// Delete every log file, then start over with the remembered policy
    ///
    /// Runs on the worker so it cannot race a rollover. Deletion stops at the
    /// first failure without rolling back. Returns the number of files
    /// deleted; an unconfigured writer has nothing to delete. A `configure`
    /// that lands meanwhile wins: its policy is kept as is.
    pub async fn delete_all(&self) -> Result<usize> {
        let (sender, policy, generation) = {
            let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
            match &*state {
                WriterState::Configured {
                    policy,
                    worker,
                    generation,
                } => (worker.sender.clone(), policy.clone(), *generation),
                WriterState::Unconfigured => return Ok(0),
            }
        };

        let (reply, wait) = oneshot::channel();
        let sent = sender.send(Command::DeleteAll(reply)).await;
        drop(sender);
        let outcome = match sent {
            Ok(()) => wait.await.ok(),
            Err(_) => None,
        };

        let Some(outcome) = outcome else {
            // The worker was cancelled before it got to the request
            if self.current_generation() != Some(generation) {
                debug!("Log writer reconfigured during delete, nothing deleted");
                return Ok(0);
            }
            return Err(FileLoggerError::WriterStopped);
        };
        let deleted = outcome?;

        info!(deleted, "Deleted all log files");
        if !self.apply(policy, Some(generation))? {
            debug!("Log writer reconfigured during delete, keeping newer policy");
        }
        Ok(deleted)
    }

    /// Retained log files, oldest first by modification time
    pub fn list_retained_files(&self) -> Result<Vec<LogFileInfo>> {
        match self.policy() {
            Some(policy) => list_log_files_sorted(&policy.directory),
            None => Ok(Vec::new()),
        }
    }

    /// Retained log files in directory order
    pub fn list_retained_files_unsorted(&self) -> Result<Vec<LogFileInfo>> {
        match self.policy() {
            Some(policy) => list_log_files(&policy.directory),
            None => Ok(Vec::new()),
        }
    }

    fn sender(&self) -> Option<mpsc::Sender<Command>> {
        match &*self.state.read().unwrap_or_else(PoisonError::into_inner) {
            WriterState::Configured { worker, .. } => Some(worker.sender.clone()),
            WriterState::Unconfigured => None,
        }
    }
}
