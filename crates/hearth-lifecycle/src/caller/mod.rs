//! Fixed-concurrency executor for binding side effects.
//!
//! A [`BoundedCaller`] owns a small pool of named worker threads that pull
//! jobs from a shared FIFO queue. With one worker every job runs in
//! submission order, which is what the lifecycle manager relies on to keep
//! handler construction and disposal causally ordered.
//!
//! Jobs have no timeout. A job that never returns keeps its worker busy,
//! and with a single worker every later job queues behind it.

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use thiserror::Error;
use tracing::{debug, error};

pub(crate) const CALLER_TARGET: &str = "hearth::caller";

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Errors reported by the caller.
#[derive(Debug, Error)]
pub enum CallerError {
    /// The caller no longer accepts work.
    #[error("caller '{name}' is closed")]
    Closed {
        /// Name of the closed caller.
        name: String,
    },
    /// Concurrency must be at least one.
    #[error("caller '{name}' needs at least one worker")]
    InvalidConcurrency {
        /// Name of the caller being built.
        name: String,
    },
    /// A worker thread could not be spawned.
    #[error("failed to spawn worker for caller '{name}': {source}")]
    Spawn {
        /// Name of the caller being built.
        name: String,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Default)]
struct JobTracker {
    pending: Mutex<usize>,
    idle: Condvar,
}

impl JobTracker {
    fn started(&self) {
        *self.pending.lock().unwrap_or_else(PoisonError::into_inner) += 1;
    }

    fn finished(&self) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        *pending = pending.saturating_sub(1);
        if *pending == 0 {
            self.idle.notify_all();
        }
    }

    fn count(&self) -> usize {
        *self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait_idle(&self) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        while *pending > 0 {
            pending = self
                .idle
                .wait(pending)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

/// Asynchronous executor with a fixed number of workers and drain-on-close.
#[derive(Debug)]
pub struct BoundedCaller {
    name: String,
    concurrency: usize,
    sender: Mutex<Option<Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    tracker: Arc<JobTracker>,
}

impl BoundedCaller {
    /// Starts a caller with `concurrency` worker threads.
    ///
    /// # Errors
    ///
    /// Returns [`CallerError::InvalidConcurrency`] for zero workers and
    /// [`CallerError::Spawn`] when the OS refuses a thread.
    pub fn new(name: impl Into<String>, concurrency: usize) -> Result<Self, CallerError> {
        let name = name.into();
        if concurrency == 0 {
            return Err(CallerError::InvalidConcurrency { name });
        }

        let (sender, receiver) = mpsc::channel::<Job>();
        let receiver = Arc::new(Mutex::new(receiver));
        let tracker = Arc::new(JobTracker::default());
        let mut workers = Vec::with_capacity(concurrency);
        for index in 0..concurrency {
            let queue = Arc::clone(&receiver);
            let jobs = Arc::clone(&tracker);
            let worker_name = format!("{name}-{index}");
            let spawned = thread::Builder::new()
                .name(worker_name.clone())
                .spawn(move || run_worker(&worker_name, &queue, &jobs));
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(source) => {
                    drop(sender);
                    for worker in workers {
                        let _joined = worker.join();
                    }
                    return Err(CallerError::Spawn { name, source });
                }
            }
        }

        debug!(target: CALLER_TARGET, caller = %name, concurrency, "caller started");
        Ok(Self {
            name,
            concurrency,
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
            tracker,
        })
    }

    /// Returns the caller name used for worker threads and diagnostics.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Returns the fixed worker count.
    #[must_use]
    pub const fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Returns the number of queued plus running jobs.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.tracker.count()
    }

    /// Returns `true` once [`Self::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Enqueues a job for asynchronous execution.
    ///
    /// # Errors
    ///
    /// Returns [`CallerError::Closed`] after the caller has been closed.
    pub fn submit<F>(&self, job: F) -> Result<(), CallerError>
    where
        F: FnOnce() + Send + 'static,
    {
        let guard = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(sender) = guard.as_ref() else {
            return Err(self.closed());
        };
        self.tracker.started();
        if sender.send(Box::new(job)).is_err() {
            self.tracker.finished();
            return Err(self.closed());
        }
        Ok(())
    }

    /// Blocks until every submitted job has finished.
    ///
    /// Must not be called from inside a job: the calling job itself counts as
    /// pending.
    pub fn wait_idle(&self) {
        self.tracker.wait_idle();
    }

    /// Stops accepting work and waits for queued and running jobs to finish.
    ///
    /// Repeated calls are no-ops. When invoked from one of the caller's own
    /// workers the remaining workers are still joined, but the calling
    /// worker is left to exit on its own.
    pub fn close(&self) {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if sender.is_none() {
            return;
        }
        drop(sender);

        let workers = std::mem::take(
            &mut *self.workers.lock().unwrap_or_else(PoisonError::into_inner),
        );
        let current = thread::current().id();
        for worker in workers {
            if worker.thread().id() == current {
                continue;
            }
            if worker.join().is_err() {
                error!(target: CALLER_TARGET, caller = %self.name, "caller worker panicked");
            }
        }
        debug!(target: CALLER_TARGET, caller = %self.name, "caller closed");
    }

    fn closed(&self) -> CallerError {
        CallerError::Closed {
            name: self.name.clone(),
        }
    }
}

impl Drop for BoundedCaller {
    fn drop(&mut self) {
        self.close();
    }
}

fn run_worker(name: &str, queue: &Mutex<Receiver<Job>>, tracker: &JobTracker) {
    loop {
        let next = queue.lock().unwrap_or_else(PoisonError::into_inner).recv();
        let Ok(job) = next else {
            break;
        };
        if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
            error!(target: CALLER_TARGET, worker = name, "caller job panicked");
        }
        tracker.finished();
    }
}
