//! Bounded pool of worker threads for blocking work.
//!
//! The reactor thread must never block on anything but the poller. Work
//! that cannot be expressed as readiness (DNS lookups, regular-file I/O)
//! is pushed here instead. Each job posts its output back to the reactor
//! through the command channel and wakes the poller.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

pub(crate) type Job = Box<dyn FnOnce() + Send + 'static>;

/// Queue shared between the reactor and the workers.
struct Injector {
    jobs: Mutex<VecDeque<Job>>,
    available: Condvar,
    shutdown: AtomicBool,
}

impl Injector {
    /// Blocks until a job is available or the pool shuts down.
    fn pop(&self) -> Option<Job> {
        let mut jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());

        loop {
            if let Some(job) = jobs.pop_front() {
                return Some(job);
            }

            if self.shutdown.load(Ordering::Acquire) {
                return None;
            }

            jobs = self
                .available
                .wait(jobs)
                .unwrap_or_else(|e| e.into_inner());
        }
    }
}

/// Pool of lazily spawned worker threads.
///
/// Threads are started on demand, one per submitted job, until the
/// configured maximum is reached; after that, jobs queue up.
pub(crate) struct BlockingPool {
    /// Queue shared with every worker.
    injector: Arc<Injector>,

    /// Join handles for the spawned workers.
    handles: Vec<JoinHandle<()>>,

    /// Upper bound on the number of workers.
    max_threads: usize,
}

impl BlockingPool {
    pub(crate) fn new(max_threads: usize) -> Self {
        Self {
            injector: Arc::new(Injector {
                jobs: Mutex::new(VecDeque::new()),
                available: Condvar::new(),
                shutdown: AtomicBool::new(false),
            }),
            handles: Vec::new(),
            max_threads: max_threads.max(1),
        }
    }

    /// Queues a job, spawning a worker if the pool is below its bound.
    pub(crate) fn spawn(&mut self, job: Job) {
        {
            let mut jobs = self.injector.jobs.lock().unwrap_or_else(|e| e.into_inner());
            jobs.push_back(job);
        }
        self.injector.available.notify_one();

        if self.handles.len() < self.max_threads {
            let injector = self.injector.clone();
            let name = format!("vesper-blocking-{}", self.handles.len());

            match thread::Builder::new()
                .name(name)
                .spawn(move || worker_loop(injector))
            {
                Ok(handle) => self.handles.push(handle),
                Err(e) if self.handles.is_empty() => {
                    log::error!("failed to spawn blocking worker: {e}");
                }
                Err(e) => log::warn!("blocking pool stays at {} workers: {e}", self.handles.len()),
            }
        }
    }

    /// Number of spawned workers.
    pub(crate) fn workers(&self) -> usize {
        self.handles.len()
    }
}

fn worker_loop(injector: Arc<Injector>) {
    while let Some(job) = injector.pop() {
        job();
    }
}

impl Drop for BlockingPool {
    /// Signals every worker to exit once the queue is empty.
    ///
    /// Workers are detached rather than joined: one of them may be stuck
    /// in a lookup with no timeout, and its result has nowhere to go.
    fn drop(&mut self) {
        self.injector.shutdown.store(true, Ordering::Release);
        self.injector.available.notify_all();
        self.handles.clear();
    }
}
