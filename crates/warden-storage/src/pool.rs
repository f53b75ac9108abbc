//! Bounded worker pool for the relational backend.
//!
//! Operations are submitted as boxed closures onto a bounded
//! `crossbeam-queue` inbox and executed by a small set of worker threads.
//! Callers block on a reply channel with a fixed deadline; an elapsed
//! deadline surfaces as [`StorageError::Timeout`], which is distinct from
//! an empty result. The operation may still run on the worker after the
//! caller has given up.
//!
//! When the inbox is full, submission retries until the same deadline
//! instead of growing an unbounded backlog.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, mpsc};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_queue::ArrayQueue;

use crate::{Result, StorageError};

type Job = Box<dyn FnOnce() + Send + 'static>;

enum Task {
    Run(Job),
    Shutdown,
}

/// Fixed-size pool of worker threads draining one bounded inbox.
pub(crate) struct WorkerPool {
    inbox: Arc<ArrayQueue<Task>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    closed: AtomicBool,
    deadline: Duration,
}

impl WorkerPool {
    /// Spawns `workers` threads named `{name}-{index}`.
    pub(crate) fn start(
        name: &str,
        workers: usize,
        capacity: usize,
        deadline: Duration,
    ) -> Result<Self> {
        assert!(workers > 0, "worker pool needs at least one worker");
        assert!(capacity > 0, "inbox capacity must be positive");

        let inbox: Arc<ArrayQueue<Task>> = Arc::new(ArrayQueue::new(capacity));
        let mut handles = Vec::with_capacity(workers);
        for index in 0..workers {
            let inbox = Arc::clone(&inbox);
            let handle = thread::Builder::new()
                .name(format!("{name}-{index}"))
                .spawn(move || {
                    loop {
                        match inbox.pop() {
                            Some(Task::Run(job)) => job(),
                            Some(Task::Shutdown) => break,
                            // Short sleep rather than a pure spin; storage
                            // calls are not latency-critical at that scale.
                            None => thread::sleep(Duration::from_millis(1)),
                        }
                    }
                })?;
            handles.push(handle);
        }

        Ok(Self {
            inbox,
            workers: Mutex::new(handles),
            closed: AtomicBool::new(false),
            deadline,
        })
    }

    pub(crate) fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Runs `op` on a worker thread and waits for its result.
    pub(crate) fn call<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let job: Job = Box::new(move || {
            // The receiver may have timed out and gone away; nothing to do
            // with the result in that case.
            let _ = tx.send(op());
        });
        self.submit(Task::Run(job))?;

        match rx.recv_timeout(self.deadline) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => Err(StorageError::Timeout(self.deadline)),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(StorageError::Closed),
        }
    }

    /// Stops accepting work, drains the workers, and joins their threads.
    /// Idempotent.
    pub(crate) fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let handles = std::mem::take(
            &mut *self.workers.lock().unwrap_or_else(PoisonError::into_inner),
        );
        for _ in &handles {
            let mut task = Task::Shutdown;
            while let Err(returned) = self.inbox.push(task) {
                task = returned;
                thread::sleep(Duration::from_millis(1));
            }
        }
        for handle in handles {
            let _ = handle.join();
        }
    }

    fn submit(&self, task: Task) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StorageError::Closed);
        }
        let started = Instant::now();
        let mut task = task;
        loop {
            match self.inbox.push(task) {
                Ok(()) => return Ok(()),
                Err(returned) => {
                    if started.elapsed() >= self.deadline {
                        return Err(StorageError::Timeout(self.deadline));
                    }
                    task = returned;
                    thread::sleep(Duration::from_millis(1));
                }
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}
