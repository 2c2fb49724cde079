//! Bounded worker pool.
//!
//! N long-lived workers drain one FIFO queue of capacity 2N. Submission never
//! blocks (`submit`) unless the caller opts into waiting
//! (`submit_with_timeout`). `stop` cancels the shared token, waits for every
//! worker to leave its loop, and drops whatever was still queued.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use quill_core::PoolConfig;

use crate::error::{PoolError, TaskError};
use crate::task::Task;

type Queue = mpsc::Receiver<Box<dyn Task>>;

/// Point-in-time view of the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WorkerPoolStats {
    pub workers: usize,
    pub queue_depth: usize,
    pub queue_capacity: usize,
    pub completed: u64,
    pub failed: u64,
    pub in_flight: usize,
}

#[derive(Debug, Default)]
struct Counters {
    /// Tasks holding a queue slot. Raised before the send, lowered only
    /// after the receiving worker has raised `in_flight`.
    queued: AtomicUsize,
    completed: AtomicU64,
    failed: AtomicU64,
    in_flight: AtomicUsize,
}

pub struct WorkerPool {
    workers: usize,
    capacity: usize,
    tx: mpsc::Sender<Box<dyn Task>>,
    rx: Arc<Mutex<Queue>>,
    cancel: CancellationToken,
    counters: Arc<Counters>,
    handles: StdMutex<Vec<JoinHandle<()>>>,
    started: AtomicBool,
}

impl WorkerPool {
    pub fn new(config: &PoolConfig) -> Self {
        let workers = config.resolved_workers();
        let capacity = config.queue_capacity();
        let (tx, rx) = mpsc::channel(capacity);
        WorkerPool {
            workers,
            capacity,
            tx,
            rx: Arc::new(Mutex::new(rx)),
            cancel: CancellationToken::new(),
            counters: Arc::new(Counters::default()),
            handles: StdMutex::new(Vec::new()),
            started: AtomicBool::new(false),
        }
    }

    pub fn worker_count(&self) -> usize {
        self.workers
    }

    pub fn queue_capacity(&self) -> usize {
        self.capacity
    }

    /// Shared cancellation token handed to every task.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.is_started() && !self.cancel.is_cancelled()
    }

    /// Spawn the workers. Calling this more than once has no effect.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self) -> Result<(), PoolError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| PoolError::NoRuntime)?;
        if self.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let mut handles = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
        for worker_id in 0..self.workers {
            let rx = Arc::clone(&self.rx);
            let cancel = self.cancel.clone();
            let counters = Arc::clone(&self.counters);
            handles.push(runtime.spawn(worker_loop(worker_id, rx, cancel, counters)));
        }
        tracing::info!(workers = self.workers, capacity = self.capacity, "worker pool started");
        Ok(())
    }

    /// Enqueue without waiting.
    pub fn submit(&self, task: Box<dyn Task>) -> Result<(), PoolError> {
        if self.cancel.is_cancelled() {
            return Err(PoolError::ShuttingDown);
        }
        let permit = self.tx.try_reserve().map_err(|err| match err {
            mpsc::error::TrySendError::Full(()) => PoolError::QueueFull,
            mpsc::error::TrySendError::Closed(()) => PoolError::ShuttingDown,
        })?;
        self.counters.queued.fetch_add(1, Ordering::SeqCst);
        permit.send(task);
        Ok(())
    }

    /// Enqueue, waiting up to `timeout` for queue space.
    pub async fn submit_with_timeout(
        &self,
        task: Box<dyn Task>,
        timeout: Duration,
    ) -> Result<(), PoolError> {
        if self.cancel.is_cancelled() {
            return Err(PoolError::ShuttingDown);
        }
        let permit = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(PoolError::ShuttingDown),
            reserved = tokio::time::timeout(timeout, self.tx.reserve()) => match reserved {
                Ok(Ok(permit)) => permit,
                Ok(Err(_closed)) => return Err(PoolError::ShuttingDown),
                Err(_elapsed) => return Err(PoolError::Timeout(timeout)),
            },
        };
        self.counters.queued.fetch_add(1, Ordering::SeqCst);
        permit.send(task);
        Ok(())
    }

    /// Cancel every worker and wait for all of them to exit.
    ///
    /// Tasks still queued are dropped without running.
    pub async fn stop(&self) {
        self.cancel.cancel();

        let handles = {
            let mut guard = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::take(&mut *guard)
        };
        for handle in handles {
            if let Err(err) = handle.await {
                tracing::error!(error = %err, "worker exited abnormally");
            }
        }

        let mut rx = self.rx.lock().await;
        rx.close();
        let mut abandoned = 0usize;
        while rx.try_recv().is_ok() {
            self.counters.queued.fetch_sub(1, Ordering::SeqCst);
            abandoned += 1;
        }
        tracing::info!(abandoned, "worker pool stopped");
    }

    /// Lock-free snapshot of the counters.
    ///
    /// Every accepted task is counted in `queue_depth` or `in_flight` until
    /// it finishes: a worker raises `in_flight` before lowering the depth.
    pub fn stats(&self) -> WorkerPoolStats {
        WorkerPoolStats {
            workers: self.workers,
            queue_depth: self.counters.queued.load(Ordering::SeqCst),
            queue_capacity: self.capacity,
            completed: self.counters.completed.load(Ordering::SeqCst),
            failed: self.counters.failed.load(Ordering::SeqCst),
            in_flight: self.counters.in_flight.load(Ordering::SeqCst),
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    rx: Arc<Mutex<Queue>>,
    cancel: CancellationToken,
    counters: Arc<Counters>,
) {
    loop {
        let task = {
            let mut queue = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                guard = rx.lock() => guard,
            };
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                next = queue.recv() => next,
            };
            match next {
                Some(task) => {
                    counters.in_flight.fetch_add(1, Ordering::SeqCst);
                    counters.queued.fetch_sub(1, Ordering::SeqCst);
                    task
                }
                None => break,
            }
        };

        let task_id = task.id();
        // Spawned so a panicking body fails the task instead of the worker.
        let outcome = match tokio::spawn(task.execute(cancel.clone())).await {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::error!(worker_id, task_id = %task_id, error = %err, "task panicked");
                Err(TaskError::Join(err.to_string()))
            }
        };
        // Outcome counters first so in_flight == 0 implies they are current.
        match outcome {
            Ok(()) => {
                counters.completed.fetch_add(1, Ordering::SeqCst);
            }
            Err(err) => {
                counters.failed.fetch_add(1, Ordering::SeqCst);
                tracing::debug!(worker_id, task_id = %task_id, error = %err, "task failed");
            }
        }
        counters.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
    tracing::debug!(worker_id, "worker exiting");
}
