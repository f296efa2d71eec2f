//! Bounded worker pool for blocking work.
//!
//! Storage writes and broker publishes never run on the async dispatch path.
//! They are submitted here and awaited. The pool has its own fixed number of
//! OS threads fed from a FIFO queue of bounded depth; when the queue is full
//! the submitter is suspended until a slot frees up.
//!
//! Jobs must not submit further work to the same pool and wait for it, or a
//! saturated pool deadlocks.

use crate::config::WorkerPool;
use crate::errors::{CompositeError, Result};
use crate::metrics_defs::SCHEDULER_QUEUED;
use parking_lot::Mutex;
use shared::gauge;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use tokio::sync::{mpsc, oneshot};

type Job = Box<dyn FnOnce() + Send + 'static>;

#[derive(Clone)]
pub struct Scheduler {
    tx: mpsc::Sender<Job>,
}

impl Scheduler {
    /// Spawns `pool.size` worker threads. Workers exit once every handle to
    /// the scheduler is dropped and the queue has drained.
    ///
    /// Fails when the pool has no workers or no queue slots.
    pub fn new(pool: &WorkerPool) -> Result<Self> {
        pool.validate().map_err(|e| CompositeError::unexpected(e.to_string()))?;

        let (tx, rx) = mpsc::channel::<Job>(pool.queue_depth);
        let rx = Arc::new(Mutex::new(rx));

        for index in 0..pool.size {
            let rx = rx.clone();
            thread::Builder::new()
                .name(format!("blocking-worker-{index}"))
                .spawn(move || run_worker(rx))
                .map_err(|e| {
                    CompositeError::unexpected(format!("failed to spawn worker thread: {e}"))
                })?;
        }

        tracing::debug!(
            size = pool.size,
            queue_depth = pool.queue_depth,
            "started blocking worker pool"
        );

        Ok(Scheduler { tx })
    }

    /// Runs `work` on the pool and resolves with its result.
    ///
    /// A panic inside `work` is reported as `Unexpected` and does not take
    /// the worker down.
    pub async fn submit<F, T>(&self, work: F) -> Result<T>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (result_tx, result_rx) = oneshot::channel();

        let job: Job = Box::new(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(work)).unwrap_or_else(|_| {
                tracing::error!("blocking task panicked");
                Err(CompositeError::unexpected("blocking task panicked"))
            });
            // The submitter may have gone away; nothing to report to then.
            let _ = result_tx.send(outcome);
        });

        gauge!(SCHEDULER_QUEUED).increment(1.0);
        if self.tx.send(job).await.is_err() {
            gauge!(SCHEDULER_QUEUED).decrement(1.0);
            return Err(CompositeError::unexpected("worker pool is shut down"));
        }

        result_rx
            .await
            .map_err(|_| CompositeError::unexpected("worker dropped blocking task"))?
    }

    /// Number of jobs waiting in the queue.
    pub fn queued(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }
}

fn run_worker(rx: Arc<Mutex<mpsc::Receiver<Job>>>) {
    loop {
        // Only one idle worker waits on the queue at a time; the lock is
        // released before the job runs.
        let job = rx.lock().blocking_recv();
        match job {
            Some(job) => {
                gauge!(SCHEDULER_QUEUED).decrement(1.0);
                job();
            }
            None => break,
        }
    }
}
