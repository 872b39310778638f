//! Bounded pool for blocking work.
//!
//! Image decode, resize and encode are CPU bound and run on tokio's blocking
//! threads. A semaphore caps how many run at once so a burst of scale requests
//! cannot exhaust the blocking thread pool.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;
use tracing::warn;

use super::error::OperationError;

/// Cloneable handle to the shared blocking pool.
#[derive(Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
    max_workers: usize,
}

impl WorkerPool {
    /// Pool with its own tracker.
    pub fn new(max_workers: usize) -> Self {
        Self::with_tracker(max_workers, TaskTracker::new())
    }

    /// Pool whose jobs are tracked by `tracker`, so shutdown can wait on them.
    pub fn with_tracker(max_workers: usize, tracker: TaskTracker) -> Self {
        let max_workers = max_workers.max(1);
        Self {
            permits: Arc::new(Semaphore::new(max_workers)),
            tracker,
            max_workers,
        }
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Jobs that could start right now without waiting.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Run `job` on a blocking thread once a permit is free.
    pub async fn run<F, T>(&self, job: F) -> Result<T, OperationError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| OperationError::WorkerPool("pool closed".to_string()))?;

        let handle = self.tracker.spawn_blocking(move || {
            let _permit = permit;
            job()
        });

        handle.await.map_err(|e| {
            warn!("Blocking job failed: {}", e);
            OperationError::WorkerPool(e.to_string())
        })
    }
}
