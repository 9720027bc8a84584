use parking_lot::Mutex;
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::error::{Result, ServiceError};

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Snapshot of the pool's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub workers: usize,
    pub queue_capacity: usize,
    /// Jobs sitting in the queue right now.
    pub queued: usize,
    /// Jobs handed to the workers.
    pub submitted: u64,
    /// Jobs that found the queue full (or the pool closed) and ran on the caller.
    pub ran_inline: u64,
}

#[derive(Debug, Default)]
struct Counters {
    submitted: AtomicU64,
    ran_inline: AtomicU64,
}

/// Completion handle for a submitted job.
#[derive(Debug)]
pub struct JobHandle<T> {
    rx: oneshot::Receiver<T>,
}

impl<T> JobHandle<T> {
    /// Waits for the job's output.
    ///
    /// Returns `None` if the job panicked or was dropped by a shutdown.
    pub async fn wait(self) -> Option<T> {
        self.rx.await.ok()
    }
}

/// A fixed set of worker tasks draining a bounded queue.
///
/// When the queue is full, [`WorkerPool::submit`] runs the job on the calling
/// task instead, so work is slowed down but never dropped.
#[derive(Debug)]
pub struct WorkerPool {
    sender: Mutex<Option<mpsc::Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    worker_count: usize,
    queue_capacity: usize,
    counters: Arc<Counters>,
}

impl WorkerPool {
    /// Spawns `workers` tasks on the current tokio runtime.
    pub fn new(workers: usize, queue_capacity: usize) -> Result<Self> {
        if workers == 0 {
            return Err(ServiceError::InvalidConfig(
                "worker pool needs at least one worker".to_string(),
            ));
        }
        if queue_capacity == 0 {
            return Err(ServiceError::InvalidConfig(
                "worker pool queue capacity must be at least 1".to_string(),
            ));
        }

        let (tx, rx) = mpsc::channel::<Job>(queue_capacity);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));

        let handles = (0..workers)
            .map(|worker| {
                let rx = Arc::clone(&rx);
                tokio::spawn(async move {
                    loop {
                        let job = rx.lock().await.recv().await;
                        let Some(job) = job else {
                            trace!(worker, "Queue closed, worker exiting");
                            break;
                        };
                        // A panicking job must not take the worker down with it.
                        if let Err(e) = tokio::spawn(job).await {
                            warn!(worker, error = %e, "Pool job failed");
                        }
                    }
                })
            })
            .collect();

        Ok(Self {
            sender: Mutex::new(Some(tx)),
            workers: Mutex::new(handles),
            worker_count: workers,
            queue_capacity,
            counters: Arc::new(Counters::default()),
        })
    }

    /// Queues `job` and returns a handle to its output.
    ///
    /// If the queue is full the job is run to completion on the caller before
    /// this returns.
    pub async fn submit<F, T>(&self, job: F) -> JobHandle<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job: Job = Box::pin(async move {
            let _ = tx.send(job.await);
        });

        let sender = self.sender.lock().clone();
        let inline = match sender {
            Some(sender) => match sender.try_send(job) {
                Ok(()) => {
                    self.counters.submitted.fetch_add(1, Ordering::Relaxed);
                    None
                }
                Err(mpsc::error::TrySendError::Full(job)) => {
                    debug!("Pool queue full, running job on caller");
                    Some(job)
                }
                Err(mpsc::error::TrySendError::Closed(job)) => Some(job),
            },
            None => Some(job),
        };

        if let Some(job) = inline {
            self.counters.ran_inline.fetch_add(1, Ordering::Relaxed);
            job.await;
        }

        JobHandle { rx }
    }

    pub fn stats(&self) -> PoolStats {
        let queued = self
            .sender
            .lock()
            .as_ref()
            .map(|sender| self.queue_capacity - sender.capacity())
            .unwrap_or(0);

        PoolStats {
            workers: self.worker_count,
            queue_capacity: self.queue_capacity,
            queued,
            submitted: self.counters.submitted.load(Ordering::Relaxed),
            ran_inline: self.counters.ran_inline.load(Ordering::Relaxed),
        }
    }

    /// Closes the queue and waits up to `timeout` for the workers to drain it.
    ///
    /// Workers still running after the timeout are aborted. Jobs submitted
    /// afterwards run on the caller.
    pub async fn shutdown(&self, timeout: Duration) {
        drop(self.sender.lock().take());
        let handles = std::mem::take(&mut *self.workers.lock());
        if handles.is_empty() {
            return;
        }

        let aborts: Vec<_> = handles.iter().map(JoinHandle::abort_handle).collect();
        let drained = tokio::time::timeout(timeout, async {
            for handle in handles {
                let _ = handle.await;
            }
        })
        .await;

        if drained.is_err() {
            warn!(?timeout, "Worker pool did not drain in time, aborting workers");
            for abort in aborts {
                abort.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    #[tokio::test]
    async fn submitted_jobs_return_their_output() {
        let pool = WorkerPool::new(2, 8).unwrap();

        let handle = pool.submit(async { 40 + 2 }).await;
        assert_eq!(handle.wait().await, Some(42));
        assert_eq!(pool.stats().submitted, 1);
        assert_eq!(pool.stats().ran_inline, 0);
    }

    #[tokio::test]
    async fn full_queue_runs_job_on_caller() {
        let pool = WorkerPool::new(1, 1).unwrap();
        let release = Arc::new(Notify::new());

        // Occupy the only worker, then fill the only queue slot.
        let blocker = {
            let release = Arc::clone(&release);
            pool.submit(async move { release.notified().await }).await
        };
        while pool.stats().queued > 0 {
            tokio::task::yield_now().await;
        }
        let queued = pool.submit(async { 1 }).await;

        let ran = Arc::new(AtomicUsize::new(0));
        let inline = {
            let ran = Arc::clone(&ran);
            pool.submit(async move { ran.fetch_add(1, Ordering::SeqCst) + 7 })
                .await
        };

        // The inline job has already completed by the time submit returns.
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert_eq!(inline.wait().await, Some(7));

        release.notify_one();
        assert_eq!(blocker.wait().await, Some(()));
        assert_eq!(queued.wait().await, Some(1));

        let stats = pool.stats();
        assert_eq!(stats.ran_inline, 1);
        assert_eq!(stats.submitted, 2);
    }

    #[tokio::test]
    async fn panicking_job_does_not_kill_worker() {
        let pool = WorkerPool::new(1, 4).unwrap();

        let failed = pool.submit(async { panic!("boom") }).await;
        assert_eq!(failed.wait().await, None::<()>);

        let ok = pool.submit(async { "still alive" }).await;
        assert_eq!(ok.wait().await, Some("still alive"));
    }

    #[tokio::test]
    async fn jobs_after_shutdown_run_inline() {
        let pool = WorkerPool::new(2, 4).unwrap();
        pool.shutdown(Duration::from_secs(1)).await;

        let handle = pool.submit(async { 5 }).await;
        assert_eq!(handle.wait().await, Some(5));
        assert_eq!(pool.stats().ran_inline, 1);
    }

    #[test]
    fn zero_workers_is_rejected() {
        let err = WorkerPool::new(0, 10).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidConfig(_)));
    }
}
