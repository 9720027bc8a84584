use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use stubby_core::{Repository, ShortCode};
use tokio::sync::{watch, MutexGuard};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::pool::WorkerPool;

/// Counts from one flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FlushReport {
    /// Codes taken out of the buffer.
    pub codes: u64,
    /// Increments the store applied.
    pub increments: u64,
    /// Codes whose delta went back into the buffer.
    pub failed: u64,
    /// Codes whose mapping no longer exists; their delta is discarded.
    pub dropped: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Another flush was already running.
    Skipped,
    Flushed(FlushReport),
}

/// Coalesces access counts in memory and writes them to the store in batches.
///
/// [`record`](Self::record) only touches a `DashMap` entry, so the read path
/// never waits on the store. [`flush`](Self::flush) takes each code's delta
/// out of the buffer and issues one increment per code through the worker
/// pool. Failed increments put their delta back for the next cycle, so counts
/// may be late but are not lost while the process lives.
#[derive(Debug)]
pub struct AccessCountAggregator<R> {
    repository: Arc<R>,
    pool: Arc<WorkerPool>,
    buffer: DashMap<ShortCode, u64>,
    flush_lock: tokio::sync::Mutex<()>,
    shutdown_tx: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<R: Repository> AccessCountAggregator<R> {
    pub fn new(repository: Arc<R>, pool: Arc<WorkerPool>) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            repository,
            pool,
            buffer: DashMap::new(),
            flush_lock: tokio::sync::Mutex::new(()),
            shutdown_tx,
            task: Mutex::new(None),
        }
    }

    /// Adds one access for `code`.
    pub fn record(&self, code: &ShortCode) {
        self.add(code.clone(), 1);
    }

    /// Buffered delta for `code`.
    pub fn pending(&self, code: &ShortCode) -> u64 {
        self.buffer.get(code).map(|delta| *delta).unwrap_or(0)
    }

    /// Number of codes with a buffered delta.
    pub fn pending_codes(&self) -> usize {
        self.buffer.len()
    }

    fn add(&self, code: ShortCode, delta: u64) {
        let mut entry = self.buffer.entry(code).or_insert(0);
        *entry = entry.saturating_add(delta);
    }

    /// Writes buffered deltas to the store.
    ///
    /// Returns [`FlushOutcome::Skipped`] without doing anything if another
    /// flush holds the lock.
    pub async fn flush(&self) -> FlushOutcome {
        let Ok(guard) = self.flush_lock.try_lock() else {
            debug!("Flush already in progress, skipping");
            return FlushOutcome::Skipped;
        };
        FlushOutcome::Flushed(self.drain(guard).await)
    }

    async fn drain(&self, _guard: MutexGuard<'_, ()>) -> FlushReport {
        let mut report = FlushReport::default();
        let codes: Vec<ShortCode> = self.buffer.iter().map(|entry| entry.key().clone()).collect();
        if codes.is_empty() {
            return report;
        }

        let mut in_flight = Vec::with_capacity(codes.len());
        for code in codes {
            let Some((code, delta)) = self.buffer.remove(&code) else {
                continue;
            };
            report.codes += 1;

            let id = match self.repository.find_by_code(&code).await {
                Ok(Some(mapping)) => mapping.id,
                Ok(None) => {
                    debug!(code = %code, delta, "Mapping is gone, dropping access count");
                    report.dropped += 1;
                    continue;
                }
                Err(e) => {
                    warn!(code = %code, delta, error = %e, "Lookup failed, keeping access count for next flush");
                    self.add(code, delta);
                    report.failed += 1;
                    continue;
                }
            };

            let repository = Arc::clone(&self.repository);
            let handle = self
                .pool
                .submit(async move { repository.increment_access_count(id, delta).await })
                .await;
            in_flight.push((code, delta, handle));
        }

        for (code, delta, handle) in in_flight {
            match handle.wait().await {
                Some(Ok(rows)) if rows > 0 => report.increments += 1,
                Some(Ok(_)) => {
                    debug!(code = %code, delta, "Mapping vanished before increment, dropping access count");
                    report.dropped += 1;
                }
                Some(Err(e)) => {
                    warn!(code = %code, delta, error = %e, "Increment failed, keeping access count for next flush");
                    self.add(code, delta);
                    report.failed += 1;
                }
                None => {
                    warn!(code = %code, delta, "Increment job was lost, keeping access count for next flush");
                    self.add(code, delta);
                    report.failed += 1;
                }
            }
        }

        debug!(
            codes = report.codes,
            increments = report.increments,
            failed = report.failed,
            dropped = report.dropped,
            "Access counts flushed"
        );
        report
    }

    /// Spawns the periodic flush task.
    ///
    /// Flushes run one after another inside the task, so they never overlap;
    /// ticks missed while a flush is slow are skipped. Calling this again
    /// while the task is running does nothing.
    pub fn start(self: &Arc<Self>, interval: Duration) {
        let mut task = self.task.lock();
        if task.is_some() {
            return;
        }

        let this = Arc::clone(self);
        let mut shutdown = self.shutdown_tx.subscribe();
        *task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        this.flush().await;
                    }
                    _ = shutdown.changed() => break,
                }
            }
            debug!("Access count flush task stopped");
        }));
        info!(?interval, "Access count flush task started");
    }

    /// Stops the periodic task and runs a final flush.
    ///
    /// Waits up to `timeout` for a running flush to finish, then up to
    /// `timeout` again for the final one. Returns `None` if the final flush
    /// did not complete in time; its remaining deltas are lost with the process.
    pub async fn shutdown(&self, timeout: Duration) -> Option<FlushReport> {
        let _ = self.shutdown_tx.send(true);

        let task = self.task.lock().take();
        if let Some(mut task) = task {
            if tokio::time::timeout(timeout, &mut task).await.is_err() {
                warn!(?timeout, "Flush task did not stop in time, aborting it");
                task.abort();
            }
        }

        let final_flush = async {
            let guard = self.flush_lock.lock().await;
            self.drain(guard).await
        };
        match tokio::time::timeout(timeout, final_flush).await {
            Ok(report) => Some(report),
            Err(_) => {
                warn!(
                    pending_codes = self.pending_codes(),
                    "Final access count flush timed out"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use stubby_core::repository::{NewUrlMapping, ReadRepository, Result, UrlMapping};
    use stubby_core::StorageError;
    use stubby_storage::InMemoryRepository;

    /// Wraps the in-memory store, counting increments and optionally failing them.
    #[derive(Default)]
    struct FlakyRepository {
        inner: InMemoryRepository,
        fail_increments: AtomicBool,
        increments: AtomicU64,
    }

    #[async_trait]
    impl ReadRepository for FlakyRepository {
        async fn find_by_code(&self, code: &ShortCode) -> Result<Option<UrlMapping>> {
            self.inner.find_by_code(code).await
        }

        async fn exists(&self, code: &ShortCode) -> Result<bool> {
            self.inner.exists(code).await
        }
    }

    #[async_trait]
    impl Repository for FlakyRepository {
        async fn insert(&self, mapping: NewUrlMapping) -> Result<u64> {
            self.inner.insert(mapping).await
        }

        async fn increment_access_count(&self, id: u64, delta: u64) -> Result<u64> {
            if self.fail_increments.load(Ordering::SeqCst) {
                return Err(StorageError::Unavailable("connection reset".to_string()));
            }
            self.increments.fetch_add(1, Ordering::SeqCst);
            self.inner.increment_access_count(id, delta).await
        }

        async fn delete(&self, code: &ShortCode) -> Result<bool> {
            self.inner.delete(code).await
        }

        async fn delete_expired(&self, code: &ShortCode, now: jiff::Timestamp) -> Result<bool> {
            self.inner.delete_expired(code, now).await
        }
    }

    async fn setup(codes: &[&str]) -> (Arc<FlakyRepository>, AccessCountAggregator<FlakyRepository>) {
        let repository = Arc::new(FlakyRepository::default());
        for code in codes {
            repository
                .insert(NewUrlMapping {
                    short_code: ShortCode::new_unchecked(*code),
                    original_url: format!("https://{code}.example"),
                    expire_at: None,
                })
                .await
                .unwrap();
        }
        let pool = Arc::new(WorkerPool::new(2, 16).unwrap());
        let aggregator = AccessCountAggregator::new(Arc::clone(&repository), pool);
        (repository, aggregator)
    }

    async fn access_count(repository: &FlakyRepository, code: &str) -> u64 {
        repository
            .find_by_code(&ShortCode::new_unchecked(code))
            .await
            .unwrap()
            .unwrap()
            .access_count
    }

    #[tokio::test]
    async fn coalesces_records_into_one_increment() {
        let (repository, aggregator) = setup(&["abc"]).await;
        let code = ShortCode::new_unchecked("abc");

        for _ in 0..50 {
            aggregator.record(&code);
        }
        assert_eq!(aggregator.pending(&code), 50);

        let outcome = aggregator.flush().await;
        assert_eq!(
            outcome,
            FlushOutcome::Flushed(FlushReport {
                codes: 1,
                increments: 1,
                failed: 0,
                dropped: 0,
            })
        );
        assert_eq!(repository.increments.load(Ordering::SeqCst), 1);
        assert_eq!(access_count(&repository, "abc").await, 50);
        assert_eq!(aggregator.pending_codes(), 0);
    }

    #[tokio::test]
    async fn failed_increment_is_retried_next_flush() {
        let (repository, aggregator) = setup(&["abc"]).await;
        let code = ShortCode::new_unchecked("abc");
        for _ in 0..3 {
            aggregator.record(&code);
        }

        repository.fail_increments.store(true, Ordering::SeqCst);
        let FlushOutcome::Flushed(report) = aggregator.flush().await else {
            panic!("flush was skipped");
        };
        assert_eq!(report.failed, 1);
        assert_eq!(aggregator.pending(&code), 3);

        // Accesses recorded meanwhile are merged with the retried delta.
        aggregator.record(&code);
        repository.fail_increments.store(false, Ordering::SeqCst);
        aggregator.flush().await;

        assert_eq!(access_count(&repository, "abc").await, 4);
        assert_eq!(aggregator.pending_codes(), 0);
    }

    #[tokio::test]
    async fn unknown_code_is_dropped() {
        let (repository, aggregator) = setup(&[]).await;
        aggregator.record(&ShortCode::new_unchecked("ghost"));

        let FlushOutcome::Flushed(report) = aggregator.flush().await else {
            panic!("flush was skipped");
        };
        assert_eq!(report.dropped, 1);
        assert_eq!(aggregator.pending_codes(), 0);
        assert_eq!(repository.increments.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn concurrent_flush_is_skipped() {
        let (_repository, aggregator) = setup(&["abc"]).await;

        let _held = aggregator.flush_lock.lock().await;
        assert_eq!(aggregator.flush().await, FlushOutcome::Skipped);
    }

    #[tokio::test]
    async fn periodic_task_flushes() {
        let (repository, aggregator) = setup(&["abc"]).await;
        let aggregator = Arc::new(aggregator);
        let code = ShortCode::new_unchecked("abc");
        aggregator.record(&code);
        aggregator.record(&code);

        aggregator.start(Duration::from_millis(20));
        tokio::time::timeout(Duration::from_secs(5), async {
            while aggregator.pending_codes() > 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        aggregator.shutdown(Duration::from_secs(1)).await;
        assert_eq!(access_count(&repository, "abc").await, 2);
    }

    #[tokio::test]
    async fn shutdown_runs_final_flush() {
        let (repository, aggregator) = setup(&["abc", "def"]).await;
        let aggregator = Arc::new(aggregator);
        aggregator.start(Duration::from_secs(3600));

        aggregator.record(&ShortCode::new_unchecked("abc"));
        aggregator.record(&ShortCode::new_unchecked("def"));

        let report = aggregator.shutdown(Duration::from_secs(1)).await.unwrap();
        assert_eq!(report.increments, 2);
        assert_eq!(access_count(&repository, "abc").await, 1);
        assert_eq!(access_count(&repository, "def").await, 1);
    }
}
