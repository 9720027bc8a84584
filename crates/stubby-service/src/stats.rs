use parking_lot::Mutex;
use serde::Serialize;
use std::time::Duration;
use stubby_core::CacheStats;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::pool::PoolStats;

/// Point-in-time view of the service's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ServiceStats {
    pub l1: CacheStats,
    /// Present when the L2 tier keeps its own counters.
    pub l2: Option<CacheStats>,
    /// Codes with access counts waiting for the next flush.
    pub pending_codes: usize,
    pub pool: PoolStats,
    /// Ranges leased from the shared counter, for the counter strategy.
    pub counter_leases: Option<u64>,
}

/// Logs [`ServiceStats`] on a fixed interval.
#[derive(Debug)]
pub struct StatsReporter {
    shutdown_tx: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl StatsReporter {
    /// Spawns the reporting task. `source` is sampled once per tick.
    pub fn start<F>(interval: Duration, source: F) -> Self
    where
        F: Fn() -> ServiceStats + Send + Sync + 'static,
    {
        let (shutdown_tx, mut shutdown) = watch::channel(false);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => report(&source()),
                    _ = shutdown.changed() => break,
                }
            }
            debug!("Stats reporter stopped");
        });

        Self {
            shutdown_tx,
            task: Mutex::new(Some(task)),
        }
    }

    /// Stops the task and waits for it to exit.
    pub async fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
        let task = self.task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

/// Logs one snapshot at `info`.
pub fn report(stats: &ServiceStats) {
    info!(
        l1_hits = stats.l1.hits,
        l1_misses = stats.l1.misses,
        l1_hit_rate = stats.l1.hit_rate(),
        l1_evictions = stats.l1.evictions,
        l1_entries = stats.l1.entries,
        l2_hits = stats.l2.map(|l2| l2.hits),
        l2_misses = stats.l2.map(|l2| l2.misses),
        pending_codes = stats.pending_codes,
        pool_queued = stats.pool.queued,
        pool_submitted = stats.pool.submitted,
        pool_ran_inline = stats.pool.ran_inline,
        counter_leases = stats.counter_leases,
        "Service stats"
    );
}
