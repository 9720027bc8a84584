use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{CounterError, Result};
use crate::SharedCounter;

pub const DEFAULT_BATCH_SIZE: u64 = 1000;

#[derive(Debug, Default)]
struct Lease {
    /// First id of the current range; `None` before the first lease.
    start: Option<u64>,
    /// Ids already issued from the current range.
    issued: u64,
}

/// Issues strictly increasing ids from exclusive ranges leased off a
/// [`SharedCounter`].
///
/// The lease state is guarded by one async mutex that is held across the
/// call to the shared counter, so a refill and the id taken from it happen
/// in a single critical section.
pub struct CounterAllocator {
    counter: Arc<dyn SharedCounter>,
    batch_size: u64,
    lease: Mutex<Lease>,
    leases_taken: AtomicU64,
}

impl CounterAllocator {
    pub fn new(counter: Arc<dyn SharedCounter>, batch_size: u64) -> Result<Self> {
        if batch_size == 0 {
            return Err(CounterError::InvalidConfig(
                "batch size must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            counter,
            batch_size,
            lease: Mutex::new(Lease::default()),
            leases_taken: AtomicU64::new(0),
        })
    }

    pub fn batch_size(&self) -> u64 {
        self.batch_size
    }

    /// Number of ranges leased by this instance so far.
    pub fn leases_taken(&self) -> u64 {
        self.leases_taken.load(Ordering::Relaxed)
    }

    /// Returns the next id.
    ///
    /// On failure the lease state is left untouched, so no id is skipped or
    /// handed out twice.
    pub async fn next_id(&self) -> Result<u64> {
        let mut lease = self.lease.lock().await;

        let start = match lease.start {
            Some(start) if lease.issued < self.batch_size => start,
            _ => {
                let total = self.counter.increment_by(self.batch_size).await?;
                let start = total
                    .checked_sub(self.batch_size - 1)
                    .filter(|start| *start > 0)
                    .ok_or_else(|| {
                        CounterError::Overflow(format!(
                            "shared total {total} is smaller than batch size {}",
                            self.batch_size
                        ))
                    })?;
                self.leases_taken.fetch_add(1, Ordering::Relaxed);
                debug!(start, end = total, "Leased counter range");

                lease.start = Some(start);
                lease.issued = 0;
                start
            }
        };

        let id = start + lease.issued;
        lease.issued += 1;
        Ok(id)
    }
}

impl std::fmt::Debug for CounterAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CounterAllocator")
            .field("batch_size", &self.batch_size)
            .field("leases_taken", &self.leases_taken())
            .finish_non_exhaustive()
    }
}
