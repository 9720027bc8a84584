use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{CounterError, Result};
use crate::SharedCounter;

/// A process-local [`SharedCounter`].
///
/// Suitable for single-node deployments and tests; it also records how many
/// times it was advanced.
#[derive(Debug, Default)]
pub struct InMemorySharedCounter {
    total: AtomicU64,
    increments: AtomicU64,
}

impl InMemorySharedCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts the counter at `total` instead of zero.
    pub fn starting_at(total: u64) -> Self {
        Self {
            total: AtomicU64::new(total),
            increments: AtomicU64::new(0),
        }
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::SeqCst)
    }

    /// Number of successful `increment_by` calls.
    pub fn increments(&self) -> u64 {
        self.increments.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SharedCounter for InMemorySharedCounter {
    async fn increment_by(&self, delta: u64) -> Result<u64> {
        let previous = self
            .total
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |total| {
                total.checked_add(delta)
            })
            .map_err(|total| CounterError::Overflow(format!("{total} + {delta}")))?;
        self.increments.fetch_add(1, Ordering::SeqCst);
        Ok(previous + delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn increment_returns_new_total() {
        let counter = InMemorySharedCounter::new();
        assert_eq!(counter.increment_by(1000).await.unwrap(), 1000);
        assert_eq!(counter.increment_by(1000).await.unwrap(), 2000);
        assert_eq!(counter.increments(), 2);
    }

    #[tokio::test]
    async fn overflow_is_reported() {
        let counter = InMemorySharedCounter::starting_at(u64::MAX - 1);
        let err = counter.increment_by(10).await.unwrap_err();
        assert!(matches!(err, CounterError::Overflow(_)));
        assert_eq!(counter.total(), u64::MAX - 1);
    }
}
