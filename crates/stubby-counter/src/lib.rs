//! Lease-based distributed counter.
//!
//! A [`CounterAllocator`] reserves contiguous ranges of integers from a
//! [`SharedCounter`] and issues them one by one, so that the shared counter
//! is touched once per batch instead of once per id.

pub mod allocator;
pub mod error;
pub mod memory;
pub mod redis;

pub use allocator::{CounterAllocator, DEFAULT_BATCH_SIZE};
pub use error::{CounterError, Result};
pub use memory::InMemorySharedCounter;
pub use redis::{RedisSharedCounter, DEFAULT_COUNTER_KEY};

use async_trait::async_trait;

/// An atomic counter shared by every allocator instance.
#[async_trait]
pub trait SharedCounter: Send + Sync + 'static {
    /// Atomically adds `delta` and returns the new total.
    async fn increment_by(&self, delta: u64) -> Result<u64>;
}
