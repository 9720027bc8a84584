use async_trait::async_trait;
use redis::AsyncCommands;
use tracing::{debug, warn};

use crate::error::{CounterError, Result};
use crate::SharedCounter;

pub const DEFAULT_COUNTER_KEY: &str = "stubby:counter";

/// A [`SharedCounter`] stored in a single Redis key and advanced with `INCRBY`.
#[derive(Debug, Clone)]
pub struct RedisSharedCounter {
    conn: redis::aio::MultiplexedConnection,
    key: String,
}

fn map_redis_error(operation: &str, err: redis::RedisError) -> CounterError {
    CounterError::Unavailable(format!("{operation}: {err}"))
}

impl RedisSharedCounter {
    /// Creates a counter on the default key.
    pub fn new(conn: redis::aio::MultiplexedConnection) -> Self {
        Self::with_key(conn, DEFAULT_COUNTER_KEY)
    }

    /// Creates a counter on a custom key.
    pub fn with_key(conn: redis::aio::MultiplexedConnection, key: impl Into<String>) -> Self {
        Self {
            conn,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

#[async_trait]
impl SharedCounter for RedisSharedCounter {
    async fn increment_by(&self, delta: u64) -> Result<u64> {
        let delta = i64::try_from(delta)
            .map_err(|_| CounterError::Overflow(format!("delta {delta} does not fit INCRBY")))?;

        let mut conn = self.conn.clone();
        let total: i64 = conn.incr(&self.key, delta).await.map_err(|e| {
            warn!(key = %self.key, error = %e, "Redis INCRBY failed");
            map_redis_error("failed to advance shared counter", e)
        })?;

        debug!(key = %self.key, total, "Advanced shared counter");
        u64::try_from(total)
            .map_err(|_| CounterError::Overflow(format!("counter '{}' is negative: {total}", self.key)))
    }
}
