use jiff::Timestamp;
use thiserror::Error;

/// Errors returned by Snowflake initialization and ID generation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
    #[error("invalid bit layout: {0}")]
    InvalidLayout(String),
    #[error("invalid {field} {id}; expected 0..={max}")]
    InvalidNodeId {
        field: &'static str,
        id: u64,
        max: u64,
    },
    #[error("epoch is ahead of current clock time: epoch={epoch}, now={now}")]
    EpochAhead { epoch: Timestamp, now: Timestamp },
    #[error("clock moved backwards: last={last_ms}ms, now={now_ms}ms")]
    ClockRegression { last_ms: i64, now_ms: i64 },
    #[error("timestamp exceeds the layout's timestamp bits")]
    OverTimeLimit,
    #[error("generator state lock is poisoned")]
    StatePoisoned,
}
