use thiserror::Error;

/// Result type for counter operations.
pub type Result<T> = std::result::Result<T, CounterError>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CounterError {
    #[error("shared counter unavailable: {0}")]
    Unavailable(String),
    #[error("shared counter overflowed: {0}")]
    Overflow(String),
    #[error("invalid counter configuration: {0}")]
    InvalidConfig(String),
}
