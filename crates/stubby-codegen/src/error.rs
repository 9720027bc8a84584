use stubby_core::StorageError;
use stubby_counter::CounterError;
use thiserror::Error;

/// Result type for code generation.
pub type Result<T> = std::result::Result<T, GenerateError>;

#[derive(Debug, Clone, Error)]
pub enum GenerateError {
    #[error("invalid generator configuration: {0}")]
    InvalidConfig(String),
    #[error("no free short code after {attempts} attempts")]
    CodeSpaceExhausted { attempts: u32 },
    #[error("id allocator unavailable: {0}")]
    AllocatorUnavailable(String),
    #[error("clock moved backwards: {0}")]
    ClockRegression(String),
    #[error("snowflake generator failed: {0}")]
    Snowflake(stubby_snowflake::Error),
    #[error("hashing failed: {0}")]
    Hash(String),
    #[error("existence check failed: {0}")]
    Existence(#[from] StorageError),
}

impl From<CounterError> for GenerateError {
    fn from(err: CounterError) -> Self {
        match err {
            CounterError::InvalidConfig(message) => GenerateError::InvalidConfig(message),
            other => GenerateError::AllocatorUnavailable(other.to_string()),
        }
    }
}

impl From<stubby_snowflake::Error> for GenerateError {
    fn from(err: stubby_snowflake::Error) -> Self {
        match err {
            stubby_snowflake::Error::ClockRegression { .. } => {
                GenerateError::ClockRegression(err.to_string())
            }
            stubby_snowflake::Error::InvalidLayout(_)
            | stubby_snowflake::Error::InvalidNodeId { .. }
            | stubby_snowflake::Error::EpochAhead { .. } => {
                GenerateError::InvalidConfig(err.to_string())
            }
            other => GenerateError::Snowflake(other),
        }
    }
}
