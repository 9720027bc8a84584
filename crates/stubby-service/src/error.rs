use stubby_codegen::GenerateError;
use stubby_core::StorageError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ServiceError>;

#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    #[error("no free short code after {attempts} attempts")]
    CodeSpaceExhausted { attempts: u32 },
    #[error("id allocator unavailable: {0}")]
    AllocatorUnavailable(String),
    #[error("clock moved backwards: {0}")]
    ClockRegression(String),
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("code generation failed: {0}")]
    Generation(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("expiry of {0} seconds is out of range")]
    InvalidExpiry(u64),
}

impl From<GenerateError> for ServiceError {
    fn from(err: GenerateError) -> Self {
        match err {
            GenerateError::CodeSpaceExhausted { attempts } => {
                ServiceError::CodeSpaceExhausted { attempts }
            }
            GenerateError::AllocatorUnavailable(message) => {
                ServiceError::AllocatorUnavailable(message)
            }
            GenerateError::ClockRegression(message) => ServiceError::ClockRegression(message),
            GenerateError::InvalidConfig(message) => ServiceError::InvalidConfig(message),
            GenerateError::Existence(storage) => storage.into(),
            other => ServiceError::Generation(other.to_string()),
        }
    }
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        ServiceError::StoreUnavailable(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_errors_keep_their_kind() {
        let err: ServiceError = GenerateError::CodeSpaceExhausted { attempts: 10 }.into();
        assert!(matches!(err, ServiceError::CodeSpaceExhausted { attempts: 10 }));

        let err: ServiceError = GenerateError::AllocatorUnavailable("down".into()).into();
        assert!(matches!(err, ServiceError::AllocatorUnavailable(_)));

        let err: ServiceError = GenerateError::ClockRegression("5ms".into()).into();
        assert!(matches!(err, ServiceError::ClockRegression(_)));
    }

    #[test]
    fn failed_existence_check_means_store_unavailable() {
        let err: ServiceError =
            GenerateError::Existence(StorageError::Timeout("pool timed out".into())).into();
        assert!(matches!(err, ServiceError::StoreUnavailable(_)));
    }
}
