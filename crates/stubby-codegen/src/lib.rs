//! Short-code generation.
//!
//! Every strategy implements [`Generator`], which produces one raw candidate
//! per call. [`CollisionResolver`] turns a generator into a bounded
//! generate-and-check loop against an existence predicate.

pub mod alphabet;
pub mod error;
pub mod resolver;
pub mod strategy;

pub use alphabet::Alphabet;
pub use error::{GenerateError, Result};
pub use resolver::{CollisionResolver, DEFAULT_MAX_ATTEMPTS};
pub use strategy::{
    Base64CompositeGenerator, CodeStrategy, CounterGenerator, Md5HashGenerator,
    Murmur3HashGenerator, RandomGenerator, SnowflakeGenerator, StrategyConfig, StrategyKind,
};

use async_trait::async_trait;
use stubby_core::shortcode::{ShortCode, MAX_LENGTH, MIN_LENGTH};

pub const DEFAULT_CODE_LENGTH: usize = 6;

/// Trait for producing short-code candidates.
///
/// Implementations only propose codes; uniqueness against the store is the
/// resolver's concern. The original URL is passed for strategies that hash it.
#[async_trait]
pub trait Generator: Send + Sync + 'static {
    /// Produces one candidate of the configured length, drawn from the
    /// configured alphabet.
    async fn candidate(&self, url: &str) -> Result<ShortCode>;
}

pub(crate) fn validate_length(length: usize) -> Result<usize> {
    if !(MIN_LENGTH..=MAX_LENGTH).contains(&length) {
        return Err(GenerateError::InvalidConfig(format!(
            "code length must be between {MIN_LENGTH} and {MAX_LENGTH}, got {length}"
        )));
    }
    Ok(length)
}
