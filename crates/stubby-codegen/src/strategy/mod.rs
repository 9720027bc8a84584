mod base64;
mod counter;
mod hash;
mod random;
mod snowflake;

pub use base64::Base64CompositeGenerator;
pub use counter::CounterGenerator;
pub use hash::{Md5HashGenerator, Murmur3HashGenerator};
pub use random::RandomGenerator;
pub use snowflake::SnowflakeGenerator;

use async_trait::async_trait;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::sync::Arc;
use stubby_core::ShortCode;
use stubby_counter::{CounterAllocator, InMemorySharedCounter, SharedCounter, DEFAULT_BATCH_SIZE};
use stubby_snowflake::{Snowflake, SnowflakeSettings};
use tracing::warn;
use typed_builder::TypedBuilder;

use crate::alphabet::Alphabet;
use crate::error::{GenerateError, Result};
use crate::{Generator, DEFAULT_CODE_LENGTH};

/// Which algorithm produces raw candidates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    #[default]
    Random,
    Md5,
    Murmur3,
    Base64,
    Counter,
    Snowflake,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 6] = [
        StrategyKind::Random,
        StrategyKind::Md5,
        StrategyKind::Murmur3,
        StrategyKind::Base64,
        StrategyKind::Counter,
        StrategyKind::Snowflake,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Random => "random",
            StrategyKind::Md5 => "md5",
            StrategyKind::Murmur3 => "murmur3",
            StrategyKind::Base64 => "base64",
            StrategyKind::Counter => "counter",
            StrategyKind::Snowflake => "snowflake",
        }
    }
}

impl Display for StrategyKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = GenerateError;

    fn from_str(s: &str) -> Result<Self> {
        StrategyKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| GenerateError::InvalidConfig(format!("unknown strategy '{s}'")))
    }
}

/// Startup configuration for the selected strategy.
#[derive(Debug, Clone, TypedBuilder)]
pub struct StrategyConfig {
    #[builder(default)]
    pub kind: StrategyKind,
    #[builder(default)]
    pub alphabet: Alphabet,
    #[builder(default = DEFAULT_CODE_LENGTH)]
    pub code_length: usize,
    /// Ids leased per round trip to the shared counter.
    #[builder(default = DEFAULT_BATCH_SIZE)]
    pub counter_batch_size: u64,
    #[builder(default)]
    pub snowflake: SnowflakeSettings,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// The strategy chosen once at startup.
#[derive(Debug, Clone)]
pub enum CodeStrategy {
    Random(RandomGenerator),
    Md5(Md5HashGenerator),
    Murmur3(Murmur3HashGenerator),
    Base64(Base64CompositeGenerator),
    Counter(CounterGenerator),
    Snowflake(SnowflakeGenerator),
}

impl CodeStrategy {
    /// Builds the configured strategy.
    ///
    /// `shared_counter` backs the counter strategy; without one it falls back
    /// to a process-local counter, which is only unique within this process.
    pub fn from_config(
        config: &StrategyConfig,
        shared_counter: Option<Arc<dyn SharedCounter>>,
    ) -> Result<Self> {
        let alphabet = config.alphabet.clone();
        let length = config.code_length;

        let strategy = match config.kind {
            StrategyKind::Random => CodeStrategy::Random(RandomGenerator::new(alphabet, length)?),
            StrategyKind::Md5 => CodeStrategy::Md5(Md5HashGenerator::new(alphabet, length)?),
            StrategyKind::Murmur3 => {
                CodeStrategy::Murmur3(Murmur3HashGenerator::new(alphabet, length)?)
            }
            StrategyKind::Base64 => {
                CodeStrategy::Base64(Base64CompositeGenerator::new(alphabet, length)?)
            }
            StrategyKind::Counter => {
                let counter = shared_counter.unwrap_or_else(|| {
                    warn!("No shared counter configured, counter codes are unique to this process only");
                    Arc::new(InMemorySharedCounter::new()) as Arc<dyn SharedCounter>
                });
                let allocator = CounterAllocator::new(counter, config.counter_batch_size)?;
                CodeStrategy::Counter(CounterGenerator::new(
                    Arc::new(allocator),
                    alphabet,
                    length,
                )?)
            }
            StrategyKind::Snowflake => {
                let snowflake = Snowflake::new(config.snowflake)?;
                CodeStrategy::Snowflake(SnowflakeGenerator::new(
                    Arc::new(snowflake),
                    alphabet,
                    length,
                )?)
            }
        };

        Ok(strategy)
    }

    pub fn kind(&self) -> StrategyKind {
        match self {
            CodeStrategy::Random(_) => StrategyKind::Random,
            CodeStrategy::Md5(_) => StrategyKind::Md5,
            CodeStrategy::Murmur3(_) => StrategyKind::Murmur3,
            CodeStrategy::Base64(_) => StrategyKind::Base64,
            CodeStrategy::Counter(_) => StrategyKind::Counter,
            CodeStrategy::Snowflake(_) => StrategyKind::Snowflake,
        }
    }

    /// Ranges leased from the shared counter, for the counter strategy.
    pub fn counter_leases(&self) -> Option<u64> {
        match self {
            CodeStrategy::Counter(gen) => Some(gen.allocator().leases_taken()),
            _ => None,
        }
    }
}

#[async_trait]
impl Generator for CodeStrategy {
    async fn candidate(&self, url: &str) -> Result<ShortCode> {
        match self {
            CodeStrategy::Random(gen) => gen.candidate(url).await,
            CodeStrategy::Md5(gen) => gen.candidate(url).await,
            CodeStrategy::Murmur3(gen) => gen.candidate(url).await,
            CodeStrategy::Base64(gen) => gen.candidate(url).await,
            CodeStrategy::Counter(gen) => gen.candidate(url).await,
            CodeStrategy::Snowflake(gen) => gen.candidate(url).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_parses_case_insensitively() {
        assert_eq!("MURMUR3".parse::<StrategyKind>().unwrap(), StrategyKind::Murmur3);
        assert_eq!("snowflake".parse::<StrategyKind>().unwrap(), StrategyKind::Snowflake);
        assert!("sha1".parse::<StrategyKind>().is_err());
        assert_eq!(StrategyKind::default(), StrategyKind::Random);
    }

    #[tokio::test]
    async fn every_strategy_honours_length_and_alphabet() {
        for alphabet in [Alphabet::base62(), Alphabet::url_safe_base64()] {
            for kind in StrategyKind::ALL {
                for code_length in [1, 6, 11] {
                    let config = StrategyConfig::builder()
                        .kind(kind)
                        .alphabet(alphabet.clone())
                        .code_length(code_length)
                        .build();
                    let strategy = CodeStrategy::from_config(&config, None);
                    if kind == StrategyKind::Snowflake && code_length == 1 {
                        // one leading digit would repeat for years
                        assert!(matches!(strategy, Err(GenerateError::InvalidConfig(_))));
                        continue;
                    }
                    let strategy = strategy.unwrap();
                    assert_eq!(strategy.kind(), kind);

                    // truncated snowflake codes wait for a fresh prefix
                    let rounds = if kind == StrategyKind::Snowflake { 3 } else { 20 };
                    for _ in 0..rounds {
                        let code = strategy.candidate("https://example.com/x?y=z").await.unwrap();
                        assert_eq!(code.len(), code_length, "{kind} produced {code}");
                        assert!(
                            code.as_str().chars().all(|c| alphabet.contains(c)),
                            "{kind} produced {code} outside {alphabet}"
                        );
                    }
                }
            }
        }
    }

    #[tokio::test]
    async fn every_strategy_issues_distinct_back_to_back_codes() {
        for kind in StrategyKind::ALL {
            let config = StrategyConfig::builder().kind(kind).build();
            let strategy = CodeStrategy::from_config(&config, None).unwrap();

            let first = strategy.candidate("https://example.com").await.unwrap();
            let second = strategy.candidate("https://example.com").await.unwrap();
            assert_ne!(first, second, "{kind} repeated {first}");
        }
    }

    #[test]
    fn invalid_length_fails_at_construction() {
        for kind in StrategyKind::ALL {
            let config = StrategyConfig::builder().kind(kind).code_length(0).build();
            assert!(matches!(
                CodeStrategy::from_config(&config, None),
                Err(GenerateError::InvalidConfig(_))
            ));
        }
    }

    #[tokio::test]
    async fn counter_strategy_uses_shared_counter() {
        let shared = Arc::new(InMemorySharedCounter::new());
        let config = StrategyConfig::builder()
            .kind(StrategyKind::Counter)
            .counter_batch_size(10)
            .build();
        let strategy = CodeStrategy::from_config(&config, Some(shared.clone() as Arc<dyn SharedCounter>))
            .unwrap();

        for _ in 0..15 {
            strategy.candidate("u").await.unwrap();
        }
        assert_eq!(shared.increments(), 2);
        assert_eq!(strategy.counter_leases(), Some(2));
    }
}
