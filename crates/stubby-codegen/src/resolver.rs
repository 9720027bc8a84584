use std::future::Future;
use stubby_core::{ShortCode, StorageError};
use tracing::debug;

use crate::error::{GenerateError, Result};
use crate::Generator;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// Bounded generate-and-check loop around a [`Generator`].
#[derive(Debug, Clone)]
pub struct CollisionResolver<G> {
    generator: G,
    max_attempts: u32,
}

impl<G: Generator> CollisionResolver<G> {
    pub fn new(generator: G, max_attempts: u32) -> Result<Self> {
        if max_attempts == 0 {
            return Err(GenerateError::InvalidConfig(
                "max collision attempts must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            generator,
            max_attempts,
        })
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns the first candidate for which `exists` reports `false`.
    ///
    /// Gives up with [`GenerateError::CodeSpaceExhausted`] after
    /// `max_attempts` taken candidates. Generator and predicate errors are
    /// returned as they occur.
    pub async fn generate<F, Fut>(&self, url: &str, exists: F) -> Result<ShortCode>
    where
        F: Fn(&ShortCode) -> Fut,
        Fut: Future<Output = std::result::Result<bool, StorageError>>,
    {
        for attempt in 1..=self.max_attempts {
            let candidate = self.generator.candidate(url).await?;
            if !exists(&candidate).await? {
                return Ok(candidate);
            }
            debug!(code = %candidate, attempt, "Short code already taken, retrying");
        }

        Err(GenerateError::CodeSpaceExhausted {
            attempts: self.max_attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alphabet::Alphabet;
    use crate::strategy::RandomGenerator;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    fn resolver(symbols: &str, length: usize, attempts: u32) -> CollisionResolver<RandomGenerator> {
        let alphabet = Alphabet::new(symbols).unwrap();
        CollisionResolver::new(RandomGenerator::new(alphabet, length).unwrap(), attempts).unwrap()
    }

    #[tokio::test]
    async fn returns_first_free_candidate() {
        let resolver = resolver("ab", 1, 10);
        let code = resolver
            .generate("https://example.com", |code| {
                let taken = code.as_str() == "a";
                async move { Ok::<_, StorageError>(taken) }
            })
            .await
            .unwrap();
        assert_eq!(code.as_str(), "b");
    }

    #[tokio::test]
    async fn exhaustion_after_max_attempts() {
        let resolver = resolver("ab", 1, 4);
        let calls = AtomicU32::new(0);

        let err = resolver
            .generate("https://example.com", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, StorageError>(true) }
            })
            .await
            .unwrap_err();

        assert!(matches!(err, GenerateError::CodeSpaceExhausted { attempts: 4 }));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn predicate_error_propagates() {
        let resolver = resolver("ab", 1, 4);
        let err = resolver
            .generate("https://example.com", |_| async {
                Err::<bool, _>(StorageError::Unavailable("db down".to_string()))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, GenerateError::Existence(StorageError::Unavailable(_))));
    }

    #[tokio::test]
    async fn concurrent_generates_against_shared_set_are_distinct() {
        let resolver = Arc::new(resolver("0123456789", 2, 200));
        let taken = Arc::new(Mutex::new(HashSet::new()));

        let handles: Vec<_> = (0..50)
            .map(|_| {
                let resolver = resolver.clone();
                let taken = taken.clone();
                tokio::spawn(async move {
                    resolver
                        .generate("https://example.com", |code| {
                            // claim-on-check keeps the set authoritative
                            let claimed = taken.lock().unwrap().insert(code.clone());
                            async move { Ok::<_, StorageError>(!claimed) }
                        })
                        .await
                        .unwrap()
                })
            })
            .collect();

        let mut codes = HashSet::new();
        for handle in handles {
            assert!(codes.insert(handle.await.unwrap()));
        }
        assert_eq!(codes.len(), 50);
    }

    #[test]
    fn zero_attempts_is_rejected() {
        let alphabet = Alphabet::base62();
        let gen = RandomGenerator::new(alphabet, 6).unwrap();
        assert!(CollisionResolver::new(gen, 0).is_err());
    }
}
