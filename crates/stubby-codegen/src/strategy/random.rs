use async_trait::async_trait;
use stubby_core::ShortCode;

use crate::alphabet::Alphabet;
use crate::error::Result;
use crate::{validate_length, Generator};

/// Independent uniform draws from the alphabet.
#[derive(Debug, Clone)]
pub struct RandomGenerator {
    alphabet: Alphabet,
    length: usize,
}

impl RandomGenerator {
    pub fn new(alphabet: Alphabet, length: usize) -> Result<Self> {
        Ok(Self {
            alphabet,
            length: validate_length(length)?,
        })
    }
}

#[async_trait]
impl Generator for RandomGenerator {
    async fn candidate(&self, _url: &str) -> Result<ShortCode> {
        Ok(ShortCode::new_unchecked(
            self.alphabet.random_string(self.length),
        ))
    }
}
