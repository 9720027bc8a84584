use async_trait::async_trait;
use std::sync::Arc;
use stubby_core::ShortCode;
use stubby_counter::CounterAllocator;

use crate::alphabet::Alphabet;
use crate::error::Result;
use crate::{validate_length, Generator};

/// Base-encodes ids from a lease-based [`CounterAllocator`].
///
/// Codes are left-padded with the alphabet's zero symbol; once an id needs
/// more digits than the code length only the last digits are kept.
#[derive(Debug, Clone)]
pub struct CounterGenerator {
    allocator: Arc<CounterAllocator>,
    alphabet: Alphabet,
    length: usize,
}

impl CounterGenerator {
    pub fn new(allocator: Arc<CounterAllocator>, alphabet: Alphabet, length: usize) -> Result<Self> {
        Ok(Self {
            allocator,
            alphabet,
            length: validate_length(length)?,
        })
    }

    pub fn allocator(&self) -> &CounterAllocator {
        &self.allocator
    }
}

#[async_trait]
impl Generator for CounterGenerator {
    async fn candidate(&self, _url: &str) -> Result<ShortCode> {
        let id = self.allocator.next_id().await?;
        let encoded = self.alphabet.encode(id);
        Ok(ShortCode::new_unchecked(
            self.alphabet.fit_keep_last(&encoded, self.length),
        ))
    }
}
