use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use jiff::Timestamp;
use stubby_core::ShortCode;
use uuid::Uuid;

use crate::alphabet::{Alphabet, URL_SAFE_BASE64};
use crate::error::Result;
use crate::{validate_length, Generator};

/// A random window of `base64url(url | uuid | millis)`.
///
/// Symbols outside the configured alphabet (`-` and `_` for base-62) are
/// folded into it by their position in the URL-safe base64 set.
#[derive(Debug, Clone)]
pub struct Base64CompositeGenerator {
    alphabet: Alphabet,
    padding: Alphabet,
    length: usize,
}

impl Base64CompositeGenerator {
    pub fn new(alphabet: Alphabet, length: usize) -> Result<Self> {
        Ok(Self {
            alphabet,
            padding: Alphabet::url_safe_base64(),
            length: validate_length(length)?,
        })
    }

    fn fold(&self, c: char) -> char {
        if self.alphabet.contains(c) {
            return c;
        }
        let position = URL_SAFE_BASE64.find(c).unwrap_or_default();
        self.alphabet.symbol(position)
    }
}

#[async_trait]
impl Generator for Base64CompositeGenerator {
    async fn candidate(&self, url: &str) -> Result<ShortCode> {
        let composite = format!(
            "{url}|{}|{}",
            Uuid::new_v4(),
            Timestamp::now().as_millisecond()
        );
        let mut encoded = URL_SAFE_NO_PAD.encode(composite.as_bytes());
        while encoded.len() < self.length {
            encoded.push(self.padding.random_symbol());
        }

        let start = match encoded.len() - self.length {
            0 => 0,
            slack => rand::random_range(0..slack),
        };

        let code: String = encoded[start..start + self.length]
            .chars()
            .map(|c| self.fold(c))
            .collect();
        Ok(ShortCode::new_unchecked(code))
    }
}
