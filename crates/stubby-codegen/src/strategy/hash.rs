use async_trait::async_trait;
use jiff::Timestamp;
use md5::{Digest, Md5};
use std::io::Cursor;
use stubby_core::ShortCode;

use crate::alphabet::Alphabet;
use crate::error::{GenerateError, Result};
use crate::{validate_length, Generator};

/// Hex digits in an MD5 digest.
const MD5_NIBBLES: usize = 32;
const SALT_BOUND: u32 = 10_000;

/// `url ‖ salt ‖ epoch-millis`; the salt and the time make repeated
/// submissions of one URL hash differently.
fn salted_input(url: &str) -> String {
    let salt = rand::random_range(0..SALT_BOUND);
    format!("{url}{salt}{}", Timestamp::now().as_millisecond())
}

/// Picks a window of the MD5 hex digest and maps each nibble onto the alphabet.
#[derive(Debug, Clone)]
pub struct Md5HashGenerator {
    alphabet: Alphabet,
    length: usize,
}

impl Md5HashGenerator {
    pub fn new(alphabet: Alphabet, length: usize) -> Result<Self> {
        let length = validate_length(length)?;
        if length >= MD5_NIBBLES {
            return Err(GenerateError::InvalidConfig(format!(
                "md5 codes must be shorter than {MD5_NIBBLES}, got {length}"
            )));
        }
        Ok(Self { alphabet, length })
    }

    fn encode_digest(&self, digest: &[u8], start: usize) -> String {
        digest
            .iter()
            .flat_map(|byte| [byte >> 4, byte & 0x0f])
            .skip(start)
            .take(self.length)
            .map(|nibble| self.alphabet.symbol(usize::from(nibble) * 4))
            .collect()
    }
}

#[async_trait]
impl Generator for Md5HashGenerator {
    async fn candidate(&self, url: &str) -> Result<ShortCode> {
        let digest = Md5::digest(salted_input(url).as_bytes());
        let start = rand::random_range(0..MD5_NIBBLES - self.length);
        Ok(ShortCode::new_unchecked(self.encode_digest(&digest, start)))
    }
}

/// 32-bit Murmur3 of the salted URL, base-encoded least significant digit first.
#[derive(Debug, Clone)]
pub struct Murmur3HashGenerator {
    alphabet: Alphabet,
    length: usize,
}

impl Murmur3HashGenerator {
    pub fn new(alphabet: Alphabet, length: usize) -> Result<Self> {
        Ok(Self {
            alphabet,
            length: validate_length(length)?,
        })
    }
}

#[async_trait]
impl Generator for Murmur3HashGenerator {
    async fn candidate(&self, url: &str) -> Result<ShortCode> {
        let input = salted_input(url);
        let seed: u32 = rand::random();
        let hash = murmur3::murmur3_32(&mut Cursor::new(input.as_bytes()), seed)
            .map_err(|e| GenerateError::Hash(e.to_string()))?;

        let encoded = self.alphabet.encode_lsb_first(u64::from(hash));
        Ok(ShortCode::new_unchecked(
            self.alphabet.fit_keep_first(&encoded, self.length),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nibbles_map_to_every_fourth_symbol() {
        let gen = Md5HashGenerator::new(Alphabet::base62(), 4).unwrap();
        // nibbles 0, f, 1, 0
        let encoded = gen.encode_digest(&[0x0f, 0x10], 0);
        assert_eq!(encoded, "0Y40");
        // (15 * 4) % 62 = 60
        assert_eq!(Alphabet::base62().symbol(60), 'Y');
        assert_eq!(gen.encode_digest(&[0xf0], 0).chars().next(), Some('Y'));
    }

    #[test]
    fn md5_rejects_full_digest_length() {
        assert!(Md5HashGenerator::new(Alphabet::base62(), 32).is_err());
        assert!(Md5HashGenerator::new(Alphabet::base62(), 31).is_ok());
    }

    #[tokio::test]
    async fn murmur3_codes_have_configured_length() {
        let gen = Murmur3HashGenerator::new(Alphabet::base62(), 12).unwrap();
        for _ in 0..50 {
            let code = gen.candidate("https://example.com").await.unwrap();
            assert_eq!(code.len(), 12);
        }
    }
}
