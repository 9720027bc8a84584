use crate::error::{GenerateError, Result};
use std::fmt;
use std::sync::Arc;

/// Digits, then lower case, then upper case. The zero symbol is `'0'`.
pub const BASE62: &str = "0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// The RFC 4648 URL-safe base64 symbol set.
pub const URL_SAFE_BASE64: &str =
    "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

/// An ordered set of symbols short codes are drawn from.
///
/// Symbols are distinct ASCII characters that are valid in a short code;
/// the first symbol doubles as the zero digit when encoding integers.
#[derive(Clone, PartialEq, Eq)]
pub struct Alphabet {
    symbols: Arc<[u8]>,
}

impl Alphabet {
    pub fn new(symbols: &str) -> Result<Self> {
        if symbols.len() < 2 {
            return Err(GenerateError::InvalidConfig(
                "alphabet needs at least 2 symbols".to_string(),
            ));
        }

        let mut seen = [false; 128];
        for c in symbols.chars() {
            if !(c.is_ascii_alphanumeric() || c == '-' || c == '_') {
                return Err(GenerateError::InvalidConfig(format!(
                    "alphabet symbol '{c}' is not allowed in a short code"
                )));
            }
            let slot = &mut seen[c as usize];
            if *slot {
                return Err(GenerateError::InvalidConfig(format!(
                    "alphabet symbol '{c}' appears twice"
                )));
            }
            *slot = true;
        }

        Ok(Self {
            symbols: Arc::from(symbols.as_bytes()),
        })
    }

    pub fn base62() -> Self {
        Self {
            symbols: Arc::from(BASE62.as_bytes()),
        }
    }

    pub fn url_safe_base64() -> Self {
        Self {
            symbols: Arc::from(URL_SAFE_BASE64.as_bytes()),
        }
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn as_str(&self) -> &str {
        // constructed from &str of ASCII symbols only
        std::str::from_utf8(&self.symbols).unwrap_or_default()
    }

    /// The symbol at `index`, wrapping around the alphabet.
    pub fn symbol(&self, index: usize) -> char {
        self.symbols[index % self.symbols.len()] as char
    }

    pub fn zero(&self) -> char {
        self.symbol(0)
    }

    pub fn contains(&self, c: char) -> bool {
        c.is_ascii() && self.symbols.contains(&(c as u8))
    }

    pub fn random_symbol(&self) -> char {
        self.symbol(rand::random_range(0..self.symbols.len()))
    }

    /// `len` independent uniform draws.
    pub fn random_string(&self, len: usize) -> String {
        (0..len).map(|_| self.random_symbol()).collect()
    }

    /// Positional encoding of `n`, most significant digit first.
    pub fn encode(&self, n: u64) -> String {
        let mut digits = self.encode_lsb_first(n).into_bytes();
        digits.reverse();
        String::from_utf8(digits).unwrap_or_default()
    }

    /// Positional encoding of `n`, least significant digit first.
    pub fn encode_lsb_first(&self, mut n: u64) -> String {
        let base = self.symbols.len() as u64;
        if n == 0 {
            return self.zero().to_string();
        }

        let mut out = String::new();
        while n > 0 {
            out.push(self.symbol((n % base) as usize));
            n /= base;
        }
        out
    }

    /// Left-pads with the zero symbol, or keeps the last `len` symbols.
    pub fn fit_keep_last(&self, encoded: &str, len: usize) -> String {
        let count = encoded.chars().count();
        if count >= len {
            encoded.chars().skip(count - len).collect()
        } else {
            let mut out: String = std::iter::repeat_n(self.zero(), len - count).collect();
            out.push_str(encoded);
            out
        }
    }

    /// Right-pads with random symbols, or keeps the first `len` symbols.
    pub fn fit_keep_first(&self, encoded: &str, len: usize) -> String {
        let mut out: String = encoded.chars().take(len).collect();
        while out.len() < len {
            out.push(self.random_symbol());
        }
        out
    }
}

impl Default for Alphabet {
    fn default() -> Self {
        Self::base62()
    }
}

impl fmt::Debug for Alphabet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Alphabet").field(&self.as_str()).finish()
    }
}

impl fmt::Display for Alphabet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base62_encoding() {
        let alphabet = Alphabet::base62();
        assert_eq!(alphabet.encode(0), "0");
        assert_eq!(alphabet.encode(61), "Z");
        assert_eq!(alphabet.encode(62), "10");
        assert_eq!(alphabet.encode(3843), "ZZ");
        assert_eq!(alphabet.encode_lsb_first(62), "01");
    }

    #[test]
    fn fit_keep_last_pads_with_zero() {
        let alphabet = Alphabet::base62();
        assert_eq!(alphabet.fit_keep_last("1c", 6), "00001c");
        assert_eq!(alphabet.fit_keep_last("abcdefgh", 6), "cdefgh");
    }

    #[test]
    fn fit_keep_first_truncates_or_pads() {
        let alphabet = Alphabet::base62();
        assert_eq!(alphabet.fit_keep_first("abcdefgh", 6), "abcdef");

        let padded = alphabet.fit_keep_first("ab", 6);
        assert_eq!(padded.len(), 6);
        assert!(padded.starts_with("ab"));
        assert!(padded.chars().all(|c| alphabet.contains(c)));
    }

    #[test]
    fn rejects_bad_alphabets() {
        assert!(Alphabet::new("a").is_err());
        assert!(Alphabet::new("aba").is_err());
        assert!(Alphabet::new("ab/").is_err());
        assert!(Alphabet::new("xyz").is_ok());
    }

    #[test]
    fn random_string_stays_in_alphabet() {
        let alphabet = Alphabet::new("xyz").unwrap();
        let s = alphabet.random_string(64);
        assert_eq!(s.len(), 64);
        assert!(s.chars().all(|c| alphabet.contains(c)));
    }
}
