use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use stubby_core::ShortCode;
use stubby_snowflake::{Clock, Snowflake, SystemClock};
use tokio::sync::Mutex;
use tracing::trace;

use crate::alphabet::Alphabet;
use crate::error::{GenerateError, Result};
use crate::{validate_length, Generator};

/// Longest a kept prefix may stay unchanged before the length is rejected.
pub const MAX_PREFIX_PERIOD: Duration = Duration::from_secs(1);

/// Base-encodes Snowflake ids, keeping the leading digits.
///
/// When the code is shorter than the encoded id, the trailing digits are
/// dropped and the leading ones only change every few milliseconds. The
/// generator never hands out the same prefix twice in a row: it waits until
/// the id has moved past the next prefix boundary.
pub struct SnowflakeGenerator<C: Clock = SystemClock> {
    snowflake: Arc<Snowflake<C>>,
    alphabet: Alphabet,
    length: usize,
    last_prefix: Arc<Mutex<Option<String>>>,
}

impl<C: Clock> SnowflakeGenerator<C> {
    pub fn new(snowflake: Arc<Snowflake<C>>, alphabet: Alphabet, length: usize) -> Result<Self> {
        let length = validate_length(length)?;

        let encoded_len = alphabet.encode(snowflake.next_id()?.as_u64()).len();
        let dropped = encoded_len.saturating_sub(length);
        let period_ms = prefix_period_ms(&alphabet, dropped, snowflake.layout().millisecond_stride());
        if period_ms > MAX_PREFIX_PERIOD.as_millis() {
            return Err(GenerateError::InvalidConfig(format!(
                "code length {length} keeps {length} of {encoded_len} snowflake digits, \
                 each code would repeat for about {period_ms}ms"
            )));
        }

        Ok(Self {
            snowflake,
            alphabet,
            length,
            last_prefix: Arc::new(Mutex::new(None)),
        })
    }

    /// Milliseconds until `id` reaches the next value with a different prefix.
    fn wait_for_next_prefix(&self, id: u64, dropped: usize) -> Duration {
        let Some(unit) = digit_weight(&self.alphabet, dropped) else {
            return Duration::from_millis(1);
        };
        let id = u128::from(id);
        let boundary = (id / unit + 1) * unit;
        let stride = u128::from(self.snowflake.layout().millisecond_stride());
        let millis = (boundary - id).div_ceil(stride).max(1);
        Duration::from_millis(u64::try_from(millis).unwrap_or(u64::MAX))
    }
}

/// `alphabet.len()` raised to `digits`, or `None` on overflow.
fn digit_weight(alphabet: &Alphabet, digits: usize) -> Option<u128> {
    let exponent = u32::try_from(digits).ok()?;
    (alphabet.len() as u128).checked_pow(exponent)
}

fn prefix_period_ms(alphabet: &Alphabet, dropped: usize, stride: u64) -> u128 {
    match digit_weight(alphabet, dropped) {
        Some(weight) => weight / u128::from(stride),
        None => u128::MAX,
    }
}

impl<C: Clock> Clone for SnowflakeGenerator<C> {
    fn clone(&self) -> Self {
        Self {
            snowflake: self.snowflake.clone(),
            alphabet: self.alphabet.clone(),
            length: self.length,
            last_prefix: self.last_prefix.clone(),
        }
    }
}

impl<C: Clock> std::fmt::Debug for SnowflakeGenerator<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnowflakeGenerator")
            .field("alphabet", &self.alphabet)
            .field("length", &self.length)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<C: Clock + 'static> Generator for SnowflakeGenerator<C> {
    async fn candidate(&self, _url: &str) -> Result<ShortCode> {
        let mut last_prefix = self.last_prefix.lock().await;
        loop {
            let id = self.snowflake.next_id()?.as_u64();
            let encoded = self.alphabet.encode(id);
            let prefix: String = encoded.chars().take(self.length).collect();

            if last_prefix.as_deref() != Some(prefix.as_str()) {
                let code = self.alphabet.fit_keep_first(&encoded, self.length);
                *last_prefix = Some(prefix);
                return Ok(ShortCode::new_unchecked(code));
            }

            let dropped = encoded.len().saturating_sub(self.length);
            let wait = self.wait_for_next_prefix(id, dropped);
            trace!(prefix = %prefix, wait_ms = wait.as_millis(), "Snowflake prefix unchanged, waiting");
            tokio::time::sleep(wait).await;
        }
    }
}
