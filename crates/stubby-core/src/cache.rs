use crate::error::CacheError;
use crate::shortcode::ShortCode;
use async_trait::async_trait;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Type alias for cache results.
pub type Result<T> = std::result::Result<T, CacheError>;

/// The value a cache tier holds for a short code.
///
/// Caches never own the truth; `expire_at` travels with the URL so a tier
/// that still holds an entry past its expiry can be detected on read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlRecord {
    /// The original URL that was shortened.
    pub original_url: String,
    /// When the mapping expires, if ever.
    pub expire_at: Option<Timestamp>,
}

impl UrlRecord {
    pub fn new(original_url: impl Into<String>, expire_at: Option<Timestamp>) -> Self {
        Self {
            original_url: original_url.into(),
            expire_at,
        }
    }

    /// Whether the record has expired at `now`.
    pub fn is_expired_at(&self, now: Timestamp) -> bool {
        self.expire_at.is_some_and(|expire_at| now >= expire_at)
    }

    /// TTL to use when caching the record in a tier whose own TTL is `tier_ttl`.
    ///
    /// Returns `None` if the record has already expired and must not be cached.
    pub fn cache_ttl(&self, tier_ttl: Duration, now: Timestamp) -> Option<Duration> {
        let Some(expire_at) = self.expire_at else {
            return Some(tier_ttl);
        };

        let remaining = now.duration_until(expire_at);
        if remaining.is_zero() || remaining.is_negative() {
            return None;
        }

        let remaining = Duration::try_from(remaining).ok()?;
        Some(remaining.min(tier_ttl))
    }
}

/// Counters exposed by a cache tier that tracks them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entries: u64,
}

impl CacheStats {
    /// Fraction of lookups that were hits, `0.0` before any lookup.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// A cache for URL records keyed by [`ShortCode`].
///
/// Implementations back the L1 (process-local) and L2 (shared) tiers.
#[async_trait]
pub trait UrlCache: Send + Sync + 'static {
    /// Get URL record from cache.
    ///
    /// Returns `Ok(None)` if the key is not in the cache.
    async fn get_url(&self, code: &ShortCode) -> Result<Option<UrlRecord>>;

    /// Store URL record in cache.
    ///
    /// If `ttl` is `None` the implementation's default expiration applies.
    async fn set_url(
        &self,
        code: &ShortCode,
        record: &UrlRecord,
        ttl: Option<Duration>,
    ) -> Result<()>;

    /// Remove URL record from cache.
    ///
    /// It is not an error if the key does not exist.
    async fn del(&self, code: &ShortCode) -> Result<()>;

    /// Hit/miss/eviction counters, for tiers that keep them.
    fn stats(&self) -> Option<CacheStats> {
        None
    }
}
