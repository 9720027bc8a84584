use async_trait::async_trait;
use moka::future::Cache;
use moka::Expiry;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use stubby_core::cache::Result;
use stubby_core::{CacheStats, ShortCode, UrlCache, UrlRecord};
use tracing::{debug, trace};
use typed_builder::TypedBuilder;

pub const DEFAULT_MAX_CAPACITY: u64 = 10_000;
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone)]
struct Slot {
    record: UrlRecord,
    ttl: Duration,
}

/// Each entry lives for the TTL it was written with.
struct SlotExpiry;

impl Expiry<String, Slot> for SlotExpiry {
    fn expire_after_create(&self, _key: &String, value: &Slot, _created_at: Instant) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &Slot,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

/// An in-memory L1 cache implementation using Moka.
///
/// Bounded by entry count, with a per-entry TTL. Hits, misses, and
/// capacity/TTL evictions are counted for [`UrlCache::stats`].
#[derive(Debug, Clone)]
pub struct MokaUrlCache {
    cache: Cache<String, Slot>,
    default_ttl: Duration,
    counters: Arc<Counters>,
}

impl MokaUrlCache {
    /// Creates a cache with the default capacity (10,000) and TTL (one hour).
    pub fn new() -> Self {
        CacheConfig::builder().build().into()
    }

    /// Creates a cache with a custom maximum capacity.
    pub fn with_capacity(max_capacity: u64) -> Self {
        CacheConfig::builder().max_capacity(max_capacity).build().into()
    }

    /// Creates a cache with custom capacity and default TTL.
    pub fn with_ttl(max_capacity: u64, ttl: Duration) -> Self {
        CacheConfig::builder()
            .max_capacity(max_capacity)
            .ttl(ttl)
            .build()
            .into()
    }

    /// Returns a builder for creating a custom cache configuration.
    pub fn builder() -> CacheConfigBuilder {
        CacheConfig::builder()
    }

    /// Applies pending evictions so that counters and entry counts are current.
    pub async fn run_pending_tasks(&self) {
        self.cache.run_pending_tasks().await;
    }
}

impl Default for MokaUrlCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UrlCache for MokaUrlCache {
    async fn get_url(&self, code: &ShortCode) -> Result<Option<UrlRecord>> {
        trace!(code = %code, "Fetching URL record from Moka cache");

        match self.cache.get(code.as_str()).await {
            Some(slot) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                debug!(code = %code, "Cache hit in Moka");
                Ok(Some(slot.record))
            }
            None => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                trace!(code = %code, "Cache miss in Moka");
                Ok(None)
            }
        }
    }

    async fn set_url(
        &self,
        code: &ShortCode,
        record: &UrlRecord,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let ttl = ttl.unwrap_or(self.default_ttl).min(self.default_ttl);
        trace!(code = %code, ttl_ms = ttl.as_millis() as u64, "Storing URL record in Moka cache");

        let slot = Slot {
            record: record.clone(),
            ttl,
        };
        self.cache.insert(code.as_str().to_string(), slot).await;
        debug!(code = %code, "Cached record in Moka");
        Ok(())
    }

    async fn del(&self, code: &ShortCode) -> Result<()> {
        trace!(code = %code, "Removing URL record from Moka cache");

        self.cache.invalidate(code.as_str()).await;
        debug!(code = %code, "Removed record from Moka cache (if present)");
        Ok(())
    }

    fn stats(&self) -> Option<CacheStats> {
        Some(CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            entries: self.cache.entry_count(),
        })
    }
}

/// Configuration for creating a MokaUrlCache with custom settings.
#[derive(Debug, Clone, TypedBuilder)]
pub struct CacheConfig {
    /// Maximum number of entries the cache can hold.
    #[builder(default = DEFAULT_MAX_CAPACITY)]
    max_capacity: u64,
    /// Time-to-live for entries written without a shorter TTL.
    #[builder(default = DEFAULT_TTL)]
    ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl From<CacheConfig> for MokaUrlCache {
    fn from(config: CacheConfig) -> Self {
        let counters = Arc::new(Counters::default());
        let evictions = counters.clone();

        let cache = Cache::builder()
            .max_capacity(config.max_capacity)
            .expire_after(SlotExpiry)
            .eviction_listener(move |_key, _value, cause| {
                if cause.was_evicted() {
                    evictions.evictions.fetch_add(1, Ordering::Relaxed);
                }
            })
            .build();

        MokaUrlCache {
            cache,
            default_ttl: config.ttl,
            counters,
        }
    }
}
