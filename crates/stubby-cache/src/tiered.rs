use jiff::Timestamp;
use std::fmt::{Display, Formatter};
use std::time::Duration;
use stubby_core::{ShortCode, UrlCache, UrlRecord};
use tracing::{debug, trace, warn};
use typed_builder::TypedBuilder;

/// The cache tier that answered a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    L1,
    L2,
}

impl Display for Tier {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Tier::L1 => f.write_str("l1"),
            Tier::L2 => f.write_str("l2"),
        }
    }
}

/// Tier TTLs; writes use the smaller of these and the time left until expiry.
#[derive(Debug, Clone, Copy, TypedBuilder)]
pub struct TieredCacheConfig {
    #[builder(default = crate::moka::DEFAULT_TTL)]
    pub l1_ttl: Duration,
    #[builder(default = crate::redis::DEFAULT_TTL)]
    pub l2_ttl: Duration,
}

impl Default for TieredCacheConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Walks a fast local cache (L1) and a shared cache (L2) in order.
///
/// # Operation Strategy
///
/// - **Lookup**: L1, then L2. An L2 hit back-fills L1. An entry whose
///   `expire_at` has passed is removed from the tier holding it and treated
///   as a miss.
/// - **Store**: L2 first, then L1.
/// - **Invalidate**: L1, then L2.
///
/// Cache failures never fail the caller: they are logged and the tier is
/// skipped.
#[derive(Debug, Clone)]
pub struct TieredCache<L1, L2> {
    l1: L1,
    l2: L2,
    config: TieredCacheConfig,
}

impl<L1, L2> TieredCache<L1, L2> {
    pub fn new(l1: L1, l2: L2, config: TieredCacheConfig) -> Self {
        Self { l1, l2, config }
    }

    /// Returns a reference to the L1 cache.
    pub fn l1(&self) -> &L1 {
        &self.l1
    }

    /// Returns a reference to the L2 cache.
    pub fn l2(&self) -> &L2 {
        &self.l2
    }

    pub fn config(&self) -> &TieredCacheConfig {
        &self.config
    }
}

impl<L1, L2> TieredCache<L1, L2>
where
    L1: UrlCache,
    L2: UrlCache,
{
    /// Looks the code up in L1 then L2, returning the live record and the
    /// tier that held it.
    pub async fn lookup(&self, code: &ShortCode, now: Timestamp) -> Option<(Tier, UrlRecord)> {
        trace!(code = %code, "Looking up L1");
        if let Some(record) = read_tier(&self.l1, Tier::L1, code, now).await {
            debug!(code = %code, "L1 hit");
            return Some((Tier::L1, record));
        }

        trace!(code = %code, "L1 miss, trying L2");
        let record = read_tier(&self.l2, Tier::L2, code, now).await?;

        debug!(code = %code, "L2 hit, backfilling L1");
        write_tier(&self.l1, Tier::L1, self.config.l1_ttl, code, &record, now).await;
        Some((Tier::L2, record))
    }

    /// Writes the record to L2 then L1.
    pub async fn store(&self, code: &ShortCode, record: &UrlRecord, now: Timestamp) {
        write_tier(&self.l2, Tier::L2, self.config.l2_ttl, code, record, now).await;
        write_tier(&self.l1, Tier::L1, self.config.l1_ttl, code, record, now).await;
    }

    /// Removes the code from both tiers.
    pub async fn invalidate(&self, code: &ShortCode) {
        remove_from_tier(&self.l1, Tier::L1, code).await;
        remove_from_tier(&self.l2, Tier::L2, code).await;
    }
}

async fn read_tier<C: UrlCache>(
    cache: &C,
    tier: Tier,
    code: &ShortCode,
    now: Timestamp,
) -> Option<UrlRecord> {
    match cache.get_url(code).await {
        Ok(Some(record)) if record.is_expired_at(now) => {
            debug!(code = %code, %tier, "Cached record has expired, invalidating");
            remove_from_tier(cache, tier, code).await;
            None
        }
        Ok(record) => record,
        Err(e) => {
            warn!(code = %code, %tier, error = %e, "Cache read failed, skipping tier");
            None
        }
    }
}

async fn write_tier<C: UrlCache>(
    cache: &C,
    tier: Tier,
    tier_ttl: Duration,
    code: &ShortCode,
    record: &UrlRecord,
    now: Timestamp,
) {
    let Some(ttl) = record.cache_ttl(tier_ttl, now) else {
        trace!(code = %code, %tier, "Record already expired, not caching");
        return;
    };

    if let Err(e) = cache.set_url(code, record, Some(ttl)).await {
        warn!(code = %code, %tier, error = %e, "Cache write failed, skipping tier");
    }
}

async fn remove_from_tier<C: UrlCache>(cache: &C, tier: Tier, code: &ShortCode) {
    if let Err(e) = cache.del(code).await {
        warn!(code = %code, %tier, error = %e, "Cache delete failed");
    }
}
