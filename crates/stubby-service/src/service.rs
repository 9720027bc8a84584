use jiff::{SignedDuration, Timestamp};
use std::sync::Arc;
use std::time::{Duration, Instant};
use stubby_cache::TieredCache;
use stubby_codegen::{CodeStrategy, CollisionResolver};
use stubby_core::{NewUrlMapping, Repository, ShortCode, StorageError, UrlCache, UrlRecord};
use tracing::{debug, info, trace, warn, Instrument};

use crate::aggregator::{AccessCountAggregator, FlushOutcome, FlushReport};
use crate::error::{Result, ServiceError};
use crate::instrument::{redact_url, RequestContext};
use crate::pool::WorkerPool;
use crate::settings::Settings;
use crate::stats::ServiceStats;

/// Inserts that lose a race for their code get this many fresh codes.
const INSERT_ATTEMPTS: u32 = 3;

/// Creates short codes and resolves them through L1, L2 and the store.
///
/// # Create
///
/// A code comes from the configured strategy, checked against the store by
/// the collision resolver. It is inserted into the store, then written to L2
/// and L1. Cache TTLs never outlive the mapping's expiry.
///
/// # Resolve
///
/// L1, then L2, then the store. A hit on a lower tier back-fills the tiers
/// above it. Expired entries are never served; an expired mapping found in
/// the store is soft-deleted so its code can be issued again. Every
/// successful resolution is counted by the access-count aggregator.
///
/// Cache failures only cost latency. A store failure on read is reported as
/// [`ServiceError::StoreUnavailable`], distinct from a missing code.
#[derive(Debug)]
pub struct UrlService<R, L1, L2> {
    repository: Arc<R>,
    cache: TieredCache<L1, L2>,
    resolver: CollisionResolver<CodeStrategy>,
    aggregator: Arc<AccessCountAggregator<R>>,
    pool: Arc<WorkerPool>,
    flush_interval: Duration,
}

impl<R, L1, L2> UrlService<R, L1, L2>
where
    R: Repository,
    L1: UrlCache,
    L2: UrlCache,
{
    /// Wires the service up. Must be called inside a tokio runtime.
    pub fn new(
        repository: R,
        l1: L1,
        l2: L2,
        strategy: CodeStrategy,
        settings: &Settings,
    ) -> Result<Self> {
        let repository = Arc::new(repository);
        let resolver = CollisionResolver::new(strategy, settings.max_collision_attempts)?;
        let pool = Arc::new(WorkerPool::new(
            settings.pool_workers,
            settings.pool_queue_capacity,
        )?);
        let aggregator = Arc::new(AccessCountAggregator::new(
            Arc::clone(&repository),
            Arc::clone(&pool),
        ));

        Ok(Self {
            repository,
            cache: TieredCache::new(l1, l2, settings.tiered_config()),
            resolver,
            aggregator,
            pool,
            flush_interval: settings.flush_interval,
        })
    }

    /// Starts the periodic access-count flush.
    pub fn start(&self) {
        self.aggregator.start(self.flush_interval);
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    pub fn cache(&self) -> &TieredCache<L1, L2> {
        &self.cache
    }

    pub fn aggregator(&self) -> &AccessCountAggregator<R> {
        &self.aggregator
    }

    /// Shortens `original_url`.
    ///
    /// `expire_seconds` of `None` or `Some(0)` means the mapping never expires.
    pub async fn create_short_code(
        &self,
        ctx: &RequestContext,
        original_url: &str,
        expire_seconds: Option<u64>,
    ) -> Result<ShortCode> {
        let started = Instant::now();
        let span = ctx.span("create");
        let result = self
            .create(original_url, expire_seconds)
            .instrument(span.clone())
            .await;

        let _enter = span.enter();
        match &result {
            Ok(code) => info!(
                code = %code,
                url = %redact_url(original_url),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Short code created"
            ),
            Err(e) => warn!(
                url = %redact_url(original_url),
                error = %e,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Short code creation failed"
            ),
        }
        result
    }

    async fn create(&self, original_url: &str, expire_seconds: Option<u64>) -> Result<ShortCode> {
        let now = Timestamp::now();
        let expire_at = expiry(now, expire_seconds)?;

        for attempt in 1..=INSERT_ATTEMPTS {
            let repository = Arc::clone(&self.repository);
            let code = self
                .resolver
                .generate(original_url, move |code| {
                    let repository = Arc::clone(&repository);
                    let code = code.clone();
                    async move { repository.exists(&code).await }
                })
                .await?;

            let mapping = NewUrlMapping {
                short_code: code.clone(),
                original_url: original_url.to_string(),
                expire_at,
            };
            match self.repository.insert(mapping).await {
                Ok(id) => {
                    debug!(code = %code, id, "Mapping stored");
                    let record = UrlRecord::new(original_url, expire_at);
                    self.cache.store(&code, &record, now).await;
                    return Ok(code);
                }
                Err(StorageError::Conflict(_)) => {
                    debug!(code = %code, attempt, "Code was taken concurrently, generating another");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(ServiceError::CodeSpaceExhausted {
            attempts: INSERT_ATTEMPTS,
        })
    }

    /// Resolves `code` to its original URL.
    ///
    /// `Ok(None)` means the code is unknown or expired.
    pub async fn resolve(&self, ctx: &RequestContext, code: &ShortCode) -> Result<Option<String>> {
        let started = Instant::now();
        let span = ctx.span("resolve");
        let result = self.lookup(code).instrument(span.clone()).await;

        let _enter = span.enter();
        match &result {
            Ok(found) => debug!(
                code = %code,
                found = found.is_some(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Short code resolved"
            ),
            Err(e) => warn!(
                code = %code,
                error = %e,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Short code resolution failed"
            ),
        }
        result
    }

    async fn lookup(&self, code: &ShortCode) -> Result<Option<String>> {
        let now = Timestamp::now();

        if let Some((tier, record)) = self.cache.lookup(code, now).await {
            trace!(code = %code, %tier, "Served from cache");
            self.aggregator.record(code);
            return Ok(Some(record.original_url));
        }

        trace!(code = %code, "Cache miss, querying store");
        let Some(mapping) = self.repository.find_by_code(code).await? else {
            debug!(code = %code, "Short code not found");
            return Ok(None);
        };

        if mapping.is_expired_at(now) {
            debug!(code = %code, "Mapping has expired");
            self.retire_expired(code, now).await;
            return Ok(None);
        }

        let record = mapping.to_record();
        self.cache.store(code, &record, now).await;
        self.aggregator.record(code);
        Ok(Some(record.original_url))
    }

    /// Soft-deletes an expired mapping and drops it from the caches.
    ///
    /// Best effort: the code reads as missing either way, and a failed
    /// delete is retried by the next lookup or by an insert reusing the code.
    async fn retire_expired(&self, code: &ShortCode, now: Timestamp) {
        match self.repository.delete_expired(code, now).await {
            Ok(true) => debug!(code = %code, "Expired mapping soft-deleted"),
            Ok(false) => trace!(code = %code, "Expired mapping already replaced or deleted"),
            Err(e) => warn!(code = %code, error = %e, "Failed to soft-delete expired mapping"),
        }
        self.cache.invalidate(code).await;
    }

    /// Writes buffered access counts now.
    pub async fn flush_access_counts(&self) -> FlushOutcome {
        self.aggregator.flush().await
    }

    pub fn stats(&self) -> ServiceStats {
        ServiceStats {
            l1: self.cache.l1().stats().unwrap_or_default(),
            l2: self.cache.l2().stats(),
            pending_codes: self.aggregator.pending_codes(),
            pool: self.pool.stats(),
            counter_leases: self.resolver.generator().counter_leases(),
        }
    }

    /// Stops the flush task, flushes what is left, and drains the pool.
    pub async fn shutdown(&self, timeout: Duration) -> Option<FlushReport> {
        let report = self.aggregator.shutdown(timeout).await;
        self.pool.shutdown(timeout).await;
        info!(flushed = report.is_some(), "Service stopped");
        report
    }
}

fn expiry(now: Timestamp, expire_seconds: Option<u64>) -> Result<Option<Timestamp>> {
    match expire_seconds {
        None | Some(0) => Ok(None),
        Some(seconds) => {
            let duration = i64::try_from(seconds)
                .map(SignedDuration::from_secs)
                .map_err(|_| ServiceError::InvalidExpiry(seconds))?;
            now.checked_add(duration)
                .map(Some)
                .map_err(|_| ServiceError::InvalidExpiry(seconds))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_or_missing_expiry_never_expires() {
        let now = Timestamp::now();
        assert_eq!(expiry(now, None).unwrap(), None);
        assert_eq!(expiry(now, Some(0)).unwrap(), None);
    }

    #[test]
    fn expiry_is_relative_to_now() {
        let now = Timestamp::from_second(1_700_000_000).unwrap();
        let expire_at = expiry(now, Some(90)).unwrap().unwrap();
        assert_eq!(expire_at.as_second(), 1_700_000_090);
    }

    #[test]
    fn huge_expiry_is_rejected() {
        let err = expiry(Timestamp::now(), Some(u64::MAX)).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidExpiry(_)));
    }
}
