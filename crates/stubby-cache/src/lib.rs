//! Cache tiers for short-code resolution.
//!
//! [`MokaUrlCache`] is the process-local L1, [`RedisUrlCache`] the shared L2,
//! and [`TieredCache`] walks them in order with expiry checks and back-fill.

pub mod moka;
pub mod redis;
pub mod tiered;

pub use moka::{CacheConfig, MokaUrlCache};
pub use redis::RedisUrlCache;
pub use stubby_core::cache::{CacheStats, Result, UrlCache, UrlRecord};
pub use stubby_core::CacheError;
pub use tiered::{Tier, TieredCache, TieredCacheConfig};
