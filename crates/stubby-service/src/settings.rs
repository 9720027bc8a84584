use jiff::Timestamp;
use std::time::Duration;
use stubby_cache::TieredCacheConfig;
use stubby_codegen::{Alphabet, StrategyConfig, StrategyKind, DEFAULT_CODE_LENGTH, DEFAULT_MAX_ATTEMPTS};
use stubby_counter::{DEFAULT_BATCH_SIZE, DEFAULT_COUNTER_KEY};
use stubby_snowflake::{SnowflakeSettings, DEFAULT_EPOCH};
use typed_builder::TypedBuilder;

pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_STATS_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_POOL_WORKERS: usize = 8;
pub const DEFAULT_POOL_QUEUE_CAPACITY: usize = 1000;
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Everything the service reads at startup.
#[derive(Debug, Clone, TypedBuilder)]
pub struct Settings {
    #[builder(default = DEFAULT_CODE_LENGTH)]
    pub code_length: usize,
    #[builder(default)]
    pub alphabet: Alphabet,
    #[builder(default)]
    pub strategy: StrategyKind,
    #[builder(default = DEFAULT_MAX_ATTEMPTS)]
    pub max_collision_attempts: u32,

    #[builder(default = stubby_cache::moka::DEFAULT_MAX_CAPACITY)]
    pub l1_capacity: u64,
    #[builder(default = stubby_cache::moka::DEFAULT_TTL)]
    pub l1_ttl: Duration,
    #[builder(default = stubby_cache::redis::DEFAULT_TTL)]
    pub l2_ttl: Duration,
    #[builder(default = stubby_cache::redis::DEFAULT_KEY_PREFIX.to_string(), setter(into))]
    pub l2_key_prefix: String,

    #[builder(default = DEFAULT_BATCH_SIZE)]
    pub counter_batch_size: u64,
    #[builder(default = DEFAULT_COUNTER_KEY.to_string(), setter(into))]
    pub counter_key: String,

    #[builder(default = 1)]
    pub datacenter_id: u64,
    #[builder(default = 1)]
    pub worker_id: u64,
    #[builder(default = DEFAULT_EPOCH)]
    pub snowflake_epoch: Timestamp,

    /// How often buffered access counts are written to the store.
    #[builder(default = DEFAULT_FLUSH_INTERVAL)]
    pub flush_interval: Duration,
    #[builder(default = DEFAULT_STATS_INTERVAL)]
    pub stats_interval: Duration,
    #[builder(default = DEFAULT_POOL_WORKERS)]
    pub pool_workers: usize,
    #[builder(default = DEFAULT_POOL_QUEUE_CAPACITY)]
    pub pool_queue_capacity: usize,
    #[builder(default = DEFAULT_SHUTDOWN_TIMEOUT)]
    pub shutdown_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Settings {
    pub fn strategy_config(&self) -> StrategyConfig {
        StrategyConfig::builder()
            .kind(self.strategy)
            .alphabet(self.alphabet.clone())
            .code_length(self.code_length)
            .counter_batch_size(self.counter_batch_size)
            .snowflake(
                SnowflakeSettings::builder()
                    .datacenter_id(self.datacenter_id)
                    .worker_id(self.worker_id)
                    .epoch(self.snowflake_epoch)
                    .build(),
            )
            .build()
    }

    pub fn tiered_config(&self) -> TieredCacheConfig {
        TieredCacheConfig::builder()
            .l1_ttl(self.l1_ttl)
            .l2_ttl(self.l2_ttl)
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let settings = Settings::default();
        assert_eq!(settings.code_length, 6);
        assert_eq!(settings.alphabet.len(), 62);
        assert_eq!(settings.strategy, StrategyKind::Random);
        assert_eq!(settings.max_collision_attempts, 10);
        assert_eq!(settings.l1_capacity, 10_000);
        assert_eq!(settings.l1_ttl, Duration::from_secs(3600));
        assert_eq!(settings.l2_ttl, Duration::from_secs(86_400));
        assert_eq!(settings.l2_key_prefix, "stubby:url:");
        assert_eq!(settings.counter_batch_size, 1000);
        assert_eq!(settings.counter_key, "stubby:counter");
        assert_eq!((settings.datacenter_id, settings.worker_id), (1, 1));
        assert_eq!(settings.snowflake_epoch.as_second(), 1_609_459_200);
        assert_eq!(settings.pool_workers, 8);
        assert_eq!(settings.pool_queue_capacity, 1000);
        assert_eq!(settings.shutdown_timeout, Duration::from_secs(5));
    }

    #[test]
    fn strategy_config_carries_node_ids() {
        let settings = Settings::builder()
            .strategy(StrategyKind::Snowflake)
            .code_length(11)
            .datacenter_id(3)
            .worker_id(7)
            .build();

        let config = settings.strategy_config();
        assert_eq!(config.kind, StrategyKind::Snowflake);
        assert_eq!(config.code_length, 11);
        assert_eq!(config.snowflake.datacenter_id, 3);
        assert_eq!(config.snowflake.worker_id, 7);
    }
}
