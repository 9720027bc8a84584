use clap::{Parser, Subcommand, ValueEnum};
use jiff::Timestamp;
use std::fmt::{Display, Formatter};
use std::time::Duration;
use stubby_codegen::{Alphabet, StrategyKind, DEFAULT_CODE_LENGTH, DEFAULT_MAX_ATTEMPTS};
use stubby_counter::{DEFAULT_BATCH_SIZE, DEFAULT_COUNTER_KEY};
use stubby_service::settings::{
    DEFAULT_FLUSH_INTERVAL, DEFAULT_POOL_QUEUE_CAPACITY, DEFAULT_POOL_WORKERS,
    DEFAULT_SHUTDOWN_TIMEOUT, DEFAULT_STATS_INTERVAL,
};
use stubby_service::Settings;
use stubby_snowflake::DEFAULT_EPOCH;

pub const STORAGE_BACKEND_ENV: &str = "STUBBY_STORAGE_BACKEND";
pub const MYSQL_DSN_ENV: &str = "STUBBY_MYSQL_DSN";
pub const REDIS_URL_ENV: &str = "STUBBY_REDIS_URL";
pub const STRATEGY_ENV: &str = "STUBBY_STRATEGY";
pub const ALPHABET_ENV: &str = "STUBBY_ALPHABET";
pub const CODE_LENGTH_ENV: &str = "STUBBY_CODE_LENGTH";
pub const MAX_COLLISION_ATTEMPTS_ENV: &str = "STUBBY_MAX_COLLISION_ATTEMPTS";
pub const COUNTER_BATCH_SIZE_ENV: &str = "STUBBY_COUNTER_BATCH_SIZE";
pub const DATACENTER_ID_ENV: &str = "STUBBY_DATACENTER_ID";
pub const WORKER_ID_ENV: &str = "STUBBY_WORKER_ID";
pub const LOG_FORMAT_ENV: &str = "STUBBY_LOG_FORMAT";
pub const L1_CAPACITY_ENV: &str = "STUBBY_L1_CAPACITY";
pub const L1_TTL_ENV: &str = "STUBBY_L1_TTL_SECS";
pub const L2_TTL_ENV: &str = "STUBBY_L2_TTL_SECS";
pub const L2_KEY_PREFIX_ENV: &str = "STUBBY_L2_KEY_PREFIX";
pub const COUNTER_KEY_ENV: &str = "STUBBY_COUNTER_KEY";
pub const SNOWFLAKE_EPOCH_ENV: &str = "STUBBY_SNOWFLAKE_EPOCH";
pub const FLUSH_INTERVAL_ENV: &str = "STUBBY_FLUSH_INTERVAL_SECS";
pub const STATS_INTERVAL_ENV: &str = "STUBBY_STATS_INTERVAL_SECS";
pub const POOL_WORKERS_ENV: &str = "STUBBY_POOL_WORKERS";
pub const POOL_QUEUE_CAPACITY_ENV: &str = "STUBBY_POOL_QUEUE_CAPACITY";
pub const SHUTDOWN_TIMEOUT_ENV: &str = "STUBBY_SHUTDOWN_TIMEOUT_SECS";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StorageBackendArg {
    #[value(name = "in-memory")]
    InMemory,
    #[value(name = "mysql")]
    Mysql,
}

impl Display for StorageBackendArg {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageBackendArg::InMemory => write!(f, "in-memory"),
            StorageBackendArg::Mysql => write!(f, "mysql"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StrategyArg {
    Random,
    Md5,
    Murmur3,
    Base64,
    Counter,
    Snowflake,
}

impl From<StrategyArg> for StrategyKind {
    fn from(value: StrategyArg) -> Self {
        match value {
            StrategyArg::Random => StrategyKind::Random,
            StrategyArg::Md5 => StrategyKind::Md5,
            StrategyArg::Murmur3 => StrategyKind::Murmur3,
            StrategyArg::Base64 => StrategyKind::Base64,
            StrategyArg::Counter => StrategyKind::Counter,
            StrategyArg::Snowflake => StrategyKind::Snowflake,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AlphabetArg {
    #[value(name = "base62")]
    Base62,
    #[value(name = "base64url")]
    Base64Url,
}

impl From<AlphabetArg> for Alphabet {
    fn from(value: AlphabetArg) -> Self {
        match value {
            AlphabetArg::Base62 => Alphabet::base62(),
            AlphabetArg::Base64Url => Alphabet::url_safe_base64(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormatArg {
    Text,
    Json,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Shortens each URL and prints `<code>\t<url>`.
    Shorten {
        #[arg(required = true)]
        urls: Vec<String>,
        /// Lifetime of the mappings; 0 means never expire.
        #[arg(long)]
        expire_seconds: Option<u64>,
    },
    /// Resolves each code and prints `<code>\t<url>`, or `<code>\t-` when unknown.
    Resolve {
        #[arg(required = true)]
        codes: Vec<String>,
    },
}

#[derive(Debug, Parser)]
#[command(name = "stubby")]
pub struct CLI {
    #[arg(
        long,
        env = STORAGE_BACKEND_ENV,
        value_enum,
        default_value_t = StorageBackendArg::InMemory
    )]
    pub storage: StorageBackendArg,

    #[arg(long, env = MYSQL_DSN_ENV, required_if_eq("storage", "mysql"))]
    pub mysql_dsn: Option<String>,

    /// Shared L2 cache and counter. Without it both stay in this process.
    #[arg(long, env = REDIS_URL_ENV)]
    pub redis_url: Option<String>,

    #[arg(long, env = STRATEGY_ENV, value_enum, default_value_t = StrategyArg::Random)]
    pub strategy: StrategyArg,

    #[arg(long, env = ALPHABET_ENV, value_enum, default_value_t = AlphabetArg::Base62)]
    pub alphabet: AlphabetArg,

    #[arg(long, env = CODE_LENGTH_ENV, default_value_t = DEFAULT_CODE_LENGTH)]
    pub code_length: usize,

    #[arg(long, env = MAX_COLLISION_ATTEMPTS_ENV, default_value_t = DEFAULT_MAX_ATTEMPTS)]
    pub max_collision_attempts: u32,

    #[arg(long, env = COUNTER_BATCH_SIZE_ENV, default_value_t = DEFAULT_BATCH_SIZE)]
    pub counter_batch_size: u64,

    #[arg(long, env = DATACENTER_ID_ENV, default_value_t = 1)]
    pub datacenter_id: u64,

    #[arg(long, env = WORKER_ID_ENV, default_value_t = 1)]
    pub worker_id: u64,

    /// Snowflake timestamp zero point, RFC 3339.
    #[arg(long, env = SNOWFLAKE_EPOCH_ENV, default_value_t = DEFAULT_EPOCH)]
    pub snowflake_epoch: Timestamp,

    #[arg(long, env = COUNTER_KEY_ENV, default_value = DEFAULT_COUNTER_KEY)]
    pub counter_key: String,

    /// Maximum number of entries in the in-process cache.
    #[arg(long, env = L1_CAPACITY_ENV, default_value_t = stubby_cache::moka::DEFAULT_MAX_CAPACITY)]
    pub l1_capacity: u64,

    #[arg(long, env = L1_TTL_ENV, default_value_t = stubby_cache::moka::DEFAULT_TTL.as_secs())]
    pub l1_ttl_secs: u64,

    #[arg(long, env = L2_TTL_ENV, default_value_t = stubby_cache::redis::DEFAULT_TTL.as_secs())]
    pub l2_ttl_secs: u64,

    #[arg(long, env = L2_KEY_PREFIX_ENV, default_value = stubby_cache::redis::DEFAULT_KEY_PREFIX)]
    pub l2_key_prefix: String,

    #[arg(long, env = FLUSH_INTERVAL_ENV, default_value_t = DEFAULT_FLUSH_INTERVAL.as_secs())]
    pub flush_interval_secs: u64,

    /// How often cache and pool stats are logged.
    #[arg(long, env = STATS_INTERVAL_ENV, default_value_t = DEFAULT_STATS_INTERVAL.as_secs())]
    pub stats_interval_secs: u64,

    #[arg(long, env = POOL_WORKERS_ENV, default_value_t = DEFAULT_POOL_WORKERS)]
    pub pool_workers: usize,

    #[arg(long, env = POOL_QUEUE_CAPACITY_ENV, default_value_t = DEFAULT_POOL_QUEUE_CAPACITY)]
    pub pool_queue_capacity: usize,

    #[arg(long, env = SHUTDOWN_TIMEOUT_ENV, default_value_t = DEFAULT_SHUTDOWN_TIMEOUT.as_secs())]
    pub shutdown_timeout_secs: u64,

    #[arg(long, env = LOG_FORMAT_ENV, value_enum, default_value_t = LogFormatArg::Text)]
    pub log_format: LogFormatArg,

    /// Print service stats as JSON before exiting.
    #[arg(long)]
    pub stats: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl CLI {
    pub fn settings(&self) -> Settings {
        Settings::builder()
            .strategy(self.strategy.into())
            .alphabet(self.alphabet.into())
            .code_length(self.code_length)
            .max_collision_attempts(self.max_collision_attempts)
            .counter_batch_size(self.counter_batch_size)
            .datacenter_id(self.datacenter_id)
            .worker_id(self.worker_id)
            .snowflake_epoch(self.snowflake_epoch)
            .counter_key(self.counter_key.as_str())
            .l1_capacity(self.l1_capacity)
            .l1_ttl(Duration::from_secs(self.l1_ttl_secs))
            .l2_ttl(Duration::from_secs(self.l2_ttl_secs))
            .l2_key_prefix(self.l2_key_prefix.as_str())
            .flush_interval(Duration::from_secs(self.flush_interval_secs))
            .stats_interval(Duration::from_secs(self.stats_interval_secs))
            .pool_workers(self.pool_workers)
            .pool_queue_capacity(self.pool_queue_capacity)
            .shutdown_timeout(Duration::from_secs(self.shutdown_timeout_secs))
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_settings() {
        let cli = CLI::try_parse_from(["stubby", "resolve", "abc123"]).unwrap();
        let settings = cli.settings();
        let defaults = Settings::default();

        assert_eq!(settings.code_length, defaults.code_length);
        assert_eq!(settings.l1_capacity, defaults.l1_capacity);
        assert_eq!(settings.l1_ttl, defaults.l1_ttl);
        assert_eq!(settings.l2_ttl, defaults.l2_ttl);
        assert_eq!(settings.l2_key_prefix, defaults.l2_key_prefix);
        assert_eq!(settings.counter_key, defaults.counter_key);
        assert_eq!(settings.snowflake_epoch, defaults.snowflake_epoch);
        assert_eq!(settings.flush_interval, defaults.flush_interval);
        assert_eq!(settings.stats_interval, defaults.stats_interval);
        assert_eq!(settings.pool_workers, defaults.pool_workers);
        assert_eq!(settings.pool_queue_capacity, defaults.pool_queue_capacity);
        assert_eq!(settings.shutdown_timeout, defaults.shutdown_timeout);
    }

    #[test]
    fn flags_reach_settings() {
        let cli = CLI::try_parse_from([
            "stubby",
            "--strategy",
            "snowflake",
            "--l1-capacity",
            "500",
            "--l1-ttl-secs",
            "30",
            "--l2-ttl-secs",
            "120",
            "--snowflake-epoch",
            "2024-01-01T00:00:00Z",
            "--flush-interval-secs",
            "5",
            "--pool-workers",
            "2",
            "shorten",
            "https://example.com",
        ])
        .unwrap();
        let settings = cli.settings();

        assert_eq!(settings.strategy, StrategyKind::Snowflake);
        assert_eq!(settings.l1_capacity, 500);
        assert_eq!(settings.l1_ttl, Duration::from_secs(30));
        assert_eq!(settings.l2_ttl, Duration::from_secs(120));
        assert_eq!(settings.snowflake_epoch.as_second(), 1_704_067_200);
        assert_eq!(settings.flush_interval, Duration::from_secs(5));
        assert_eq!(settings.pool_workers, 2);
    }
}
