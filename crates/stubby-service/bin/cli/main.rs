mod cli;

use crate::cli::{Command, LogFormatArg, StorageBackendArg, CLI};
use anyhow::Context;
use clap::Parser;
use redis::aio::MultiplexedConnection;
use std::sync::Arc;
use stubby_cache::{MokaUrlCache, RedisUrlCache};
use stubby_codegen::CodeStrategy;
use stubby_core::{Repository, ShortCode, UrlCache};
use stubby_counter::{RedisSharedCounter, SharedCounter};
use stubby_service::{RequestContext, Settings, StatsReporter, UrlService};
use stubby_storage::{InMemoryRepository, MySqlRepository};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = CLI::try_parse()?;
    init_tracing(config.log_format);

    let settings = config.settings();
    info!(
        storage_backend = %config.storage,
        strategy = %settings.strategy,
        alphabet = %settings.alphabet.as_str(),
        code_length = settings.code_length,
        redis = config.redis_url.is_some(),
        "starting stubby"
    );

    let redis = match &config.redis_url {
        Some(url) => {
            let client = redis::Client::open(url.as_str())?;
            Some(
                client
                    .get_multiplexed_async_connection()
                    .await
                    .context("failed to connect to redis")?,
            )
        }
        None => None,
    };

    match config.storage {
        StorageBackendArg::InMemory => {
            run(config, settings, InMemoryRepository::new(), redis).await
        }
        StorageBackendArg::Mysql => {
            let mysql_dsn = config
                .mysql_dsn
                .as_deref()
                .context("mysql dsn is required when storage backend is mysql")?;
            let repository = MySqlRepository::connect(mysql_dsn).await?;
            repository.ensure_schema().await?;
            run(config, settings, repository, redis).await
        }
    }
}

fn init_tracing(format: LogFormatArg) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match format {
        LogFormatArg::Text => builder.init(),
        LogFormatArg::Json => builder.json().init(),
    }
}

async fn run<R: Repository>(
    config: CLI,
    settings: Settings,
    repository: R,
    redis: Option<MultiplexedConnection>,
) -> anyhow::Result<()> {
    let counter = redis.clone().map(|conn| {
        Arc::new(RedisSharedCounter::with_key(conn, settings.counter_key.as_str()))
            as Arc<dyn SharedCounter>
    });
    let strategy = CodeStrategy::from_config(&settings.strategy_config(), counter)?;
    let l1 = MokaUrlCache::with_ttl(settings.l1_capacity, settings.l1_ttl);

    match redis {
        Some(conn) => {
            let l2 = RedisUrlCache::with_prefix(conn, settings.l2_key_prefix.as_str())
                .with_default_ttl(settings.l2_ttl);
            let service = UrlService::new(repository, l1, l2, strategy, &settings)?;
            execute(config, &settings, service).await
        }
        None => {
            let l2 = MokaUrlCache::with_ttl(settings.l1_capacity, settings.l2_ttl);
            let service = UrlService::new(repository, l1, l2, strategy, &settings)?;
            execute(config, &settings, service).await
        }
    }
}

async fn execute<R, L1, L2>(
    config: CLI,
    settings: &Settings,
    service: UrlService<R, L1, L2>,
) -> anyhow::Result<()>
where
    R: Repository,
    L1: UrlCache,
    L2: UrlCache,
{
    let service = Arc::new(service);
    service.start();
    let reporter = {
        let service = Arc::clone(&service);
        StatsReporter::start(settings.stats_interval, move || service.stats())
    };

    let outcome = match config.command {
        Command::Shorten {
            urls,
            expire_seconds,
        } => shorten(&service, &urls, expire_seconds).await,
        Command::Resolve { codes } => resolve(&service, &codes).await,
    };

    reporter.stop().await;
    if config.stats {
        println!("{}", serde_json::to_string_pretty(&service.stats())?);
    }
    service.shutdown(settings.shutdown_timeout).await;
    outcome
}

async fn shorten<R, L1, L2>(
    service: &UrlService<R, L1, L2>,
    urls: &[String],
    expire_seconds: Option<u64>,
) -> anyhow::Result<()>
where
    R: Repository,
    L1: UrlCache,
    L2: UrlCache,
{
    for url in urls {
        let code = service
            .create_short_code(&RequestContext::new(), url, expire_seconds)
            .await?;
        println!("{code}\t{url}");
    }
    Ok(())
}

async fn resolve<R, L1, L2>(service: &UrlService<R, L1, L2>, codes: &[String]) -> anyhow::Result<()>
where
    R: Repository,
    L1: UrlCache,
    L2: UrlCache,
{
    for code in codes {
        let short_code = ShortCode::new(code.as_str())?;
        match service.resolve(&RequestContext::new(), &short_code).await? {
            Some(url) => println!("{code}\t{url}"),
            None => println!("{code}\t-"),
        }
    }
    Ok(())
}
