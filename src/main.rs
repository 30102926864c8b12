use std::process;

use bytes::Bytes;
use rowcache::{
    cache::{CacheConfig, CacheError, CacheStore},
    config::{self, Command, Settings},
    infra::{db, error::InfraError, redis::RedisCache, telemetry},
};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

const CHECK_KEY: &str = "rowcache:check";

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &InfraError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), InfraError> {
    let (cli_args, settings) = config::load_with_cli().map_err(|err| {
        InfraError::configuration(format!("failed to load configuration: {err}"))
    })?;

    telemetry::init(&settings.logging)?;

    match cli_args.command.unwrap_or(Command::Check) {
        Command::Check => run_check(&settings).await,
        Command::Purge(args) => run_purge(&settings, &args.pattern).await,
        Command::ShowConfig => {
            println!("{settings}");
            Ok(())
        }
    }
}

async fn run_check(settings: &Settings) -> Result<(), InfraError> {
    match settings.database.url.as_deref() {
        Some(url) => {
            let pool = db::connect(url, settings.database.max_connections.get()).await?;
            db::health_check(&pool).await?;
            info!("postgres reachable");
        }
        None => warn!("database.url is not set; skipping postgres check"),
    }

    match settings.redis.url.as_deref() {
        Some(_) => {
            let cache = redis_cache(settings)?;
            cache.ping().await?;
            let ttl = CacheConfig::from(&settings.cache).default_ttl();
            cache.set(CHECK_KEY, Bytes::from_static(b"ok"), ttl).await?;
            let stored = cache.get(CHECK_KEY).await?;
            cache.delete(CHECK_KEY).await?;
            if stored.as_deref() != Some(b"ok".as_slice()) {
                return Err(CacheError::unavailable(
                    "redis did not return the check key that was just written",
                )
                .into());
            }
            info!(ttl_seconds = ttl.as_secs(), "redis reachable and writable");
        }
        None => warn!("redis.url is not set; skipping redis check"),
    }

    Ok(())
}

async fn run_purge(settings: &Settings, pattern: &str) -> Result<(), InfraError> {
    let removed = redis_cache(settings)?.delete_matching(pattern).await?;
    info!(pattern, removed, "purged cache keys");
    println!("{removed}");
    Ok(())
}

fn redis_cache(settings: &Settings) -> Result<RedisCache, InfraError> {
    let url = settings
        .redis
        .url
        .as_deref()
        .ok_or_else(|| InfraError::configuration("redis.url is required"))?;

    Ok(RedisCache::connect(url, settings.redis.pool_size.get())?
        .namespace(settings.redis.key_namespace.clone())
        .scan_batch(settings.redis.scan_batch.get()))
}
