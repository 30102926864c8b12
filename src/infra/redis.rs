//! Redis cache adapter backed by a `deadpool-redis` pool.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use deadpool_redis::{Config, Connection, Pool, PoolConfig, Runtime};
use redis::AsyncCommands;
use tracing::debug;

use crate::cache::{CacheError, CacheStore, escape_glob};

const DEFAULT_SCAN_BATCH: usize = 500;

#[derive(Clone)]
pub struct RedisCache {
    pool: Pool,
    namespace: String,
    scan_batch: usize,
}

impl RedisCache {
    /// Build a pool for `url`. No connection is opened until first use.
    pub fn connect(url: &str, pool_size: usize) -> Result<Self, CacheError> {
        let mut config = Config::from_url(url);
        config.pool = Some(PoolConfig::new(pool_size));
        let pool = config
            .create_pool(Some(Runtime::Tokio1))
            .map_err(CacheError::unavailable)?;
        Ok(Self::new(pool))
    }

    pub fn new(pool: Pool) -> Self {
        Self {
            pool,
            namespace: String::new(),
            scan_batch: DEFAULT_SCAN_BATCH,
        }
    }

    /// Prefix prepended to every key this adapter touches.
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// `COUNT` hint passed to each `SCAN` step.
    pub fn scan_batch(mut self, batch: usize) -> Self {
        self.scan_batch = batch.max(1);
        self
    }

    pub async fn ping(&self) -> Result<(), CacheError> {
        let mut connection = self.connection().await?;
        let _pong: String = redis::cmd("PING")
            .query_async(&mut connection)
            .await
            .map_err(CacheError::unavailable)?;
        Ok(())
    }

    async fn connection(&self) -> Result<Connection, CacheError> {
        self.pool.get().await.map_err(CacheError::unavailable)
    }

    fn key(&self, key: &str) -> String {
        namespaced(&self.namespace, key)
    }
}

fn namespaced(namespace: &str, key: &str) -> String {
    format!("{namespace}{key}")
}

fn namespaced_pattern(namespace: &str, pattern: &str) -> String {
    format!("{}{pattern}", escape_glob(namespace))
}

fn ttl_seconds(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError> {
        let mut connection = self.connection().await?;
        let value: Option<Vec<u8>> = connection
            .get(self.key(key))
            .await
            .map_err(CacheError::unavailable)?;
        Ok(value.map(Bytes::from))
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), CacheError> {
        let mut connection = self.connection().await?;
        let () = connection
            .set_ex(self.key(key), value.as_ref(), ttl_seconds(ttl))
            .await
            .map_err(CacheError::unavailable)?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut connection = self.connection().await?;
        let _removed: u64 = connection
            .del(self.key(key))
            .await
            .map_err(CacheError::unavailable)?;
        Ok(())
    }

    async fn delete_matching(&self, pattern: &str) -> Result<u64, CacheError> {
        let pattern = namespaced_pattern(&self.namespace, pattern);
        let mut connection = self.connection().await?;
        let mut cursor: u64 = 0;
        let mut removed: u64 = 0;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(self.scan_batch)
                .query_async(&mut connection)
                .await
                .map_err(CacheError::unavailable)?;

            if !keys.is_empty() {
                let deleted: u64 = connection
                    .del(&keys)
                    .await
                    .map_err(CacheError::unavailable)?;
                removed += deleted;
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        debug!(%pattern, removed, "deleted matching redis keys");
        Ok(removed)
    }
}
