//! Redis-backed L2 store.
//!
//! Every command is bounded by the configured operation timeout; a hung
//! connection surfaces as [`CacheError::Timeout`] instead of stalling the
//! caller until the TCP timeout fires.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Connection, Pool, PoolConfig, Runtime, Timeouts};
use redis::AsyncCommands;

use super::{CacheStore, StoreKind, StoredValue};
use crate::config::RedisConfig;
use crate::error::{CacheError, Result};
use crate::pattern::KeyPattern;

/// Keys fetched per `SCAN` round trip and deleted per `DEL`.
const SCAN_BATCH: usize = 500;

/// Redis cache leaf over a deadpool connection pool.
#[derive(Clone)]
pub struct RedisStore {
    pool: Pool,
    op_timeout: Duration,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("pool", &self.pool.status())
            .field("op_timeout", &self.op_timeout)
            .finish()
    }
}

impl RedisStore {
    /// Build the pool. Does not open a connection; call [`CacheStore::ping`]
    /// to probe reachability.
    pub fn from_config(config: &RedisConfig) -> Result<Self> {
        if config.pool_size == 0 {
            return Err(CacheError::configuration("redis.pool_size must be > 0"));
        }
        let timeout = config.timeout();

        let mut redis_config = deadpool_redis::Config::from_url(&config.url);
        let mut pool_config = PoolConfig::new(config.pool_size);
        pool_config.timeouts = Timeouts {
            wait: Some(timeout),
            create: Some(timeout),
            recycle: Some(timeout),
        };
        redis_config.pool = Some(pool_config);

        let pool = redis_config
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| CacheError::pool(format!("failed to create Redis pool: {e}")))?;

        Ok(Self::new(pool, timeout))
    }

    pub fn new(pool: Pool, op_timeout: Duration) -> Self {
        Self { pool, op_timeout }
    }

    /// The underlying pool, shared with the invalidation publisher.
    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    async fn bounded<T, F>(&self, op: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::time::timeout(self.op_timeout, fut)
            .await
            .map_err(|_| CacheError::timeout(op, self.op_timeout))?
    }

    async fn connection(&self) -> Result<Connection> {
        self.pool
            .get()
            .await
            .map_err(|e| CacheError::pool(format!("failed to get Redis connection: {e}")))
    }

    async fn scan_matching(&self, conn: &mut Connection, pattern: &str) -> Result<Vec<String>> {
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut *conn)
                .await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        // SCAN may return a key more than once.
        keys.sort_unstable();
        keys.dedup();
        Ok(keys)
    }
}

/// PSETEX argument for `ttl`: at least 1 ms, at most `i64::MAX`.
fn psetex_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis())
        .unwrap_or(u64::MAX)
        .clamp(1, i64::MAX as u64)
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<StoredValue>> {
        self.bounded("get", async {
            let mut conn = self.connection().await?;
            let (data, pttl): (Option<Vec<u8>>, i64) = redis::pipe()
                .get(key)
                .cmd("PTTL")
                .arg(key)
                .query_async(&mut conn)
                .await?;

            // PTTL: -2 missing, -1 no expiry.
            Ok(match (data, pttl) {
                (None, _) | (_, -2) => None,
                (Some(data), ms) => Some(StoredValue {
                    data: Arc::new(data),
                    remaining_ttl: (ms >= 0).then(|| Duration::from_millis(ms as u64)),
                }),
            })
        })
        .await
    }

    async fn set(&self, key: &str, data: Arc<Vec<u8>>, ttl: Duration) -> Result<()> {
        let ttl_ms = psetex_millis(ttl);
        self.bounded("set", async {
            let mut conn = self.connection().await?;
            conn.pset_ex::<_, _, ()>(key, data.as_slice(), ttl_ms).await?;
            tracing::debug!(key = %key, ttl_ms, "redis set");
            Ok(())
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.bounded("delete", async {
            let mut conn = self.connection().await?;
            let removed: usize = conn.del(key).await?;
            Ok(removed > 0)
        })
        .await
    }

    async fn delete_pattern(&self, pattern: &KeyPattern) -> Result<usize> {
        self.bounded("delete_pattern", async {
            let mut conn = self.connection().await?;
            let keys = self.scan_matching(&mut conn, pattern.as_str()).await?;

            let mut removed = 0usize;
            for chunk in keys.chunks(SCAN_BATCH) {
                let n: usize = conn.del(chunk).await?;
                removed += n;
            }
            tracing::debug!(pattern = %pattern, removed, "redis pattern delete");
            Ok(removed)
        })
        .await
    }

    async fn clear(&self) -> Result<()> {
        self.bounded("clear", async {
            let mut conn = self.connection().await?;
            let _: () = redis::cmd("FLUSHDB").query_async(&mut conn).await?;
            Ok(())
        })
        .await
    }

    async fn entry_count(&self) -> Result<usize> {
        self.bounded("entry_count", async {
            let mut conn = self.connection().await?;
            let n: usize = redis::cmd("DBSIZE").query_async(&mut conn).await?;
            Ok(n)
        })
        .await
    }

    async fn ping(&self) -> Result<()> {
        self.bounded("ping", async {
            let mut conn = self.connection().await?;
            let _: String = redis::cmd("PING").query_async(&mut conn).await?;
            Ok(())
        })
        .await
    }

    fn kind(&self) -> StoreKind {
        StoreKind::Redis
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreachable_server_fails_fast() {
        let config = RedisConfig {
            enabled: true,
            url: "redis://127.0.0.1:1".to_string(),
            pool_size: 2,
            timeout_ms: 300,
        };
        let store = RedisStore::from_config(&config).expect("pool creation is lazy");

        let started = std::time::Instant::now();
        let err = store.ping().await.expect_err("nothing listens on port 1");
        assert!(err.is_transient());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn psetex_millis_stays_in_redis_range() {
        assert_eq!(psetex_millis(Duration::ZERO), 1);
        assert_eq!(psetex_millis(Duration::from_secs(60)), 60_000);
        assert_eq!(psetex_millis(Duration::from_secs(u64::MAX)), i64::MAX as u64);
        assert_eq!(
            psetex_millis(Duration::from_millis(u64::MAX)),
            i64::MAX as u64
        );
    }

    #[test]
    fn malformed_url_is_a_pool_error() {
        let config = RedisConfig {
            enabled: true,
            url: "not a url".to_string(),
            pool_size: 2,
            timeout_ms: 300,
        };
        let err = RedisStore::from_config(&config).expect_err("invalid url");
        assert!(matches!(err, CacheError::Pool(_)));
    }

    #[test]
    fn empty_pool_is_a_configuration_error() {
        let config = RedisConfig {
            pool_size: 0,
            ..RedisConfig::default()
        };
        let err = RedisStore::from_config(&config).expect_err("pool size 0");
        assert!(matches!(err, CacheError::Configuration(_)));
        assert!(!err.is_transient());
    }
}
