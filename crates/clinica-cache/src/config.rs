use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Environment variable whose presence turns Redis on.
pub const REDIS_URL_ENV: &str = "REDIS_URL";

/// Redis configuration (L2 tier)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RedisConfig {
    /// Enable Redis (gracefully degrades without it)
    /// Default: false, memory-only
    #[serde(default = "default_redis_enabled")]
    pub enabled: bool,

    /// Redis connection URL (e.g., "redis://localhost:6379")
    #[serde(default = "default_redis_url")]
    pub url: String,

    /// Connection pool size
    #[serde(default = "default_redis_pool_size")]
    pub pool_size: usize,

    /// Timeout in milliseconds for pool checkout and for every command
    #[serde(default = "default_redis_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_redis_enabled() -> bool {
    false
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_redis_pool_size() -> usize {
    10
}

fn default_redis_timeout_ms() -> u64 {
    2000
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            enabled: default_redis_enabled(),
            url: default_redis_url(),
            pool_size: default_redis_pool_size(),
            timeout_ms: default_redis_timeout_ms(),
        }
    }
}

impl RedisConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Apply the `REDIS_URL` convention: a non-empty value sets the URL and
    /// enables Redis.
    pub fn with_url_override(mut self, redis_url: Option<&str>) -> Self {
        if let Some(url) = redis_url.map(str::trim).filter(|u| !u.is_empty()) {
            self.url = url.to_string();
            self.enabled = true;
        }
        self
    }

    /// [`with_url_override`](Self::with_url_override) fed from the process environment.
    pub fn with_env_override(self) -> Self {
        let url = std::env::var(REDIS_URL_ENV).ok();
        self.with_url_override(url.as_deref())
    }
}

/// Cache tier settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheSettings {
    /// Local (L1) cache max entries
    #[serde(default = "default_memory_max_entries")]
    pub memory_max_entries: u64,

    /// TTL for writes that name neither a TTL nor a category
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,
}

fn default_memory_max_entries() -> u64 {
    10_000
}

fn default_ttl_secs() -> u64 {
    300
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            memory_max_entries: default_memory_max_entries(),
            default_ttl_secs: default_ttl_secs(),
        }
    }
}

impl CacheSettings {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }
}
