//! Leaf key-value stores.
//!
//! Both leaves implement [`CacheStore`] with the same contract, so the
//! service can treat Redis as an optional second tier in front of which
//! the process-local store sits.

pub mod memory;
pub mod redis;

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;
use crate::pattern::KeyPattern;

pub use memory::MemoryStore;
pub use redis::RedisStore;

/// Which backend a store talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Memory,
    Redis,
}

impl StoreKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StoreKind::Memory => "memory",
            StoreKind::Redis => "redis",
        }
    }
}

/// A cached entry with TTL support.
///
/// The payload is wrapped in `Arc` so hits hand out a reference count
/// instead of copying the bytes.
#[derive(Clone, Debug)]
pub struct CacheEntry {
    pub data: Arc<Vec<u8>>,
    pub inserted_at: Instant,
    pub ttl: Duration,
}

impl CacheEntry {
    pub fn new(data: Arc<Vec<u8>>, ttl: Duration) -> Self {
        Self {
            data,
            inserted_at: Instant::now(),
            ttl,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.inserted_at.elapsed() >= self.ttl
    }

    /// Time left before expiry, zero once expired.
    pub fn remaining_ttl(&self) -> Duration {
        self.ttl.saturating_sub(self.inserted_at.elapsed())
    }
}

/// A value read back from a store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredValue {
    pub data: Arc<Vec<u8>>,
    /// `None` when the backend holds the key without an expiry.
    pub remaining_ttl: Option<Duration>,
}

/// Contract shared by the memory and Redis leaves.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Fetch a live entry. Expired entries read as absent.
    async fn get(&self, key: &str) -> Result<Option<StoredValue>>;

    /// Insert or overwrite `key`, restarting its TTL.
    async fn set(&self, key: &str, data: Arc<Vec<u8>>, ttl: Duration) -> Result<()>;

    /// Remove `key`. Returns whether a live entry was removed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Remove every key matched by `pattern`. Returns how many were removed.
    async fn delete_pattern(&self, pattern: &KeyPattern) -> Result<usize>;

    /// Remove everything.
    async fn clear(&self) -> Result<()>;

    /// Number of stored entries (approximate for some backends).
    async fn entry_count(&self) -> Result<usize>;

    /// Liveness probe.
    async fn ping(&self) -> Result<()>;

    fn kind(&self) -> StoreKind;
}
