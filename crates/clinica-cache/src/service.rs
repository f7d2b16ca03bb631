//! Two-tier cache service.
//!
//! ## Cache Hierarchy
//!
//! ```text
//! get → L1 (moka, per instance) → L2 (Redis, shared) → miss
//!            ↑                         │
//!            └──── backfill with ──────┘
//!                  remaining TTL
//! ```
//!
//! ## Write Strategy
//!
//! - **Memory-only**: write L1.
//! - **Dual**: write L2, drop the L1 copy and tell peers to drop theirs.
//!   L1 is refilled from L2 on the next read. If the L2 write fails the
//!   value goes to L1 so this instance still serves the latest write.
//!
//! ## Failure Semantics
//!
//! Callers never see a cache error. Backend failures are logged, counted,
//! and turned into a miss (reads) or a no-op (writes). Postgres stays the
//! source of truth, so the worst outcome is an extra database read.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::{Serialize, Serializer};
use tokio::task::JoinHandle;

use crate::config::{CacheSettings, RedisConfig};
use crate::error::CacheError;
use crate::layer::ResourceCategory;
use crate::metrics;
use crate::pattern::KeyPattern;
use crate::pubsub::{CacheInvalidationListener, InvalidationPublisher};
use crate::stats::{CacheStatistics, PerformanceReport, StatsSnapshot, Tier, UNCATEGORIZED};
use crate::store::{CacheStore, MemoryStore, RedisStore, StoreKind};
use crate::ttl::{adaptive_ttl, clamp_ttl};

/// Which tiers the service routes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheMode {
    /// L1 only: Redis disabled, or unreachable when the service was built.
    MemoryOnly,
    /// L1 in front of a remote L2.
    Dual,
}

impl CacheMode {
    pub fn as_str(self) -> &'static str {
        match self {
            CacheMode::MemoryOnly => "memory",
            CacheMode::Dual => "dual",
        }
    }
}

impl fmt::Display for CacheMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for CacheMode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Options for [`CacheService::set`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetOptions {
    /// Explicit TTL. Falls back to the category default, then the service default.
    pub ttl: Option<Duration>,
    pub category: Option<ResourceCategory>,
}

impl SetOptions {
    pub fn ttl(ttl: Duration) -> Self {
        Self {
            ttl: Some(ttl),
            category: None,
        }
    }

    pub fn category(category: ResourceCategory) -> Self {
        Self {
            ttl: None,
            category: Some(category),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_category(mut self, category: ResourceCategory) -> Self {
        self.category = Some(category);
        self
    }
}

/// Liveness summary for readiness probes.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub mode: CacheMode,
    pub memory_entries: u64,
    pub memory_capacity: u64,
    pub redis_configured: bool,
    /// `None` in memory-only mode.
    pub remote_reachable: Option<bool>,
    pub remote_kind: Option<StoreKind>,
    /// Key count reported by L2, when it answers.
    pub remote_entries: Option<usize>,
}

struct ServiceInner {
    memory: MemoryStore,
    remote: Option<Arc<dyn CacheStore>>,
    publisher: Option<InvalidationPublisher>,
    listener: Option<JoinHandle<()>>,
    stats: CacheStatistics,
    default_ttl: Duration,
    redis_configured: bool,
}

impl Drop for ServiceInner {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
    }
}

/// The cache surface used by request handlers.
///
/// Cheap to clone; clones share both tiers and the statistics.
#[derive(Clone)]
pub struct CacheService {
    inner: Arc<ServiceInner>,
}

impl fmt::Debug for CacheService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheService")
            .field("mode", &self.mode())
            .field("memory", &self.inner.memory)
            .field("default_ttl", &self.inner.default_ttl)
            .finish()
    }
}

impl CacheService {
    /// L1-only service.
    pub fn memory_only(settings: &CacheSettings) -> Self {
        Self::from_parts(
            MemoryStore::new(settings.memory_max_entries),
            None,
            None,
            None,
            settings.default_ttl(),
            false,
        )
    }

    /// L1 in front of an arbitrary L2 store. No cross-instance invalidation.
    pub fn with_remote(settings: &CacheSettings, remote: Arc<dyn CacheStore>) -> Self {
        Self::from_parts(
            MemoryStore::new(settings.memory_max_entries),
            Some(remote),
            None,
            None,
            settings.default_ttl(),
            true,
        )
    }

    /// Build the service from configuration.
    ///
    /// ## Graceful Degradation
    ///
    /// Redis is probed once. If it is disabled, misconfigured, or unreachable
    /// the service runs memory-only for the rest of the process lifetime;
    /// this never fails.
    pub async fn connect(redis: &RedisConfig, settings: &CacheSettings) -> Self {
        if !redis.enabled {
            tracing::info!("Redis disabled, using memory cache only");
            return Self::memory_only(settings);
        }

        let memory_only = || {
            Self::from_parts(
                MemoryStore::new(settings.memory_max_entries),
                None,
                None,
                None,
                settings.default_ttl(),
                true,
            )
        };

        tracing::info!(url = %redact_url(&redis.url), "Connecting to Redis");

        let store = match RedisStore::from_config(redis) {
            Ok(store) => store,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to create Redis pool. Falling back to memory cache.");
                return memory_only();
            }
        };

        if let Err(e) = store.ping().await {
            tracing::warn!(error = %e, "Failed to connect to Redis. Falling back to memory cache.");
            return memory_only();
        }

        tracing::info!("Connected to Redis");

        let memory = MemoryStore::new(settings.memory_max_entries);
        let publisher = InvalidationPublisher::new(store.pool().clone());
        let listener = CacheInvalidationListener {
            redis_url: redis.url.clone(),
            local_cache: memory.clone(),
        }
        .start();

        Self::from_parts(
            memory,
            Some(Arc::new(store)),
            Some(publisher),
            Some(listener),
            settings.default_ttl(),
            true,
        )
    }

    fn from_parts(
        memory: MemoryStore,
        remote: Option<Arc<dyn CacheStore>>,
        publisher: Option<InvalidationPublisher>,
        listener: Option<JoinHandle<()>>,
        default_ttl: Duration,
        redis_configured: bool,
    ) -> Self {
        Self {
            inner: Arc::new(ServiceInner {
                memory,
                remote,
                publisher,
                listener,
                stats: CacheStatistics::default(),
                default_ttl,
                redis_configured,
            }),
        }
    }

    pub fn mode(&self) -> CacheMode {
        if self.inner.remote.is_some() {
            CacheMode::Dual
        } else {
            CacheMode::MemoryOnly
        }
    }

    /// The L1 store.
    pub fn memory(&self) -> &MemoryStore {
        &self.inner.memory
    }

    // ---- reads ----

    /// Read and decode `key`. `None` on miss, expiry, or any backend error.
    pub async fn get<T: DeserializeOwned>(
        &self,
        key: &str,
        category: Option<ResourceCategory>,
    ) -> Option<T> {
        let bytes = self.get_bytes(key, category).await?;
        match serde_json::from_slice(&bytes).map_err(CacheError::from) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "cached payload does not decode, dropping it");
                self.inner.stats.record_error("decode");
                self.invalidate(key, category).await;
                None
            }
        }
    }

    /// Untyped read.
    pub async fn get_raw(
        &self,
        key: &str,
        category: Option<ResourceCategory>,
    ) -> Option<serde_json::Value> {
        self.get(key, category).await
    }

    /// Read with the category's layer attached for accounting.
    pub async fn smart_get<T: DeserializeOwned>(
        &self,
        key: &str,
        category: ResourceCategory,
    ) -> Option<T> {
        self.get(key, Some(category)).await
    }

    async fn get_bytes(
        &self,
        key: &str,
        category: Option<ResourceCategory>,
    ) -> Option<Arc<Vec<u8>>> {
        let started = Instant::now();
        let found = self.lookup(key, category).await;
        self.inner.stats.record_get_latency(started.elapsed());
        found
    }

    async fn lookup(&self, key: &str, category: Option<ResourceCategory>) -> Option<Arc<Vec<u8>>> {
        let label = category_label(category);

        if let Some(entry) = self.inner.memory.get_entry(key) {
            tracing::debug!(key = %key, "cache hit (L1)");
            self.inner.stats.record_hit(Tier::Memory, label);
            return Some(entry.data);
        }

        let Some(remote) = &self.inner.remote else {
            tracing::debug!(key = %key, "cache miss");
            self.inner.stats.record_miss(label);
            return None;
        };

        match remote.get(key).await {
            Ok(Some(stored)) => {
                let ttl = stored
                    .remaining_ttl
                    .unwrap_or_else(|| self.fallback_ttl(category));
                self.inner
                    .memory
                    .insert(key, Arc::clone(&stored.data), ttl);
                tracing::debug!(key = %key, ttl_ms = ttl.as_millis() as u64, "cache hit (L2), promoted to L1");
                self.inner.stats.record_hit(Tier::Remote, label);
                Some(stored.data)
            }
            Ok(None) => {
                tracing::debug!(key = %key, "cache miss");
                self.inner.stats.record_miss(label);
                None
            }
            Err(e) => {
                tracing::warn!(
                    key = %key,
                    error = %e,
                    transient = e.is_transient(),
                    "L2 get failed, treating as miss"
                );
                self.inner.stats.record_error("get");
                self.inner.stats.record_miss(label);
                None
            }
        }
    }

    // ---- writes ----

    /// Encode and store `value` under `key`.
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, options: SetOptions) {
        let Some(payload) = self.encode(key, value) else {
            return;
        };
        let ttl = options
            .ttl
            .unwrap_or_else(|| self.fallback_ttl(options.category));
        self.write(key, Arc::new(payload), ttl, options.category)
            .await;
    }

    /// Store with a TTL derived from the category layer and payload size.
    pub async fn smart_set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        category: ResourceCategory,
    ) {
        let Some(payload) = self.encode(key, value) else {
            return;
        };
        let ttl = adaptive_ttl(category.layer(), payload.len());
        self.write(key, Arc::new(payload), ttl, Some(category))
            .await;
    }

    fn encode<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Option<Vec<u8>> {
        match serde_json::to_vec(value).map_err(CacheError::from) {
            Ok(payload) => Some(payload),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "value does not serialize, not caching it");
                self.inner.stats.record_error("encode");
                None
            }
        }
    }

    async fn write(
        &self,
        key: &str,
        data: Arc<Vec<u8>>,
        ttl: Duration,
        category: Option<ResourceCategory>,
    ) {
        self.inner.stats.record_set(category_label(category));
        let ttl = clamp_ttl(ttl);

        let Some(remote) = &self.inner.remote else {
            self.inner.memory.insert(key, data, ttl);
            tracing::debug!(key = %key, ttl_secs = ttl.as_secs(), "cache set (L1)");
            return;
        };

        match remote.set(key, Arc::clone(&data), ttl).await {
            Ok(()) => {
                self.inner.memory.remove(key);
                self.publish_key(key).await;
                tracing::debug!(key = %key, ttl_secs = ttl.as_secs(), "cache set (L2)");
            }
            Err(e) => {
                tracing::warn!(
                    key = %key,
                    error = %e,
                    transient = e.is_transient(),
                    "L2 set failed, keeping value in L1 only"
                );
                self.inner.stats.record_error("set");
                self.inner.memory.insert(key, data, ttl);
            }
        }
    }

    /// Cache-aside read: return the cached value or load, cache, and return it.
    ///
    /// Errors from `loader` (the primary store) propagate unchanged; cache
    /// errors never do.
    pub async fn get_or_load<T, E, F, Fut>(
        &self,
        key: &str,
        category: ResourceCategory,
        loader: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(cached) = self.smart_get(key, category).await {
            return Ok(cached);
        }

        let loaded = loader().await?;
        self.smart_set(key, &loaded, category).await;
        Ok(loaded)
    }

    // ---- invalidation ----

    /// Remove `key` from both tiers and from peers' L1.
    pub async fn invalidate(&self, key: &str, category: Option<ResourceCategory>) {
        let mut removed = usize::from(self.inner.memory.remove(key));

        if let Some(remote) = &self.inner.remote {
            match remote.delete(key).await {
                Ok(deleted) => removed += usize::from(deleted),
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "L2 delete failed");
                    self.inner.stats.record_error("invalidate");
                }
            }
            self.publish_key(key).await;
        }

        self.inner.stats.record_invalidation("key", removed);
        tracing::debug!(key = %key, category = category_label(category), removed, "cache invalidated");
    }

    /// Remove every key matched by the glob `pattern` from both tiers.
    ///
    /// Returns the summed count of entries removed from each tier. A
    /// malformed pattern removes nothing and returns 0.
    pub async fn invalidate_pattern(&self, pattern: &str) -> usize {
        let compiled = match KeyPattern::compile(pattern) {
            Ok(compiled) => compiled,
            Err(e) => {
                tracing::warn!(error = %e, "refusing to invalidate with malformed pattern");
                self.inner.stats.record_error("invalidate_pattern");
                return 0;
            }
        };
        self.invalidate_compiled(&compiled).await
    }

    /// [`invalidate_pattern`](Self::invalidate_pattern) with a pre-compiled pattern.
    pub async fn invalidate_compiled(&self, pattern: &KeyPattern) -> usize {
        let mut removed = self.inner.memory.remove_matching(pattern);

        if let Some(remote) = &self.inner.remote {
            match remote.delete_pattern(pattern).await {
                Ok(n) => removed += n,
                Err(e) => {
                    tracing::warn!(pattern = %pattern, error = %e, "L2 pattern delete failed");
                    self.inner.stats.record_error("invalidate_pattern");
                }
            }
            self.publish_pattern(pattern.as_str()).await;
        }

        self.inner.stats.record_invalidation("pattern", removed);
        tracing::debug!(
            pattern = %pattern,
            prefix = %pattern.literal_prefix(),
            removed,
            "cache pattern invalidated"
        );
        removed
    }

    /// Drop everything in both tiers.
    pub async fn clear(&self) {
        self.inner.memory.clear();

        if let Some(remote) = &self.inner.remote {
            if let Err(e) = remote.clear().await {
                tracing::warn!(error = %e, "L2 clear failed");
                self.inner.stats.record_error("clear");
            }
            self.publish_pattern("*").await;
        }

        tracing::info!("cache cleared");
    }

    async fn publish_key(&self, key: &str) {
        if let Some(publisher) = &self.inner.publisher {
            if let Err(e) = publisher.publish_key(key).await {
                tracing::warn!(key = %key, error = %e, "failed to publish cache invalidation");
            }
        }
    }

    async fn publish_pattern(&self, pattern: &str) {
        if let Some(publisher) = &self.inner.publisher {
            if let Err(e) = publisher.publish_pattern(pattern).await {
                tracing::warn!(pattern = %pattern, error = %e, "failed to publish cache invalidation");
            }
        }
    }

    // ---- reporting ----

    pub async fn health(&self) -> HealthReport {
        let (remote_reachable, remote_kind, remote_entries) = match &self.inner.remote {
            Some(remote) => {
                let reachable = remote.ping().await.is_ok();
                let entries = if reachable {
                    remote.entry_count().await.ok()
                } else {
                    None
                };
                (Some(reachable), Some(remote.kind()), entries)
            }
            None => (None, None, None),
        };

        HealthReport {
            mode: self.mode(),
            memory_entries: self.inner.memory.entry_count(),
            memory_capacity: self.inner.memory.max_entries(),
            redis_configured: self.inner.redis_configured,
            remote_reachable,
            remote_kind,
            remote_entries,
        }
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.inner.stats.snapshot()
    }

    /// Hit rate, latency, and tuning hints.
    pub fn performance_metrics(&self) -> PerformanceReport {
        let memory_entries = self.inner.memory.entry_count();
        metrics::set_cache_entries(Tier::Memory.label(), memory_entries);

        PerformanceReport::new(
            self.mode().as_str(),
            self.inner.redis_configured,
            memory_entries,
            self.inner.memory.evictions(),
            self.inner.stats.snapshot(),
        )
    }

    fn fallback_ttl(&self, category: Option<ResourceCategory>) -> Duration {
        category
            .map(|c| c.layer().default_ttl)
            .unwrap_or(self.inner.default_ttl)
    }
}

fn category_label(category: Option<ResourceCategory>) -> &'static str {
    category.map_or(UNCATEGORIZED, ResourceCategory::as_str)
}

/// Hide the password part of a Redis URL for logging.
fn redact_url(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end + 3 => {
            format!("{}***{}", &url[..scheme_end + 3], &url[at..])
        }
        _ => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_credentials() {
        assert_eq!(
            redact_url("redis://:secret@cache:6379/0"),
            "redis://***@cache:6379/0"
        );
        assert_eq!(redact_url("redis://cache:6379"), "redis://cache:6379");
    }

    #[test]
    fn set_options_builders() {
        let opts = SetOptions::category(ResourceCategory::ContactMetadata)
            .with_ttl(Duration::from_secs(5));
        assert_eq!(opts.ttl, Some(Duration::from_secs(5)));
        assert_eq!(opts.category, Some(ResourceCategory::ContactMetadata));
        assert_eq!(SetOptions::default().ttl, None);
    }

    #[tokio::test]
    async fn fallback_ttl_prefers_category() {
        let service = CacheService::memory_only(&CacheSettings::default());
        assert_eq!(
            service.fallback_ttl(Some(ResourceCategory::AttachmentMetadata)),
            Duration::from_secs(3600)
        );
        assert_eq!(service.fallback_ttl(None), Duration::from_secs(300));
        assert_eq!(service.mode(), CacheMode::MemoryOnly);
    }
}
