//! Process-local L1 store.
//!
//! Bounded by entry count; moka evicts beyond the bound. Each entry carries
//! its own TTL, and an expired entry is never returned.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::Expiry;
use moka::notification::RemovalCause;
use moka::sync::Cache;

use super::{CacheEntry, CacheStore, StoreKind, StoredValue};
use crate::error::Result;
use crate::pattern::KeyPattern;

/// Default bound on the number of L1 entries.
pub const DEFAULT_MAX_ENTRIES: u64 = 10_000;

/// Per-entry expiry: the TTL given at write time, restarted on overwrite.
struct EntryExpiry;

impl Expiry<String, CacheEntry> for EntryExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CacheEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &CacheEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// In-memory cache leaf.
///
/// Clones share the same underlying map.
#[derive(Clone)]
pub struct MemoryStore {
    entries: Cache<String, CacheEntry>,
    max_entries: u64,
    evictions: Arc<AtomicU64>,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("max_entries", &self.max_entries)
            .field("entries", &self.entries.entry_count())
            .field("evictions", &self.evictions.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES)
    }
}

impl MemoryStore {
    /// Create a store holding at most `max_entries` entries.
    pub fn new(max_entries: u64) -> Self {
        let evictions = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&evictions);

        let entries = Cache::builder()
            .max_capacity(max_entries)
            .expire_after(EntryExpiry)
            .eviction_listener(move |_key, _value, cause| {
                if cause == RemovalCause::Size {
                    counter.fetch_add(1, Ordering::Relaxed);
                }
            })
            .build();

        Self {
            entries,
            max_entries,
            evictions,
        }
    }

    /// Fetch a live entry, dropping it if it has expired.
    pub fn get_entry(&self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.get(key)?;
        if entry.is_expired() {
            self.entries.invalidate(key);
            return None;
        }
        Some(entry)
    }

    /// Insert or overwrite. A zero TTL removes the key instead.
    pub fn insert(&self, key: &str, data: Arc<Vec<u8>>, ttl: Duration) {
        if ttl.is_zero() {
            self.entries.invalidate(key);
            return;
        }
        self.entries
            .insert(key.to_string(), CacheEntry::new(data, ttl));
    }

    /// Remove `key`. Returns whether a live entry was removed.
    pub fn remove(&self, key: &str) -> bool {
        self.entries
            .remove(key)
            .is_some_and(|entry| !entry.is_expired())
    }

    /// Remove every live key matched by `pattern` (linear scan).
    pub fn remove_matching(&self, pattern: &KeyPattern) -> usize {
        let matched: Vec<Arc<String>> = self
            .entries
            .iter()
            .filter(|(key, entry)| !entry.is_expired() && pattern.matches(key))
            .map(|(key, _)| key)
            .collect();

        matched
            .iter()
            .filter(|key| self.remove(key.as_str()))
            .count()
    }

    pub fn clear(&self) {
        self.entries.invalidate_all();
        self.entries.run_pending_tasks();
    }

    /// Current number of entries, after flushing moka's pending maintenance.
    pub fn entry_count(&self) -> u64 {
        self.entries.run_pending_tasks();
        self.entries.entry_count()
    }

    pub fn max_entries(&self) -> u64 {
        self.max_entries
    }

    /// Entries dropped to stay under the capacity bound.
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<StoredValue>> {
        Ok(self.get_entry(key).map(|entry| StoredValue {
            remaining_ttl: Some(entry.remaining_ttl()),
            data: entry.data,
        }))
    }

    async fn set(&self, key: &str, data: Arc<Vec<u8>>, ttl: Duration) -> Result<()> {
        self.insert(key, data, ttl);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.remove(key))
    }

    async fn delete_pattern(&self, pattern: &KeyPattern) -> Result<usize> {
        Ok(self.remove_matching(pattern))
    }

    async fn clear(&self) -> Result<()> {
        MemoryStore::clear(self);
        Ok(())
    }

    async fn entry_count(&self) -> Result<usize> {
        Ok(MemoryStore::entry_count(self) as usize)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    fn kind(&self) -> StoreKind {
        StoreKind::Memory
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes(s: &str) -> Arc<Vec<u8>> {
        Arc::new(s.as_bytes().to_vec())
    }

    #[test]
    fn get_returns_what_was_set() {
        let store = MemoryStore::new(100);
        store.insert("contact:1:metadata", bytes("alice"), Duration::from_secs(60));

        let entry = store.get_entry("contact:1:metadata").expect("entry");
        assert_eq!(entry.data, bytes("alice"));
        assert!(store.get_entry("contact:2:metadata").is_none());
    }

    #[test]
    fn overwrite_replaces_value_and_ttl() {
        let store = MemoryStore::new(100);
        store.insert("k", bytes("first"), Duration::from_millis(50));
        store.insert("k", bytes("second"), Duration::from_secs(60));

        std::thread::sleep(Duration::from_millis(80));
        let entry = store.get_entry("k").expect("overwritten entry keeps the new ttl");
        assert_eq!(entry.data, bytes("second"));
    }

    #[test]
    fn expired_entries_read_as_absent() {
        let store = MemoryStore::new(100);
        store.insert("short", bytes("v"), Duration::from_millis(50));
        assert!(store.get_entry("short").is_some());

        std::thread::sleep(Duration::from_millis(80));
        assert!(store.get_entry("short").is_none());
        assert!(!store.remove("short"));
    }

    #[test]
    fn zero_ttl_removes_the_key() {
        let store = MemoryStore::new(100);
        store.insert("k", bytes("v"), Duration::from_secs(60));
        store.insert("k", bytes("v2"), Duration::ZERO);
        assert!(store.get_entry("k").is_none());
    }

    #[test]
    fn remove_matching_counts_live_keys_only() {
        let store = MemoryStore::new(100);
        store.insert("conversation:42:detail:page:1:limit:20", bytes("a"), Duration::from_secs(60));
        store.insert("conversation:42:detail:page:2:limit:20", bytes("b"), Duration::from_secs(60));
        store.insert("conversation:42:stale", bytes("c"), Duration::from_millis(30));
        store.insert("conversation:420:detail:page:1:limit:20", bytes("d"), Duration::from_secs(60));
        std::thread::sleep(Duration::from_millis(60));

        let pattern = KeyPattern::compile("conversation:42:*").unwrap();
        assert_eq!(store.remove_matching(&pattern), 2);
        assert!(store.get_entry("conversation:420:detail:page:1:limit:20").is_some());
        assert_eq!(store.remove_matching(&pattern), 0);
    }

    #[test]
    fn capacity_is_bounded() {
        let store = MemoryStore::new(16);
        for i in 0..64 {
            store.insert(&format!("contact:{i}:metadata"), bytes("x"), Duration::from_secs(60));
        }
        assert!(store.entry_count() <= 16);
        assert_eq!(store.max_entries(), 16);
    }

    #[test]
    fn clear_empties_the_store() {
        let store = MemoryStore::new(100);
        store.insert("a", bytes("1"), Duration::from_secs(60));
        store.insert("b", bytes("2"), Duration::from_secs(60));
        store.clear();
        assert!(store.get_entry("a").is_none());
        assert_eq!(store.entry_count(), 0);
    }

    #[tokio::test]
    async fn trait_reports_remaining_ttl() {
        let store = MemoryStore::new(100);
        CacheStore::set(&store, "k", bytes("v"), Duration::from_secs(30))
            .await
            .unwrap();
        let stored = CacheStore::get(&store, "k").await.unwrap().expect("hit");
        let remaining = stored.remaining_ttl.expect("memory entries always expire");
        assert!(remaining <= Duration::from_secs(30));
        assert!(remaining > Duration::from_secs(29));
        assert_eq!(store.kind(), StoreKind::Memory);
    }

    #[test]
    fn trait_delete_pattern_and_count() {
        use tokio_test::block_on;

        let store = MemoryStore::new(100);
        store.insert("clinic:1:conversations:list", bytes("a"), Duration::from_secs(60));
        store.insert("clinic:2:conversations:list", bytes("b"), Duration::from_secs(60));

        let pattern = KeyPattern::compile("clinic:1:*").unwrap();
        assert_eq!(block_on(CacheStore::delete_pattern(&store, &pattern)).unwrap(), 1);
        assert_eq!(block_on(CacheStore::entry_count(&store)).unwrap(), 1);
        assert!(!block_on(CacheStore::delete(&store, "clinic:1:conversations:list")).unwrap());
        assert!(block_on(CacheStore::ping(&store)).is_ok());
    }
}
