//! Hit/miss accounting and the performance report.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;

use crate::metrics;

/// Hit rate (percent) below which the report suggests tuning.
pub const HIT_RATE_TARGET_PERCENT: f64 = 75.0;

/// Average `get` latency (ms) above which the report flags the backend.
pub const RESPONSE_TIME_BUDGET_MS: f64 = 200.0;

/// Category label used when a caller passes none.
pub const UNCATEGORIZED: &str = "uncategorized";

/// Which tier served a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Memory,
    Remote,
}

impl Tier {
    pub fn label(self) -> &'static str {
        match self {
            Tier::Memory => "L1",
            Tier::Remote => "L2",
        }
    }
}

#[derive(Debug, Default)]
struct CategoryCounters {
    hits: AtomicU64,
    misses: AtomicU64,
}

/// Service-wide counters.
#[derive(Debug, Default)]
pub struct CacheStatistics {
    l1_hits: AtomicU64,
    l2_hits: AtomicU64,
    misses: AtomicU64,
    errors: AtomicU64,
    sets: AtomicU64,
    invalidations: AtomicU64,
    get_count: AtomicU64,
    get_micros: AtomicU64,
    categories: DashMap<&'static str, CategoryCounters>,
}

impl CacheStatistics {
    pub fn record_hit(&self, tier: Tier, category: &'static str) {
        match tier {
            Tier::Memory => self.l1_hits.fetch_add(1, Ordering::Relaxed),
            Tier::Remote => self.l2_hits.fetch_add(1, Ordering::Relaxed),
        };
        self.categories
            .entry(category)
            .or_default()
            .hits
            .fetch_add(1, Ordering::Relaxed);
        metrics::record_cache_hit(tier.label(), category);
    }

    pub fn record_miss(&self, category: &'static str) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        self.categories
            .entry(category)
            .or_default()
            .misses
            .fetch_add(1, Ordering::Relaxed);
        metrics::record_cache_miss(category);
    }

    pub fn record_error(&self, op: &'static str) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        metrics::record_cache_error(op);
    }

    pub fn record_set(&self, category: &'static str) {
        self.sets.fetch_add(1, Ordering::Relaxed);
        metrics::record_cache_set(category);
    }

    pub fn record_invalidation(&self, kind: &'static str, removed: usize) {
        self.invalidations
            .fetch_add(removed as u64, Ordering::Relaxed);
        metrics::record_cache_invalidation(kind, removed);
    }

    pub fn record_get_latency(&self, elapsed: Duration) {
        self.get_count.fetch_add(1, Ordering::Relaxed);
        self.get_micros
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
        metrics::record_get_duration(elapsed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let l1_hits = self.l1_hits.load(Ordering::Relaxed);
        let l2_hits = self.l2_hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let get_count = self.get_count.load(Ordering::Relaxed);
        let get_micros = self.get_micros.load(Ordering::Relaxed);

        let mut categories: Vec<CategorySnapshot> = self
            .categories
            .iter()
            .map(|entry| {
                let hits = entry.hits.load(Ordering::Relaxed);
                let misses = entry.misses.load(Ordering::Relaxed);
                CategorySnapshot {
                    category: *entry.key(),
                    hits,
                    misses,
                    hit_rate: percent(hits, hits + misses),
                }
            })
            .collect();
        categories.sort_by(|a, b| a.category.cmp(b.category));

        StatsSnapshot {
            l1_hits,
            l2_hits,
            misses,
            errors: self.errors.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            total_requests: l1_hits + l2_hits + misses,
            hit_rate: percent(l1_hits + l2_hits, l1_hits + l2_hits + misses),
            avg_response_ms: if get_count == 0 {
                0.0
            } else {
                get_micros as f64 / get_count as f64 / 1000.0
            },
            categories,
        }
    }
}

fn percent(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

/// Point-in-time counters.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub l1_hits: u64,
    pub l2_hits: u64,
    pub misses: u64,
    pub errors: u64,
    pub sets: u64,
    pub invalidations: u64,
    pub total_requests: u64,
    /// Percent, 0..=100.
    pub hit_rate: f64,
    pub avg_response_ms: f64,
    pub categories: Vec<CategorySnapshot>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategorySnapshot {
    pub category: &'static str,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
}

/// Output of `CacheService::performance_metrics`.
///
/// Recommendations are informational strings; nothing acts on them.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceReport {
    pub mode: &'static str,
    pub memory_entries: u64,
    pub memory_evictions: u64,
    #[serde(flatten)]
    pub stats: StatsSnapshot,
    pub recommendations: Vec<String>,
}

impl PerformanceReport {
    pub fn new(
        mode: &'static str,
        redis_configured: bool,
        memory_entries: u64,
        memory_evictions: u64,
        stats: StatsSnapshot,
    ) -> Self {
        let recommendations = recommendations(&stats, mode, redis_configured);
        Self {
            mode,
            memory_entries,
            memory_evictions,
            stats,
            recommendations,
        }
    }
}

fn recommendations(stats: &StatsSnapshot, mode: &str, redis_configured: bool) -> Vec<String> {
    let mut out = Vec::new();

    if stats.total_requests > 0 && stats.hit_rate < HIT_RATE_TARGET_PERCENT {
        out.push(format!(
            "Hit rate {:.1}% is below {HIT_RATE_TARGET_PERCENT}%: raise TTLs for hot categories or warm the cache after deploys",
            stats.hit_rate
        ));
    }

    if stats.avg_response_ms > RESPONSE_TIME_BUDGET_MS {
        out.push(format!(
            "Average cache response {:.1}ms exceeds {RESPONSE_TIME_BUDGET_MS}ms: check Redis latency and network path",
            stats.avg_response_ms
        ));
    }

    if redis_configured && mode == "memory" {
        out.push(
            "Redis is configured but unreachable since startup: running memory-only until restart"
                .to_string(),
        );
    }

    if stats.errors > 0 {
        out.push(format!(
            "{} cache backend errors were absorbed: inspect warn-level logs",
            stats.errors
        ));
    }

    out
}
