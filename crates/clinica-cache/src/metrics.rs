//! Cache metrics emitted through the `metrics` facade.
//!
//! The library only records; installing an exporter (Prometheus in the
//! server) is up to the embedding binary. Without a recorder these calls
//! are no-ops.

use std::time::Duration;

use metrics::{counter, gauge, histogram};

/// Metric names as constants for consistency.
pub mod names {
    pub const CACHE_HITS_TOTAL: &str = "clinica_cache_hits_total";
    pub const CACHE_MISSES_TOTAL: &str = "clinica_cache_misses_total";
    pub const CACHE_ERRORS_TOTAL: &str = "clinica_cache_errors_total";
    pub const CACHE_SETS_TOTAL: &str = "clinica_cache_sets_total";
    pub const CACHE_INVALIDATIONS_TOTAL: &str = "clinica_cache_invalidations_total";
    pub const CACHE_GET_DURATION_SECONDS: &str = "clinica_cache_get_duration_seconds";
    pub const CACHE_ENTRIES: &str = "clinica_cache_entries";
}

/// Record a cache hit on `tier` ("L1" or "L2").
pub fn record_cache_hit(tier: &'static str, category: &'static str) {
    counter!(names::CACHE_HITS_TOTAL, "tier" => tier, "category" => category).increment(1);
}

/// Record a cache miss.
pub fn record_cache_miss(category: &'static str) {
    counter!(names::CACHE_MISSES_TOTAL, "category" => category).increment(1);
}

/// Record a swallowed backend error for operation `op`.
pub fn record_cache_error(op: &'static str) {
    counter!(names::CACHE_ERRORS_TOTAL, "op" => op).increment(1);
}

pub fn record_cache_set(category: &'static str) {
    counter!(names::CACHE_SETS_TOTAL, "category" => category).increment(1);
}

pub fn record_cache_invalidation(kind: &'static str, removed: usize) {
    counter!(names::CACHE_INVALIDATIONS_TOTAL, "kind" => kind).increment(removed as u64);
}

pub fn record_get_duration(duration: Duration) {
    histogram!(names::CACHE_GET_DURATION_SECONDS).record(duration.as_secs_f64());
}

/// Set the number of cache entries.
pub fn set_cache_entries(tier: &'static str, count: u64) {
    gauge!(names::CACHE_ENTRIES, "tier" => tier).set(count as f64);
}
