//! Tenant-scoped two-tier cache for the Clinica messaging platform.
//!
//! A bounded in-process store (L1) sits in front of an optional shared
//! Redis store (L2). [`CacheService`] routes reads and writes across both,
//! picks TTLs per resource category, and reports hit rates. Cache failures
//! never reach callers; the primary database remains the source of truth.

pub mod config;
pub mod domain;
pub mod error;
pub mod key;
pub mod layer;
pub mod metrics;
pub mod pattern;
pub mod pubsub;
pub mod service;
pub mod stats;
pub mod store;
pub mod ttl;

pub use config::{CacheSettings, RedisConfig};
pub use error::{CacheError, Result};
pub use key::{CacheKey, clinic_scope, conversation_scope, escape_glob};
pub use layer::{CacheLayer, CacheStrategy, LayerPriority, ResourceCategory};
pub use pattern::KeyPattern;
pub use service::{CacheMode, CacheService, HealthReport, SetOptions};
pub use stats::{PerformanceReport, StatsSnapshot};
pub use store::{CacheEntry, CacheStore, MemoryStore, RedisStore, StoreKind, StoredValue};
pub use ttl::{MAX_TTL, adaptive_ttl, clamp_ttl};
