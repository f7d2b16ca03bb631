use std::time::Duration;

use thiserror::Error;

/// Errors raised inside the cache layer.
///
/// None of these reach callers of [`CacheService`](crate::CacheService): the
/// service logs them and degrades to a miss or a no-op. They are public so
/// leaf stores can be used directly and so tests can assert on them.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Redis pool error: {0}")]
    Pool(String),

    #[error("Cache operation '{op}' timed out after {after_ms}ms")]
    Timeout { op: &'static str, after_ms: u64 },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid key pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl CacheError {
    /// Create a new Pool error
    pub fn pool(message: impl std::fmt::Display) -> Self {
        Self::Pool(message.to_string())
    }

    /// Create a new Timeout error
    pub fn timeout(op: &'static str, after: Duration) -> Self {
        Self::Timeout {
            op,
            after_ms: after.as_millis() as u64,
        }
    }

    /// Create a new InvalidPattern error
    pub fn invalid_pattern(pattern: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPattern {
            pattern: pattern.into(),
            reason: reason.into(),
        }
    }

    /// Create a new Configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Errors that may succeed on retry (backend hiccups, not bad input).
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Redis(_) | Self::Pool(_) | Self::Timeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;
