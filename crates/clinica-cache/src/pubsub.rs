//! Redis Pub/Sub for cross-instance L1 invalidation.
//!
//! Reads are served from L1 first, so when one instance writes or
//! invalidates a key every other instance must drop its L1 copy.
//!
//! ```text
//! Instance 1: invalidate("clinic:7:conversations:list")
//!   ↓
//! PUBLISH clinica:cache:invalidate "clinic:7:conversations:list"
//!   ↓
//! Instance 2, 3: listener receives the key → removes it from L1
//! ```

use std::time::Duration;

use deadpool_redis::Pool;
use futures_util::stream::{BoxStream, Stream, StreamExt};
use redis::AsyncCommands;

use crate::error::{CacheError, Result};
use crate::pattern::KeyPattern;
use crate::store::MemoryStore;

/// Channel carrying single keys.
pub const KEY_CHANNEL: &str = "clinica:cache:invalidate";

/// Channel carrying glob patterns.
pub const PATTERN_CHANNEL: &str = "clinica:cache:invalidate-pattern";

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(300);

/// Publishes invalidations to peer instances.
#[derive(Clone)]
pub struct InvalidationPublisher {
    pool: Pool,
}

impl InvalidationPublisher {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub async fn publish_key(&self, key: &str) -> Result<()> {
        self.publish(KEY_CHANNEL, key).await
    }

    pub async fn publish_pattern(&self, pattern: &str) -> Result<()> {
        self.publish(PATTERN_CHANNEL, pattern).await
    }

    async fn publish(&self, channel: &'static str, payload: &str) -> Result<()> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| CacheError::pool(format!("failed to get Redis connection: {e}")))?;
        conn.publish::<_, _, ()>(channel, payload).await?;
        tracing::debug!(channel, payload, "published cache invalidation");
        Ok(())
    }
}

/// What a received message asks the local instance to drop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invalidation {
    Key(String),
    Pattern(String),
}

impl Invalidation {
    pub fn from_message(channel: &str, payload: String) -> Option<Self> {
        match channel {
            KEY_CHANNEL => Some(Self::Key(payload)),
            PATTERN_CHANNEL => Some(Self::Pattern(payload)),
            _ => None,
        }
    }

    /// Apply to the local store. Returns the number of entries removed.
    pub fn apply(&self, local: &MemoryStore) -> usize {
        match self {
            Self::Key(key) => usize::from(local.remove(key)),
            Self::Pattern(glob) => match KeyPattern::compile(glob) {
                Ok(pattern) => local.remove_matching(&pattern),
                Err(e) => {
                    tracing::warn!(error = %e, "ignoring malformed invalidation pattern");
                    0
                }
            },
        }
    }
}

/// Backoff and resync bookkeeping across subscription attempts.
#[derive(Debug)]
struct ReconnectState {
    backoff: Duration,
    subscribed_before: bool,
}

impl ReconnectState {
    fn new() -> Self {
        Self {
            backoff: INITIAL_BACKOFF,
            subscribed_before: false,
        }
    }

    /// Record a successful subscription. Returns `true` on a re-subscribe,
    /// when messages published while disconnected may have been missed.
    fn subscribed(&mut self) -> bool {
        self.backoff = INITIAL_BACKOFF;
        std::mem::replace(&mut self.subscribed_before, true)
    }

    /// Record a failed or dropped subscription and return the delay before
    /// the next attempt.
    fn failed(&mut self) -> Duration {
        let delay = self.backoff;
        self.backoff = (self.backoff * 2).min(MAX_BACKOFF);
        delay
    }
}

/// Subscribes to both invalidation channels and drops matching L1 entries.
pub struct CacheInvalidationListener {
    pub redis_url: String,
    pub local_cache: MemoryStore,
}

impl CacheInvalidationListener {
    /// Spawn the listener task.
    ///
    /// The task reconnects with exponential backoff (1s doubling to 5 min)
    /// whenever the subscription drops. The backoff resets once a
    /// subscription succeeds, and every re-subscribe empties L1 because
    /// missed messages cannot be replayed.
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut state = ReconnectState::new();

            loop {
                let error = match self.subscribe().await {
                    Ok(messages) => self.session(&mut state, messages).await,
                    Err(e) => e,
                };
                let delay = state.failed();
                tracing::error!(
                    error = %error,
                    backoff_secs = delay.as_secs(),
                    "Cache invalidation listener error, reconnecting..."
                );
                tokio::time::sleep(delay).await;
            }
        })
    }

    async fn subscribe(&self) -> Result<BoxStream<'static, Invalidation>> {
        let client = redis::Client::open(self.redis_url.as_str())?;
        let mut pubsub = client.get_async_pubsub().await?;

        pubsub.subscribe(KEY_CHANNEL).await?;
        pubsub.subscribe(PATTERN_CHANNEL).await?;
        tracing::info!(
            channels = ?[KEY_CHANNEL, PATTERN_CHANNEL],
            "Subscribed to cache invalidation channels"
        );

        let messages = pubsub.into_on_message().filter_map(|msg| async move {
            match msg.get_payload::<String>() {
                Ok(payload) => Invalidation::from_message(msg.get_channel_name(), payload),
                Err(e) => {
                    tracing::warn!(error = %e, "failed to parse invalidation message payload");
                    None
                }
            }
        });
        Ok(messages.boxed())
    }

    /// Consume one subscription until it ends. Always yields the error that
    /// ended it.
    async fn session<S>(&self, state: &mut ReconnectState, mut messages: S) -> CacheError
    where
        S: Stream<Item = Invalidation> + Unpin,
    {
        if state.subscribed() {
            let dropped = self.local_cache.entry_count();
            self.local_cache.clear();
            tracing::warn!(dropped, "re-subscribed to invalidations, cleared L1");
        }

        while let Some(invalidation) = messages.next().await {
            let removed = invalidation.apply(&self.local_cache);
            tracing::debug!(?invalidation, removed, "received cache invalidation");
        }

        CacheError::pool("pub/sub connection closed")
    }
}
