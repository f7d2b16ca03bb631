//! Adaptive TTL heuristic used by `smart_set`.
//!
//! Small payloads are cheap to keep, large ones are cheap to drop, and
//! high-priority layers live a little longer. There is no feedback from
//! observed hit rates.

use std::time::Duration;

use crate::layer::{CacheLayer, LayerPriority};

/// Payloads below this serialized size get a longer TTL.
pub const SMALL_PAYLOAD_BYTES: usize = 1024;

/// Payloads above this serialized size get a shorter TTL.
pub const LARGE_PAYLOAD_BYTES: usize = 10 * 1024;

/// Longest TTL any entry is stored with. Longer requests are shortened to
/// this, which keeps PSETEX arguments inside Redis' signed 64-bit range.
pub const MAX_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

const SMALL_PAYLOAD_FACTOR: f64 = 1.5;
const LARGE_PAYLOAD_FACTOR: f64 = 0.8;
const HIGH_PRIORITY_FACTOR: f64 = 1.2;

/// Compute the TTL for a payload of `serialized_len` bytes in `layer`.
///
/// Whole seconds, never below one second.
pub fn adaptive_ttl(layer: &CacheLayer, serialized_len: usize) -> Duration {
    let mut secs = layer.default_ttl.as_secs_f64();

    if serialized_len < SMALL_PAYLOAD_BYTES {
        secs *= SMALL_PAYLOAD_FACTOR;
    } else if serialized_len > LARGE_PAYLOAD_BYTES {
        secs *= LARGE_PAYLOAD_FACTOR;
    }

    if layer.priority == LayerPriority::High {
        secs *= HIGH_PRIORITY_FACTOR;
    }

    // Round to the millisecond first so 450 * 1.2 lands on 540, not 539.
    let millis = (secs * 1000.0).round() as u64;
    Duration::from_secs((millis / 1000).max(1))
}

/// Cap `ttl` at [`MAX_TTL`].
pub fn clamp_ttl(ttl: Duration) -> Duration {
    ttl.min(MAX_TTL)
}
