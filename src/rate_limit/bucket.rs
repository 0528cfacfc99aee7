//! Token bucket primitive.

use std::time::Instant;

/// A single client's token bucket.
///
/// The token level is recomputed lazily on each access from the elapsed
/// time, so no background refill task is needed.
#[derive(Debug)]
pub struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// Create a bucket with an initial token level.
    pub fn new(tokens: f64) -> Self {
        Self {
            tokens,
            last_refill: Instant::now(),
        }
    }

    /// Refill from elapsed time, then try to consume one token.
    ///
    /// The level is clamped to `capacity`; admission requires a full token
    /// (`>= 1.0`) and deducts exactly 1.0.
    pub fn try_consume(&mut self, refill_rate: f64, capacity: f64) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();

        self.tokens = (self.tokens + elapsed * refill_rate).min(capacity);
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Timestamp of the last refill, used for least-recently-used eviction.
    pub fn last_refill(&self) -> Instant {
        self.last_refill
    }
}
