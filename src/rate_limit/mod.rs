//! Admission rate limiting.
//!
//! # Data Flow
//! ```text
//! Request → rate_limit_middleware
//!     → client key from the x-api-key header ("" when absent)
//!     → RateLimiter::check_and_consume
//!         admitted → proxy handler
//!         denied   → 429, never reaches selection
//! ```
//!
//! # Design Decisions
//! - One lock guards the bucket map's structure; each bucket's token
//!   arithmetic is guarded by its own mutex, so different client keys
//!   never contend
//! - A brand-new key is pre-admitted: its bucket is created one token
//!   below capacity instead of being re-checked
//! - The key population is capped; past the cap the least recently
//!   refilled bucket is evicted, leaving admit/deny semantics untouched

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::config::schema::RateLimiterConfig;
use crate::observability::metrics;

pub mod bucket;

pub use bucket::TokenBucket;

/// Header carrying the client identifier.
pub const CLIENT_KEY_HEADER: &str = "x-api-key";

/// Per-client token bucket admission limiter.
pub struct RateLimiter {
    buckets: RwLock<HashMap<String, Arc<Mutex<TokenBucket>>>>,
    refill_rate: f64,
    capacity: f64,
    max_clients: usize,
}

impl RateLimiter {
    pub fn new(config: &RateLimiterConfig) -> Self {
        Self {
            buckets: RwLock::new(HashMap::new()),
            refill_rate: config.rate,
            capacity: f64::from(config.capacity),
            max_clients: config.max_clients,
        }
    }

    /// Admit or deny one request for the given client key.
    ///
    /// The first request from an unseen key is admitted by creating its
    /// bucket with `capacity - 1` tokens; subsequent requests refill and
    /// consume against that bucket.
    pub fn check_and_consume(&self, client_key: &str) -> bool {
        let existing = self
            .buckets
            .read()
            .expect("rate limiter lock poisoned")
            .get(client_key)
            .cloned();

        if let Some(bucket) = existing {
            return bucket
                .lock()
                .expect("token bucket lock poisoned")
                .try_consume(self.refill_rate, self.capacity);
        }

        let mut buckets = self.buckets.write().expect("rate limiter lock poisoned");
        // another request for the same key may have inserted meanwhile
        if let Some(bucket) = buckets.get(client_key).cloned() {
            drop(buckets);
            return bucket
                .lock()
                .expect("token bucket lock poisoned")
                .try_consume(self.refill_rate, self.capacity);
        }

        if buckets.len() >= self.max_clients {
            evict_oldest(&mut buckets);
        }

        buckets.insert(
            client_key.to_string(),
            Arc::new(Mutex::new(TokenBucket::new(self.capacity - 1.0))),
        );
        true
    }

    #[cfg(test)]
    fn tracked_clients(&self) -> usize {
        self.buckets.read().unwrap().len()
    }
}

/// Drop the bucket with the oldest refill stamp.
fn evict_oldest(buckets: &mut HashMap<String, Arc<Mutex<TokenBucket>>>) {
    let oldest = buckets
        .iter()
        .min_by_key(|(_, bucket)| bucket.lock().expect("token bucket lock poisoned").last_refill())
        .map(|(key, _)| key.clone());

    if let Some(key) = oldest {
        tracing::debug!(client = %key, "Evicting idle rate limiter bucket");
        buckets.remove(&key);
    }
}

/// Axum middleware gating requests through the limiter.
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let client_key = request
        .headers()
        .get(CLIENT_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if limiter.check_and_consume(client_key) {
        next.run(request).await
    } else {
        tracing::warn!(client = %client_key, "Rate limit exceeded");
        metrics::record_rate_limited();
        (StatusCode::TOO_MANY_REQUESTS, "Rate limit exceeded").into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(rate: f64, capacity: u32, max_clients: usize) -> RateLimiter {
        RateLimiter::new(&RateLimiterConfig {
            enabled: true,
            rate,
            capacity,
            max_clients,
        })
    }

    #[test]
    fn fresh_client_admits_up_to_capacity_then_denies() {
        let limiter = limiter(1.0, 2, 100);
        // capacity 2: first request pre-admitted, second consumes the
        // remaining token, third denied until >= 1s of refill has elapsed
        assert!(limiter.check_and_consume("client-a"));
        assert!(limiter.check_and_consume("client-a"));
        assert!(!limiter.check_and_consume("client-a"));

        std::thread::sleep(std::time::Duration::from_millis(1100));
        assert!(limiter.check_and_consume("client-a"));
    }

    #[test]
    fn clients_have_independent_buckets() {
        let limiter = limiter(0.001, 1, 100);
        assert!(limiter.check_and_consume("client-a"));
        assert!(!limiter.check_and_consume("client-a"));
        assert!(limiter.check_and_consume("client-b"));
    }

    #[test]
    fn missing_key_shares_one_bucket() {
        let limiter = limiter(0.001, 2, 100);
        assert!(limiter.check_and_consume(""));
        assert!(limiter.check_and_consume(""));
        assert!(!limiter.check_and_consume(""));
        assert_eq!(limiter.tracked_clients(), 1);
    }

    #[test]
    fn key_population_is_bounded() {
        let limiter = limiter(1.0, 2, 2);
        assert!(limiter.check_and_consume("client-a"));
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(limiter.check_and_consume("client-b"));
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(limiter.check_and_consume("client-c"));

        assert_eq!(limiter.tracked_clients(), 2);
        // client-a had the oldest refill stamp and was evicted
        assert!(!limiter.buckets.read().unwrap().contains_key("client-a"));
    }
}
