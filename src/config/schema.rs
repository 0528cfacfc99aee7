//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from TOML config files.
//! Every section carries defaults so a minimal config is valid.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the load balancer.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct Config {
    /// Listener settings (port, request timeout).
    pub server: ServerConfig,

    /// Upstream backend definitions.
    pub backends: Vec<BackendConfig>,

    /// Load balancing strategy and health checking.
    pub load_balancing: LoadBalancingConfig,

    /// Admission rate limiter.
    pub rate_limiter: RateLimiterConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Port to listen on.
    pub port: u16,

    /// Total request timeout in seconds, applied to every inbound request.
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            request_timeout_secs: 30,
        }
    }
}

/// A single upstream backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendConfig {
    /// Backend URL (scheme, host, port, optional path prefix).
    pub url: String,

    /// Per-backend timeout in seconds. Bounds forwarded requests and also
    /// sizes this backend's drain period when it is removed from the pool.
    #[serde(default = "default_backend_timeout_secs")]
    pub timeout_secs: u64,
}

impl BackendConfig {
    /// Per-backend timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_backend_timeout_secs() -> u64 {
    5
}

/// Load balancing configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoadBalancingConfig {
    /// Strategy name, resolved through the balancer factory.
    pub strategy: String,

    /// Active health check settings.
    pub health_check: HealthCheckConfig,
}

impl Default for LoadBalancingConfig {
    fn default() -> Self {
        Self {
            strategy: "round_robin".to_string(),
            health_check: HealthCheckConfig::default(),
        }
    }
}

/// Health check configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Probe interval in seconds.
    pub interval_secs: u64,

    /// Per-probe timeout in seconds. Must be shorter than the interval.
    pub timeout_secs: u64,

    /// Path probed on every backend.
    pub path: String,

    /// Consecutive failures before a backend is marked dead.
    pub unhealthy_threshold: u8,

    /// Consecutive successes before a backend is marked alive.
    pub healthy_threshold: u8,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            interval_secs: 10,
            timeout_secs: 5,
            path: "/health".to_string(),
            unhealthy_threshold: 3,
            healthy_threshold: 2,
        }
    }
}

/// Admission rate limiter configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimiterConfig {
    /// Enable the token bucket limiter.
    pub enabled: bool,

    /// Refill rate in tokens per second. Must be positive when enabled.
    pub rate: f64,

    /// Bucket capacity (burst size).
    pub capacity: u32,

    /// Maximum number of tracked client keys before the least recently
    /// refilled bucket is evicted.
    pub max_clients: usize,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            rate: 1.0,
            capacity: 10,
            max_clients: 10_000,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
