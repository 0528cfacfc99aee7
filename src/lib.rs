//! Rudder: a dynamic HTTP load balancer.
//!
//! Routes inbound traffic across a runtime-mutable set of upstream
//! backends, keeping traffic away from unhealthy or draining backends.
//!
//! # Architecture Overview
//!
//! ```text
//! Client → http::server (axum, timeout/trace layers)
//!            → rate_limit (optional token bucket gate, 429)
//!            → http::proxy (retry loop, 503 on exhaustion)
//!                → load_balancer (pool snapshot + strategy select)
//!                    → Backend
//!
//! Background tasks (only ever call the pool/backend mutation API):
//!   health::HealthChecker      periodic concurrent probes
//!   config::ReloadCoordinator  file watch → debounce → diff → add/remove
//! ```

// Core subsystems
pub mod config;
pub mod http;

// Traffic management
pub mod health;
pub mod load_balancer;
pub mod rate_limit;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::{load_config, Config};
pub use health::HealthChecker;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use load_balancer::{balancer_for, Backend, BackendPool, Balancer};
pub use rate_limit::RateLimiter;
