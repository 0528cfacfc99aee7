//! Observability: structured logging via `tracing` (initialized in `main`)
//! and Prometheus metrics.

pub mod metrics;
