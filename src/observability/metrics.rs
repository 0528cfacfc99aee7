//! Metrics collection and exposition.
//!
//! # Metrics
//! - `rudder_requests_total` (counter): requests by method, status, backend
//! - `rudder_request_duration_seconds` (histogram): end-to-end latency
//! - `rudder_backend_alive` (gauge): 1 = alive, 0 = dead, per backend
//! - `rudder_rate_limited_total` (counter): admission denials

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter on its own listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint started"),
        Err(e) => tracing::error!(error = %e, "Failed to start metrics endpoint"),
    }
}

/// Record one proxied (or synthesized) response.
pub fn record_request(method: &str, status: u16, backend: &str, start: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("status", status.to_string()),
        ("backend", backend.to_string()),
    ];
    metrics::counter!("rudder_requests_total", &labels).increment(1);
    metrics::histogram!("rudder_request_duration_seconds", &labels)
        .record(start.elapsed().as_secs_f64());
}

/// Record a backend's liveness after a probe.
pub fn record_backend_health(backend: &str, alive: bool) {
    metrics::gauge!("rudder_backend_alive", "backend" => backend.to_string())
        .set(if alive { 1.0 } else { 0.0 });
}

/// Record an admission denial.
pub fn record_rate_limited() {
    metrics::counter!("rudder_rate_limited_total").increment(1);
}
