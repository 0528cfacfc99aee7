//! Active health checking.
//!
//! # Responsibilities
//! - Periodically probe every backend in the pool
//! - Feed probe outcomes into each backend's threshold counters
//! - Cancel outstanding probes when the checker stops

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tokio::sync::broadcast;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time;

use crate::config::schema::HealthCheckConfig;
use crate::load_balancer::{Backend, BackendPool};
use crate::observability::metrics;

/// Periodic prober for every backend in the pool.
///
/// The checker itself is stateless across ticks; all health state lives in
/// the backends' own counters.
pub struct HealthChecker {
    pool: Arc<BackendPool>,
    config: HealthCheckConfig,
    client: Client<HttpConnector, Body>,
}

impl HealthChecker {
    pub fn new(pool: Arc<BackendPool>, config: HealthCheckConfig) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self {
            pool,
            config,
            client,
        }
    }

    /// Spawn the checker loop. The returned handle completes only after the
    /// loop has exited and every in-flight probe has unwound, so awaiting it
    /// after signalling shutdown is the stop barrier.
    pub fn start(self, shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            interval = self.config.interval_secs,
            path = %self.config.path,
            "Health checker starting"
        );

        let mut ticker = time::interval(Duration::from_secs(self.config.interval_secs));

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.recv() => break,
            }
            if self.sweep(&mut shutdown).await {
                break;
            }
        }

        tracing::info!("Health checker stopped");
    }

    /// Probe every backend in the current snapshot concurrently. Returns
    /// true if shutdown arrived mid-sweep, after aborting and draining the
    /// remaining probe tasks.
    async fn sweep(&self, shutdown: &mut broadcast::Receiver<()>) -> bool {
        let mut probes = JoinSet::new();

        for backend in self.pool.snapshot() {
            probes.spawn(probe(
                self.client.clone(),
                backend,
                self.config.clone(),
            ));
        }

        loop {
            tokio::select! {
                joined = probes.join_next() => {
                    if joined.is_none() {
                        return false;
                    }
                }
                _ = shutdown.recv() => {
                    probes.shutdown().await;
                    return true;
                }
            }
        }
    }
}

/// One bounded-timeout probe against a single backend. Outcomes only ever
/// move the backend's counters; probe errors are never propagated.
async fn probe(client: Client<HttpConnector, Body>, backend: Arc<Backend>, config: HealthCheckConfig) {
    let probe_url = format!(
        "{}{}",
        backend.url.as_str().trim_end_matches('/'),
        config.path
    );

    let request = match Request::builder()
        .method("GET")
        .uri(probe_url.as_str())
        .header("user-agent", "rudder-health-check")
        .body(Body::empty())
    {
        Ok(req) => req,
        Err(e) => {
            tracing::error!(url = %probe_url, error = %e, "Failed to build probe request");
            backend.record_failure(config.unhealthy_threshold);
            return;
        }
    };

    let timeout = Duration::from_secs(config.timeout_secs);
    let healthy = match time::timeout(timeout, client.request(request)).await {
        Ok(Ok(response)) if response.status() == StatusCode::OK => true,
        Ok(Ok(response)) => {
            tracing::warn!(url = %backend.url, status = %response.status(), "Probe failed: non-success status");
            false
        }
        Ok(Err(e)) => {
            tracing::warn!(url = %backend.url, error = %e, "Probe failed: connection error");
            false
        }
        Err(_) => {
            tracing::warn!(url = %backend.url, "Probe failed: timeout");
            false
        }
    };

    if healthy {
        backend.record_success(config.healthy_threshold);
    } else {
        backend.record_failure(config.unhealthy_threshold);
    }

    metrics::record_backend_health(backend.url.as_str(), backend.is_alive());
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;
    use url::Url;

    async fn serve_status(status_line: &'static str) -> std::net::SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let response = format!(
                    "HTTP/1.1 {status_line}\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok"
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });
        addr
    }

    fn checker_config() -> HealthCheckConfig {
        HealthCheckConfig {
            interval_secs: 1,
            timeout_secs: 1,
            path: "/health".into(),
            unhealthy_threshold: 1,
            healthy_threshold: 1,
        }
    }

    async fn sweep_once(pool: Arc<BackendPool>, config: HealthCheckConfig) {
        let checker = HealthChecker::new(pool, config);
        let (_tx, mut rx) = broadcast::channel(1);
        assert!(!checker.sweep(&mut rx).await);
    }

    #[tokio::test]
    async fn successful_probe_marks_backend_alive() {
        let addr = serve_status("200 OK").await;
        let pool = Arc::new(BackendPool::new());
        pool.add(vec![Arc::new(Backend::new(
            Url::parse(&format!("http://{addr}")).unwrap(),
            Duration::from_secs(1),
        ))]);

        sweep_once(pool.clone(), checker_config()).await;
        assert!(pool.snapshot()[0].is_alive());
    }

    #[tokio::test]
    async fn non_success_status_counts_as_failure() {
        let addr = serve_status("503 Service Unavailable").await;
        let pool = Arc::new(BackendPool::new());
        let backend = Arc::new(Backend::new(
            Url::parse(&format!("http://{addr}")).unwrap(),
            Duration::from_secs(1),
        ));
        backend.set_alive(true);
        pool.add(vec![backend.clone()]);

        sweep_once(pool.clone(), checker_config()).await;
        assert!(!backend.is_alive());
    }

    #[tokio::test]
    async fn unreachable_backend_counts_as_failure() {
        let pool = Arc::new(BackendPool::new());
        let backend = Arc::new(Backend::new(
            // reserved port that nothing listens on
            Url::parse("http://127.0.0.1:59991").unwrap(),
            Duration::from_secs(1),
        ));
        backend.set_alive(true);
        pool.add(vec![backend.clone()]);

        sweep_once(pool.clone(), checker_config()).await;
        assert!(!backend.is_alive());
    }

    #[tokio::test]
    async fn stop_waits_for_loop_to_unwind() {
        let pool = Arc::new(BackendPool::new());
        let checker = HealthChecker::new(pool, checker_config());

        let (tx, rx) = broadcast::channel(1);
        let handle = checker.start(rx);
        tx.send(()).unwrap();

        time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("checker did not stop in time")
            .unwrap();
    }
}
