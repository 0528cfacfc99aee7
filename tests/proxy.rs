//! End-to-end tests for the proxy path: forwarding, retry exhaustion, and
//! admission limiting.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rudder::config::schema::{Config, RateLimiterConfig};
use rudder::http::HttpServer;
use rudder::lifecycle::Shutdown;
use rudder::load_balancer::{balancer_for, Backend, BackendPool, Balancer};
use rudder::rate_limit::RateLimiter;
use url::Url;

mod common;

fn live_backend(addr: SocketAddr, timeout: Duration) -> Arc<Backend> {
    let backend = Backend::new(Url::parse(&format!("http://{addr}")).unwrap(), timeout);
    backend.set_alive(true);
    Arc::new(backend)
}

/// Spin up an HttpServer around the given pool; returns its address.
async fn start_proxy(
    pool: Arc<BackendPool>,
    limiter: Option<Arc<RateLimiter>>,
    shutdown: &Shutdown,
) -> SocketAddr {
    let balancer: Arc<dyn Balancer> = Arc::from(balancer_for("round_robin").unwrap());
    let server = HttpServer::new(&Config::default(), pool, balancer, limiter);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let rx = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, rx).await;
    });
    addr
}

fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

#[tokio::test]
async fn forwards_request_to_live_backend() {
    let backend_addr = common::start_mock_backend("hello from upstream").await;

    let pool = Arc::new(BackendPool::new());
    pool.add(vec![live_backend(backend_addr, Duration::from_secs(2))]);

    let shutdown = Shutdown::new();
    let proxy_addr = start_proxy(pool, None, &shutdown).await;

    let res = client()
        .get(format!("http://{proxy_addr}/some/path"))
        .send()
        .await
        .expect("proxy unreachable");

    assert_eq!(res.status(), 200);
    assert_eq!(res.text().await.unwrap(), "hello from upstream");
    shutdown.trigger();
}

#[tokio::test]
async fn large_upload_streams_through_without_rejection() {
    let backend_addr = common::start_draining_backend().await;

    let pool = Arc::new(BackendPool::new());
    pool.add(vec![live_backend(backend_addr, Duration::from_secs(10))]);

    let shutdown = Shutdown::new();
    let proxy_addr = start_proxy(pool, None, &shutdown).await;

    // 3 MiB, past the replay buffer cap; must still reach the backend whole
    let payload = vec![0x61u8; 3 * 1024 * 1024];
    let expected = payload.len().to_string();

    let res = client()
        .post(format!("http://{proxy_addr}/upload"))
        .body(payload)
        .send()
        .await
        .expect("proxy unreachable");

    assert_eq!(res.status(), 200);
    assert_eq!(res.text().await.unwrap(), expected);
    shutdown.trigger();
}

#[tokio::test]
async fn exhausted_retries_return_single_503() {
    // nothing listens on these ports: every contact is a transport failure
    let pool = Arc::new(BackendPool::new());
    pool.add(vec![
        live_backend("127.0.0.1:59801".parse().unwrap(), Duration::from_secs(1)),
        live_backend("127.0.0.1:59802".parse().unwrap(), Duration::from_secs(1)),
    ]);

    let shutdown = Shutdown::new();
    let proxy_addr = start_proxy(pool.clone(), None, &shutdown).await;

    let start = Instant::now();
    let res = client()
        .get(format!("http://{proxy_addr}/"))
        .send()
        .await
        .expect("proxy unreachable");

    assert_eq!(res.status(), 503);
    assert_eq!(res.text().await.unwrap(), "Service not available");
    // 4 refused connections plus three 10ms backoffs, nowhere near the
    // per-backend timeouts
    assert!(start.elapsed() < Duration::from_secs(2));

    // passive signal: 4 contacts spread over 2 backends moved both failure
    // counters without flipping them dead (threshold is 3)
    assert!(pool.snapshot().iter().all(|b| b.is_alive()));
    shutdown.trigger();
}

#[tokio::test]
async fn all_dead_pool_fails_closed() {
    let pool = Arc::new(BackendPool::new());
    let backend = live_backend("127.0.0.1:59803".parse().unwrap(), Duration::from_secs(1));
    backend.set_alive(false);
    pool.add(vec![backend]);

    let shutdown = Shutdown::new();
    let proxy_addr = start_proxy(pool, None, &shutdown).await;

    let res = client()
        .get(format!("http://{proxy_addr}/"))
        .send()
        .await
        .expect("proxy unreachable");

    assert_eq!(res.status(), 503);
    shutdown.trigger();
}

#[tokio::test]
async fn limiter_denies_before_routing() {
    let backend_addr = common::start_mock_backend("ok").await;

    let pool = Arc::new(BackendPool::new());
    pool.add(vec![live_backend(backend_addr, Duration::from_secs(2))]);

    let limiter = Arc::new(RateLimiter::new(&RateLimiterConfig {
        enabled: true,
        rate: 0.001,
        capacity: 2,
        max_clients: 100,
    }));

    let shutdown = Shutdown::new();
    let proxy_addr = start_proxy(pool, Some(limiter), &shutdown).await;
    let client = client();
    let url = format!("http://{proxy_addr}/");

    for _ in 0..2 {
        let res = client
            .get(&url)
            .header("x-api-key", "tenant-1")
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 200);
    }

    let res = client
        .get(&url)
        .header("x-api-key", "tenant-1")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 429);

    // a different client key is unaffected
    let res = client
        .get(&url)
        .header("x-api-key", "tenant-2")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    shutdown.trigger();
}
