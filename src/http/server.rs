//! HTTP server setup.
//!
//! # Responsibilities
//! - Build the axum router around the proxy handler
//! - Wire up middleware (tracing, request timeout, admission limiter)
//! - Serve with graceful shutdown: stop accepting, let in-flight finish

use std::sync::Arc;
use std::time::Duration;

use axum::{body::Body, http::StatusCode, middleware, routing::any, Router};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::schema::Config;
use crate::http::proxy::{proxy_handler, AppState};
use crate::load_balancer::{Balancer, BackendPool};
use crate::rate_limit::{rate_limit_middleware, RateLimiter};

/// HTTP front end of the load balancer.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    /// Assemble the router from the already-constructed core components.
    pub fn new(
        config: &Config,
        pool: Arc<BackendPool>,
        balancer: Arc<dyn Balancer>,
        limiter: Option<Arc<RateLimiter>>,
    ) -> Self {
        let client: Client<HttpConnector, Body> =
            Client::builder(TokioExecutor::new()).build(HttpConnector::new());

        let state = AppState {
            pool,
            balancer,
            client,
            unhealthy_threshold: config.load_balancing.health_check.unhealthy_threshold,
        };

        let mut router = Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state);

        // denied requests short-circuit before selection, so the limiter
        // sits outside the proxy routes
        if let Some(limiter) = limiter {
            router = router.layer(middleware::from_fn_with_state(
                limiter,
                rate_limit_middleware,
            ));
        }

        // a request that outlives the whole-request budget failed at the
        // gateway, not at the client, so it reports 504
        let router = router
            .layer(TimeoutLayer::with_status_code(
                StatusCode::GATEWAY_TIMEOUT,
                Duration::from_secs(config.server.request_timeout_secs),
            ))
            .layer(TraceLayer::new_for_http());

        Self { router }
    }

    /// Serve until the shutdown signal fires, then drain in-flight requests.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server draining");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
