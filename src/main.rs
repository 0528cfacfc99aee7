//! Binary entry point: wires configuration, the backend pool, the health
//! checker, the reload coordinator, and the HTTP server together, then
//! waits for a shutdown signal.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rudder::config::{load_config, ReloadCoordinator};
use rudder::health::HealthChecker;
use rudder::http::HttpServer;
use rudder::lifecycle::{signals, Shutdown};
use rudder::load_balancer::{balancer_for, Backend, BackendPool, Balancer};
use rudder::observability::metrics;
use rudder::rate_limit::RateLimiter;

#[derive(Parser)]
#[command(name = "rudder", about = "Dynamic HTTP load balancer")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "configs/rudder.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rudder=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    // a bad config at startup is fatal; on reload it only logs
    let config = load_config(&args.config)?;
    tracing::info!(
        port = config.server.port,
        backends = config.backends.len(),
        strategy = %config.load_balancing.strategy,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                address = %config.observability.metrics_address,
                error = %e,
                "Invalid metrics address"
            ),
        }
    }

    let pool = Arc::new(BackendPool::new());
    let mut backends = Vec::with_capacity(config.backends.len());
    for backend_config in &config.backends {
        backends.push(Arc::new(Backend::from_config(backend_config)?));
    }
    pool.add(backends);

    let balancer: Arc<dyn Balancer> =
        Arc::from(balancer_for(&config.load_balancing.strategy)?);

    let limiter = config
        .rate_limiter
        .enabled
        .then(|| Arc::new(RateLimiter::new(&config.rate_limiter)));

    let shutdown = Shutdown::new();

    let checker = HealthChecker::new(pool.clone(), config.load_balancing.health_check.clone());
    let checker_task = checker.start(shutdown.subscribe());

    let coordinator = ReloadCoordinator::new(args.config.clone(), pool.clone(), config.clone());
    let reload = coordinator.start()?;

    let listener = TcpListener::bind(("0.0.0.0", config.server.port)).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let server = HttpServer::new(&config, pool, balancer, limiter);
    let server_shutdown = shutdown.subscribe();
    let server_task = tokio::spawn(async move { server.run(listener, server_shutdown).await });

    signals::wait_for_signal().await;

    // drain order: listener first, then the checker, then the coordinator
    shutdown.trigger();
    server_task.await??;
    checker_task.await?;
    reload.stop().await;

    tracing::info!("Shutdown complete");
    Ok(())
}
