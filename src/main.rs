// src/main.rs
use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};

use backend_selector::{
    config,
    health::{HealthChecker, HttpProbe},
    load_balancer::create_load_balancer,
    metrics::{DiagnosticsService, MetricsRegistry},
    proxy::Proxy,
    server::{RequestHandler, ServerBuilder},
    Dispatcher, ServerRegistry,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("backend_selector=debug".parse()?)
                .add_directive("hyper=info".parse()?),
        )
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.yaml".to_string());

    info!("Loading configuration from: {}", config_path);
    let config = config::load_config(&config_path).await?;

    // Initialize metrics
    let metrics_registry = Arc::new(MetricsRegistry::new()?);
    let metrics = metrics_registry.collector();

    // Registry and selection strategy
    let registry = Arc::new(ServerRegistry::from_config(&config.backends)?);
    let strategy = Arc::new(create_load_balancer(
        config.algorithm()?,
        &config.consistent_hash,
    ));
    metrics.update_backend_counts(registry.healthy_count(), registry.len());

    let dispatcher =
        Dispatcher::new(registry.clone(), strategy.clone()).with_metrics(metrics.clone());

    // Start health checker
    let health_checker = if config.health_check.enabled {
        let probe = HttpProbe::new(config.health_check.path.clone(), config.health_check.timeout())?;
        let checker = Arc::new(HealthChecker::new(
            config.health_check.clone(),
            registry.clone(),
            Arc::new(probe),
            Some(metrics.clone()),
        ));
        tokio::spawn(checker.clone().start());
        Some(checker)
    } else {
        warn!("Health checking disabled; every backend stays healthy");
        None
    };

    // Start metrics server if enabled
    if config.metrics.enabled {
        let metrics_addr: SocketAddr = ([0, 0, 0, 0], config.metrics.port).into();
        DiagnosticsService::new(
            metrics_registry.clone(),
            registry.clone(),
            strategy.clone(),
            config.metrics.path.clone(),
        )
        .spawn(metrics_addr)?;
    }

    let proxy = Arc::new(Proxy::new(dispatcher).with_metrics(metrics));
    let handler = RequestHandler::new(proxy);

    info!(
        "Starting load balancer on {} with {} backends",
        config.listen,
        registry.len()
    );
    ServerBuilder::new(config.listen)
        .with_handler(handler)
        .serve(shutdown_signal())
        .await?;

    if let Some(checker) = health_checker {
        checker.shutdown();
    }
    info!("Load balancer stopped");
    Ok(())
}

// Graceful shutdown handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
