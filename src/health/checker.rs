// src/health/checker.rs
use super::probe::HealthProbe;
use crate::config::HealthCheckConfig;
use crate::error::RegistryError;
use crate::metrics::MetricsCollector;
use crate::registry::{Server, ServerRegistry};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::interval;
use tracing::{debug, info, warn};

/// Periodically probes every registered server and feeds the results into
/// [`ServerRegistry::set_healthy`].
///
/// A healthy server is demoted after `unhealthy_threshold` consecutive
/// failed probes; an unhealthy one is promoted after `healthy_threshold`
/// consecutive successes.
pub struct HealthChecker {
    config: HealthCheckConfig,
    registry: Arc<ServerRegistry>,
    probe: Arc<dyn HealthProbe>,
    metrics: Option<Arc<MetricsCollector>>,
    streaks: DashMap<String, Streak>,
    shutdown_tx: tokio::sync::watch::Sender<bool>,
    shutdown_rx: tokio::sync::watch::Receiver<bool>,
}

#[derive(Debug, Default, Clone, Copy)]
struct Streak {
    successes: u32,
    failures: u32,
}

#[derive(Debug)]
pub struct HealthCheckResult {
    pub backend_id: String,
    pub healthy: bool,
    pub response_time_ms: u64,
    pub error: Option<String>,
}

impl HealthChecker {
    pub fn new(
        config: HealthCheckConfig,
        registry: Arc<ServerRegistry>,
        probe: Arc<dyn HealthProbe>,
        metrics: Option<Arc<MetricsCollector>>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

        Self {
            config,
            registry,
            probe,
            metrics,
            streaks: DashMap::new(),
            shutdown_tx,
            shutdown_rx,
        }
    }

    pub async fn start(self: Arc<Self>) {
        let mut interval = interval(self.config.interval());
        let mut shutdown_rx = self.shutdown_rx.clone();

        info!(
            "Starting health checker with interval: {:?}",
            self.config.interval()
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.check_all_backends().await;
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Health checker shutting down");
                        break;
                    }
                }
            }
        }
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Probe every server once and apply the results.
    pub async fn check_all_backends(&self) -> Vec<HealthCheckResult> {
        let snapshot = self.registry.snapshot();
        let results =
            futures::future::join_all(snapshot.iter().map(|server| self.check_backend(server)))
                .await;

        // Forget streaks of servers that left the registry.
        self.streaks.retain(|id, _| self.registry.get(id).is_some());

        let healthy_count = self.registry.healthy_count();
        let total_count = self.registry.len();
        if let Some(metrics) = &self.metrics {
            metrics.update_backend_counts(healthy_count, total_count);
        }

        info!(
            "Health check complete: {} healthy, {} unhealthy",
            healthy_count,
            total_count.saturating_sub(healthy_count)
        );
        results
    }

    async fn check_backend(&self, server: &Arc<Server>) -> HealthCheckResult {
        let start = Instant::now();
        let outcome = tokio::time::timeout(self.config.timeout(), self.probe.probe(server))
            .await
            .unwrap_or_else(|_| Err("Request timeout".to_string()));
        let response_time_ms = start.elapsed().as_millis() as u64;

        let probe_ok = outcome.is_ok();
        if let Err(reason) = &outcome {
            debug!(server = %server.id(), %reason, "Health probe failed");
        }

        if let Some(target) = self.record(server, probe_ok) {
            match self.registry.set_healthy(server.id(), target) {
                Ok(true) => {
                    let streak = self.streaks.get(server.id()).map(|s| *s).unwrap_or_default();
                    if target {
                        info!(
                            "Backend {} is now healthy after {} consecutive successes",
                            server.id(),
                            streak.successes
                        );
                    } else {
                        warn!(
                            "Backend {} is now unhealthy after {} consecutive failures",
                            server.id(),
                            streak.failures
                        );
                    }
                }
                Ok(false) => {}
                Err(RegistryError::UnknownServer(id)) => {
                    warn!(server = %id, "Dropping health update for unknown server");
                }
                Err(e) => warn!("Health update failed: {}", e),
            }
        }

        if let Some(metrics) = &self.metrics {
            metrics.update_backend_health(server.id(), server.is_healthy());
        }

        HealthCheckResult {
            backend_id: server.id().to_string(),
            healthy: probe_ok,
            response_time_ms,
            error: outcome.err(),
        }
    }

    /// Update the probe streak; returns the state to apply once a threshold
    /// is crossed.
    fn record(&self, server: &Server, probe_ok: bool) -> Option<bool> {
        let mut streak = self.streaks.entry(server.id().to_string()).or_default();
        if probe_ok {
            streak.failures = 0;
            streak.successes = streak.successes.saturating_add(1);
        } else {
            streak.successes = 0;
            streak.failures = streak.failures.saturating_add(1);
        }

        let healthy = server.is_healthy();
        if !healthy && probe_ok && streak.successes >= self.config.healthy_threshold {
            Some(true)
        } else if healthy && !probe_ok && streak.failures >= self.config.unhealthy_threshold {
            Some(false)
        } else {
            None
        }
    }
}
