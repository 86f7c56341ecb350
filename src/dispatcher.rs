// src/dispatcher.rs
use crate::error::SelectionError;
use crate::load_balancer::{LoadBalancer, Strategy};
use crate::metrics::MetricsCollector;
use crate::registry::{ConnectionGuard, Server, ServerRegistry};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

/// Per-request entry point into the selection subsystem.
///
/// Takes a registry snapshot, asks the active strategy for a server and hands
/// back a [`ConnectionGuard`], so the server's connection count is released
/// on every exit path of the caller.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<ServerRegistry>,
    strategy: Arc<Strategy>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl Dispatcher {
    pub fn new(registry: Arc<ServerRegistry>, strategy: Arc<Strategy>) -> Self {
        Self {
            registry,
            strategy,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn registry(&self) -> &Arc<ServerRegistry> {
        &self.registry
    }

    pub fn strategy(&self) -> &Arc<Strategy> {
        &self.strategy
    }

    /// Select a server for `key` and take a connection slot on it.
    pub fn acquire(&self, key: &str) -> Result<ConnectionGuard, SelectionError> {
        let snapshot = self.registry.snapshot();

        match self.strategy.select(&snapshot, key) {
            Ok(server) => {
                let guard = server.acquire();
                debug!(
                    key,
                    server = %server.id(),
                    strategy = self.strategy.name(),
                    "Selected server"
                );
                if let Some(metrics) = &self.metrics {
                    metrics.record_selection(self.strategy.name(), server.id());
                    metrics.update_backend_connections(server.id(), server.active_connections());
                }
                Ok(guard)
            }
            Err(e) => {
                warn!(
                    key,
                    servers = snapshot.len(),
                    strategy = self.strategy.name(),
                    "{}",
                    e
                );
                if let Some(metrics) = &self.metrics {
                    metrics.record_selection_failure(self.strategy.name());
                }
                Err(e)
            }
        }
    }

    /// Run `f` against the server chosen for `key`.
    ///
    /// The connection slot is held while the returned future is alive and
    /// released when it completes or is dropped.
    pub async fn run<F, Fut, T>(&self, key: &str, f: F) -> Result<T, SelectionError>
    where
        F: FnOnce(Arc<Server>) -> Fut,
        Fut: Future<Output = T>,
    {
        let guard = self.acquire(key)?;
        let output = f(Arc::clone(guard.server())).await;
        self.release(guard);
        Ok(output)
    }

    /// Give back a connection slot taken by [`Dispatcher::acquire`].
    pub fn release(&self, guard: ConnectionGuard) {
        let server = Arc::clone(guard.server());
        drop(guard);

        if let Some(metrics) = &self.metrics {
            metrics.update_backend_connections(server.id(), server.active_connections());
        }
    }
}
