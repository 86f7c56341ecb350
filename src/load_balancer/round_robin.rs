// src/load_balancer/round_robin.rs
use crate::error::SelectionError;
use crate::load_balancer::algorithm::{healthy_subset, LoadBalancer};
use crate::registry::Server;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Rotates through the healthy servers with one shared atomic cursor.
///
/// Every call consumes exactly one cursor value, so with a stable healthy
/// set of size `k` any `N` consecutive calls give each server `N / k` picks,
/// rounded up or down. A change in the healthy set skews the rotation for a
/// moment; that is not corrected.
#[derive(Debug, Default)]
pub struct RoundRobinBalancer {
    counter: AtomicUsize,
}

impl RoundRobinBalancer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LoadBalancer for RoundRobinBalancer {
    fn select(&self, servers: &[Arc<Server>], _key: &str) -> Result<Arc<Server>, SelectionError> {
        let healthy = healthy_subset(servers);
        if healthy.is_empty() {
            return Err(SelectionError::NoHealthyServer);
        }

        let index = self.counter.fetch_add(1, Ordering::Relaxed) % healthy.len();
        Ok(Arc::clone(healthy[index]))
    }

    fn name(&self) -> &'static str {
        "round_robin"
    }
}
