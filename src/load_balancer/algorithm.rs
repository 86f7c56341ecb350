// src/load_balancer/algorithm.rs
use crate::error::SelectionError;
use crate::registry::Server;
use std::sync::Arc;

/// A server selection strategy.
///
/// `select` must pick exactly one healthy entry of `servers`, or fail with
/// [`SelectionError::NoHealthyServer`] when there is none. It never mutates
/// the servers; implementations may keep their own internal state (a cursor,
/// a cached ring). Selection is pure in-memory work and never blocks.
pub trait LoadBalancer: Send + Sync {
    fn select(&self, servers: &[Arc<Server>], key: &str) -> Result<Arc<Server>, SelectionError>;

    fn name(&self) -> &'static str;
}

/// Healthy servers, in input order.
pub(crate) fn healthy_subset(servers: &[Arc<Server>]) -> Vec<&Arc<Server>> {
    servers.iter().filter(|s| s.is_healthy()).collect()
}
