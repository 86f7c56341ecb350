// src/load_balancer/mod.rs
mod algorithm;
mod consistent_hash;
mod hash;
mod key_hash;
mod ring;
mod round_robin;

pub use algorithm::LoadBalancer; // trait
pub use consistent_hash::ConsistentHashBalancer;
pub use hash::hash_key;
pub use key_hash::KeyHashBalancer;
pub use ring::{Fingerprint, HashRing, RingEntry};
pub use round_robin::RoundRobinBalancer;
pub use crate::config::LoadBalancerAlgorithm;

use crate::config::ConsistentHashConfig;
use crate::error::SelectionError;
use crate::registry::Server;
use std::sync::Arc;

/// The active strategy, chosen once at startup.
pub enum Strategy {
    RoundRobin(RoundRobinBalancer),
    KeyHash(KeyHashBalancer),
    ConsistentHash(ConsistentHashBalancer),
}

impl Strategy {
    /// Ring dump, for the consistent-hash strategy only.
    pub fn ring_state(&self) -> Option<Vec<RingEntry>> {
        match self {
            Strategy::ConsistentHash(ch) => Some(ch.ring_state()),
            _ => None,
        }
    }

    fn inner(&self) -> &dyn LoadBalancer {
        match self {
            Strategy::RoundRobin(rr) => rr,
            Strategy::KeyHash(kh) => kh,
            Strategy::ConsistentHash(ch) => ch,
        }
    }
}

impl LoadBalancer for Strategy {
    fn select(&self, servers: &[Arc<Server>], key: &str) -> Result<Arc<Server>, SelectionError> {
        self.inner().select(servers, key)
    }

    fn name(&self) -> &'static str {
        self.inner().name()
    }
}

pub fn create_load_balancer(
    algorithm: LoadBalancerAlgorithm,
    consistent_hash: &ConsistentHashConfig,
) -> Strategy {
    let strategy = match algorithm {
        LoadBalancerAlgorithm::RoundRobin => Strategy::RoundRobin(RoundRobinBalancer::new()),
        LoadBalancerAlgorithm::KeyHash => Strategy::KeyHash(KeyHashBalancer::new()),
        LoadBalancerAlgorithm::ConsistentHash => Strategy::ConsistentHash(ConsistentHashBalancer::new(
            consistent_hash.virtual_nodes,
            consistent_hash.label_separator.clone(),
        )),
    };
    tracing::info!(strategy = strategy.name(), "Selected load balancing strategy");
    strategy
}
