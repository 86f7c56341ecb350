// src/load_balancer/consistent_hash.rs
use crate::config::DEFAULT_VIRTUAL_NODES;
use crate::error::SelectionError;
use crate::load_balancer::algorithm::LoadBalancer;
use crate::load_balancer::hash::hash_key;
use crate::load_balancer::ring::{Fingerprint, HashRing, RingEntry};
use crate::registry::Server;
use arc_swap::ArcSwap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Consistent hashing over a virtual-node ring.
///
/// The ring is rebuilt lazily: every `select` fingerprints the incoming
/// servers and only builds a new ring when ids or weights changed. The new
/// ring is swapped in atomically, so concurrent callers see either the old
/// or the new ring in full. Health is not part of the ring; unhealthy owners
/// are skipped during the clockwise walk, which leaves every other key where
/// it was.
pub struct ConsistentHashBalancer {
    ring: ArcSwap<HashRing>,
    virtual_nodes: u32,
    label_separator: String,
    rebuilds: AtomicU64,
}

impl ConsistentHashBalancer {
    pub fn new(virtual_nodes: u32, label_separator: impl Into<String>) -> Self {
        Self {
            ring: ArcSwap::from_pointee(HashRing::empty()),
            virtual_nodes: virtual_nodes.max(1),
            label_separator: label_separator.into(),
            rebuilds: AtomicU64::new(0),
        }
    }

    pub fn with_virtual_nodes(virtual_nodes: u32) -> Self {
        Self::new(virtual_nodes, "#")
    }

    pub fn virtual_nodes(&self) -> u32 {
        self.virtual_nodes
    }

    /// How many times the ring has been rebuilt.
    pub fn rebuild_count(&self) -> u64 {
        self.rebuilds.load(Ordering::Relaxed)
    }

    /// Ordered `(hash, server)` pairs of the current ring. Read-only output
    /// for tooling; it has no effect on selection.
    pub fn ring_state(&self) -> Vec<RingEntry> {
        self.ring.load().entries()
    }

    fn ring_for(&self, servers: &[Arc<Server>]) -> Arc<HashRing> {
        let fingerprint = Fingerprint::of(servers);
        let current = self.ring.load_full();
        if current.fingerprint() == fingerprint {
            return current;
        }

        let ring = Arc::new(HashRing::build(servers, self.virtual_nodes, &self.label_separator));
        self.ring.store(Arc::clone(&ring));
        self.rebuilds.fetch_add(1, Ordering::Relaxed);

        tracing::info!(
            servers = ring.member_count(),
            positions = ring.len(),
            virtual_nodes = self.virtual_nodes,
            "Rebuilt consistent hash ring"
        );
        ring
    }
}

impl Default for ConsistentHashBalancer {
    fn default() -> Self {
        Self::with_virtual_nodes(DEFAULT_VIRTUAL_NODES)
    }
}

impl LoadBalancer for ConsistentHashBalancer {
    fn select(&self, servers: &[Arc<Server>], key: &str) -> Result<Arc<Server>, SelectionError> {
        let ring = self.ring_for(servers);

        // Resolve ring slots to the live servers of this snapshot.
        let mut healthy: Vec<Option<&Arc<Server>>> = vec![None; ring.member_count()];
        let mut any_healthy = false;
        for server in servers.iter().filter(|s| s.is_healthy()) {
            if let Some(slot) = ring.slot_of(server.id()) {
                healthy[slot] = Some(server);
                any_healthy = true;
            }
        }
        if !any_healthy {
            return Err(SelectionError::NoHealthyServer);
        }

        let picked = ring
            .walk(hash_key(key))
            .find_map(|slot| healthy[slot])
            .map(Arc::clone)
            .ok_or(SelectionError::NoHealthyServer);
        picked
    }

    fn name(&self) -> &'static str {
        "consistent_hash"
    }
}
