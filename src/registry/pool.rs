// src/registry/pool.rs
use super::server::{ConnectionGuard, Server, ServerStatus};
use crate::config::BackendConfig;
use crate::error::RegistryError;
use arc_swap::ArcSwap;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

/// An ordered, point-in-time list of servers.
pub type Snapshot = Arc<Vec<Arc<Server>>>;

/// Authoritative set of configured servers.
///
/// Readers take cheap snapshots; membership changes publish a fresh list
/// (copy-on-write) so a snapshot never changes under its holder. Health and
/// connection counts live on the shared `Server` values and are visible
/// through every snapshot.
pub struct ServerRegistry {
    servers: ArcSwap<Vec<Arc<Server>>>,
    index: DashMap<String, Arc<Server>>,
}

impl ServerRegistry {
    pub fn new() -> Self {
        Self {
            servers: ArcSwap::from_pointee(Vec::new()),
            index: DashMap::new(),
        }
    }

    pub fn from_config(configs: &[BackendConfig]) -> Result<Self, RegistryError> {
        let registry = Self::new();
        for config in configs {
            registry.add_server(config.url.clone(), config.weight)?;
        }
        Ok(registry)
    }

    pub fn snapshot(&self) -> Snapshot {
        self.servers.load_full()
    }

    pub fn get(&self, id: &str) -> Option<Arc<Server>> {
        self.index.get(id).map(|s| s.clone())
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn healthy_count(&self) -> usize {
        self.servers.load().iter().filter(|s| s.is_healthy()).count()
    }

    pub fn add_server(
        &self,
        id: impl Into<String>,
        weight: u32,
    ) -> Result<Arc<Server>, RegistryError> {
        let id = id.into();
        if weight < 1 {
            return Err(RegistryError::InvalidWeight { id, weight });
        }

        match self.index.entry(id.clone()) {
            Entry::Occupied(_) => Err(RegistryError::DuplicateServer(id)),
            Entry::Vacant(slot) => {
                let server = Arc::new(Server::new(id, weight));
                // Hold the shard lock until the snapshot includes the server.
                let _entry = slot.insert(server.clone());

                self.servers.rcu(|current| {
                    let mut next = Vec::with_capacity(current.len() + 1);
                    next.extend(current.iter().cloned());
                    next.push(server.clone());
                    next
                });

                tracing::info!(server = %server.id(), weight, "Added server");
                Ok(server)
            }
        }
    }

    pub fn remove_server(&self, id: &str) -> Result<Arc<Server>, RegistryError> {
        let (_, removed) = self
            .index
            .remove(id)
            .ok_or_else(|| RegistryError::UnknownServer(id.to_string()))?;

        self.servers.rcu(|current| {
            current
                .iter()
                .filter(|s| s.id() != id)
                .cloned()
                .collect::<Vec<_>>()
        });

        tracing::info!(server = %id, "Removed server");
        Ok(removed)
    }

    /// The health monitor's only write path. Returns whether the state changed.
    pub fn set_healthy(&self, id: &str, healthy: bool) -> Result<bool, RegistryError> {
        let server = self
            .get(id)
            .ok_or_else(|| RegistryError::UnknownServer(id.to_string()))?;

        let changed = server.set_healthy(healthy);
        if changed {
            if healthy {
                tracing::info!(server = %id, "Server marked healthy");
            } else {
                tracing::warn!(server = %id, "Server marked unhealthy");
            }
        }
        Ok(changed)
    }

    /// Take a connection slot on a server by id.
    pub fn acquire(&self, id: &str) -> Result<ConnectionGuard, RegistryError> {
        self.get(id)
            .map(|server| server.acquire())
            .ok_or_else(|| RegistryError::UnknownServer(id.to_string()))
    }

    pub fn statuses(&self) -> Vec<ServerStatus> {
        self.servers.load().iter().map(|s| s.status()).collect()
    }
}

impl Default for ServerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
