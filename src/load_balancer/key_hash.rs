// src/load_balancer/key_hash.rs
use crate::error::SelectionError;
use crate::load_balancer::algorithm::{healthy_subset, LoadBalancer};
use crate::load_balancer::hash::hash_key;
use crate::registry::Server;
use std::sync::Arc;

/// `hash(key) mod healthy_count` over the healthy servers in input order.
///
/// Stateless. The same key against the same healthy set always lands on the
/// same server, but any change to that set can move most keys.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeyHashBalancer;

impl KeyHashBalancer {
    pub fn new() -> Self {
        Self
    }
}

impl LoadBalancer for KeyHashBalancer {
    fn select(&self, servers: &[Arc<Server>], key: &str) -> Result<Arc<Server>, SelectionError> {
        let healthy = healthy_subset(servers);
        if healthy.is_empty() {
            return Err(SelectionError::NoHealthyServer);
        }

        let index = (hash_key(key) % healthy.len() as u64) as usize;
        Ok(Arc::clone(healthy[index]))
    }

    fn name(&self) -> &'static str {
        "key_hash"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn servers() -> Vec<Arc<Server>> {
        vec![
            Arc::new(Server::new("http://localhost:8081", 1)),
            Arc::new(Server::new("http://localhost:8082", 1)),
            Arc::new(Server::new("http://localhost:8083", 1)),
        ]
    }

    #[test]
    fn test_same_key_same_server() {
        let lb = KeyHashBalancer::new();
        let servers = servers();

        for i in 0..50 {
            let key = format!("192.168.0.{}", i);
            let first = lb.select(&servers, &key).unwrap();
            for _ in 0..10 {
                assert_eq!(lb.select(&servers, &key).unwrap().id(), first.id());
            }
        }
    }

    #[test]
    fn test_matches_modulo_over_healthy_subset() {
        let lb = KeyHashBalancer::new();
        let servers = servers();
        servers[0].set_healthy(false);

        let key = "203.0.113.7";
        let expected = &servers[1 + (hash_key(key) % 2) as usize];
        assert_eq!(lb.select(&servers, key).unwrap().id(), expected.id());
    }

    #[test]
    fn test_keys_spread_over_all_servers() {
        let lb = KeyHashBalancer::new();
        let servers = servers();
        let mut seen = std::collections::HashSet::new();

        for i in 0..300 {
            seen.insert(lb.select(&servers, &format!("10.1.{}.{}", i / 256, i % 256)).unwrap().id().to_string());
        }
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn test_never_returns_unhealthy() {
        let lb = KeyHashBalancer::new();
        let servers = servers();
        servers[2].set_healthy(false);

        for i in 0..200 {
            let picked = lb.select(&servers, &format!("key-{}", i)).unwrap();
            assert!(picked.is_healthy());
        }
    }

    #[test]
    fn test_no_healthy_servers() {
        let lb = KeyHashBalancer::new();
        assert_eq!(lb.select(&[], "k").unwrap_err(), SelectionError::NoHealthyServer);

        let servers = servers();
        servers.iter().for_each(|s| {
            s.set_healthy(false);
        });
        assert_eq!(lb.select(&servers, "k").unwrap_err(), SelectionError::NoHealthyServer);
    }
}
