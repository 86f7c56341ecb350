// src/registry/server.rs
use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use url::Url;

/// A backend server as seen by the selection strategies.
///
/// Identity is the address string; two `Server`s with the same id are equal
/// even if they are different allocations. Health and connection counts are
/// atomics so strategies can read them without locking.
#[derive(Debug)]
pub struct Server {
    id: String,
    url: Option<Url>,
    weight: u32,

    // Runtime state
    healthy: AtomicBool,
    active_connections: AtomicUsize,
    last_health_change: ArcSwapOption<DateTime<Utc>>,
}

impl Server {
    /// Weight is clamped to at least 1.
    pub fn new(id: impl Into<String>, weight: u32) -> Self {
        let id = id.into();
        let url = Url::parse(&id).ok();

        Self {
            id,
            url,
            weight: weight.max(1),
            healthy: AtomicBool::new(true),
            active_connections: AtomicUsize::new(0),
            last_health_change: ArcSwapOption::empty(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// The parsed address, if the id is a URL.
    pub fn url(&self) -> Option<&Url> {
        self.url.as_ref()
    }

    pub fn weight(&self) -> u32 {
        self.weight
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Acquire)
    }

    /// Returns true if the state actually changed.
    pub(crate) fn set_healthy(&self, healthy: bool) -> bool {
        let previous = self.healthy.swap(healthy, Ordering::AcqRel);
        if previous != healthy {
            self.last_health_change.store(Some(Arc::new(Utc::now())));
        }
        previous != healthy
    }

    pub fn last_health_change(&self) -> Option<DateTime<Utc>> {
        self.last_health_change.load().as_deref().copied()
    }

    pub fn active_connections(&self) -> usize {
        self.active_connections.load(Ordering::Relaxed)
    }

    pub(crate) fn increment_connections(&self) {
        self.active_connections.fetch_add(1, Ordering::SeqCst);
    }

    /// Saturates at zero.
    pub(crate) fn decrement_connections(&self) {
        let _ = self
            .active_connections
            .fetch_update(Ordering::SeqCst, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    /// Take a connection slot that is released when the guard drops.
    pub fn acquire(self: &Arc<Self>) -> ConnectionGuard {
        self.increment_connections();
        ConnectionGuard {
            server: Arc::clone(self),
        }
    }

    pub fn status(&self) -> ServerStatus {
        ServerStatus {
            id: self.id.clone(),
            weight: self.weight,
            healthy: self.is_healthy(),
            active_connections: self.active_connections(),
            last_health_change: self.last_health_change().map(|t| t.to_rfc3339()),
        }
    }
}

impl PartialEq for Server {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Server {}

impl Hash for Server {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Serializable point-in-time view of a server for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct ServerStatus {
    pub id: String,
    pub weight: u32,
    pub healthy: bool,
    pub active_connections: usize,
    pub last_health_change: Option<String>,
}

/// Holds one active connection on a server for as long as it lives.
///
/// Dropping the guard decrements the counter, whichever way the owning scope
/// exits (return, `?`, panic, or a cancelled future).
#[derive(Debug)]
pub struct ConnectionGuard {
    server: Arc<Server>,
}

impl ConnectionGuard {
    pub fn server(&self) -> &Arc<Server> {
        &self.server
    }
}

impl Deref for ConnectionGuard {
    type Target = Server;

    fn deref(&self) -> &Self::Target {
        &self.server
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.server.decrement_connections();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_equality() {
        let a = Server::new("http://localhost:8081", 1);
        let b = Server::new("http://localhost:8081", 5);
        let c = Server::new("http://localhost:8082", 1);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_weight_is_clamped() {
        assert_eq!(Server::new("a", 0).weight(), 1);
        assert_eq!(Server::new("a", 7).weight(), 7);
    }

    #[test]
    fn test_url_is_parsed_when_possible() {
        assert!(Server::new("http://localhost:8081", 1).url().is_some());
        assert!(Server::new("Server-A", 1).url().is_none());
    }

    #[test]
    fn test_health_transition_records_timestamp() {
        let server = Server::new("a", 1);
        assert!(server.is_healthy());
        assert!(server.last_health_change().is_none());

        assert!(!server.set_healthy(true));
        assert!(server.last_health_change().is_none());

        assert!(server.set_healthy(false));
        assert!(!server.is_healthy());
        assert!(server.last_health_change().is_some());
    }

    #[test]
    fn test_guard_releases_connection() {
        let server = Arc::new(Server::new("a", 1));
        {
            let _g1 = server.acquire();
            let g2 = server.acquire();
            assert_eq!(server.active_connections(), 2);
            drop(g2);
            assert_eq!(server.active_connections(), 1);
        }
        assert_eq!(server.active_connections(), 0);
    }

    #[test]
    fn test_guard_releases_on_panic() {
        let server = Arc::new(Server::new("a", 1));
        let cloned = Arc::clone(&server);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _guard = cloned.acquire();
            panic!("proxy blew up");
        }));
        assert!(result.is_err());
        assert_eq!(server.active_connections(), 0);
    }

    #[test]
    fn test_decrement_saturates() {
        let server = Server::new("a", 1);
        server.decrement_connections();
        assert_eq!(server.active_connections(), 0);
    }
}
