// src/error.rs
use thiserror::Error;

/// Raised by a selection strategy when nothing in the snapshot can serve.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    #[error("No healthy server available")]
    NoHealthyServer,
}

/// Raised by registry mutators.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Unknown server: {0}")]
    UnknownServer(String),

    #[error("Server already registered: {0}")]
    DuplicateServer(String),

    #[error("Invalid weight {weight} for server {id} (must be >= 1)")]
    InvalidWeight { id: String, weight: u32 },
}

/// Startup configuration failures. All of these are fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unknown load balancing strategy: {0}")]
    UnknownStrategy(String),

    #[error("Invalid weight {weight} for backend {url} (must be >= 1)")]
    InvalidWeight { url: String, weight: u32 },

    #[error("Backend listed more than once: {0}")]
    DuplicateBackend(String),

    #[error("Invalid backend URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("No backends configured")]
    NoBackends,

    #[error("virtual_nodes must be at least 1")]
    InvalidVirtualNodes,

    #[error("Health check thresholds must be at least 1")]
    InvalidThreshold,

    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON config: {0}")]
    Json(#[from] serde_json::Error),
}
