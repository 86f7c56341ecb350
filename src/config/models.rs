// src/config/models.rs
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

pub const DEFAULT_VIRTUAL_NODES: u32 = 160;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,

    /// Name of the active strategy, see [`LoadBalancerAlgorithm`].
    #[serde(default = "default_strategy")]
    pub strategy: String,

    #[serde(default)]
    pub consistent_hash: ConsistentHashConfig,

    pub backends: Vec<BackendConfig>,

    #[serde(default)]
    pub health_check: HealthCheckConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    pub url: String,
    #[serde(default = "default_weight")]
    pub weight: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsistentHashConfig {
    /// Ring positions per unit of backend weight.
    #[serde(default = "default_virtual_nodes")]
    pub virtual_nodes: u32,
    /// Joins the server id and replica index when labelling ring positions.
    #[serde(default = "default_label_separator")]
    pub label_separator: String,
}

impl Default for ConsistentHashConfig {
    fn default() -> Self {
        Self {
            virtual_nodes: default_virtual_nodes(),
            label_separator: default_label_separator(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_health_path")]
    pub path: String,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_healthy_threshold")]
    pub healthy_threshold: u32,
    #[serde(default = "default_unhealthy_threshold")]
    pub unhealthy_threshold: u32,
}

impl HealthCheckConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_health_path(),
            interval_secs: default_interval_secs(),
            timeout_secs: default_timeout_secs(),
            healthy_threshold: default_healthy_threshold(),
            unhealthy_threshold: default_unhealthy_threshold(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
            path: default_metrics_path(),
        }
    }
}

/// The closed set of selection strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadBalancerAlgorithm {
    RoundRobin,
    KeyHash,
    ConsistentHash,
}

impl FromStr for LoadBalancerAlgorithm {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "round_robin" | "round-robin" | "rr" => Ok(Self::RoundRobin),
            "ip_hash" | "ip-hash" | "key_hash" | "key-hash" => Ok(Self::KeyHash),
            "consistent_hash" | "consistent-hash" | "ch" => Ok(Self::ConsistentHash),
            _ => Err(ConfigError::UnknownStrategy(value.to_string())),
        }
    }
}

impl fmt::Display for LoadBalancerAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::RoundRobin => "round_robin",
            Self::KeyHash => "key_hash",
            Self::ConsistentHash => "consistent_hash",
        };
        f.write_str(name)
    }
}

impl Config {
    pub fn algorithm(&self) -> Result<LoadBalancerAlgorithm, ConfigError> {
        self.strategy.parse()
    }

    /// Reject anything that would make the balancer unable to serve.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.algorithm()?;

        if self.backends.is_empty() {
            return Err(ConfigError::NoBackends);
        }

        let mut seen = HashSet::new();
        for backend in &self.backends {
            if let Err(e) = Url::parse(&backend.url) {
                return Err(ConfigError::InvalidUrl {
                    url: backend.url.clone(),
                    reason: e.to_string(),
                });
            }
            if backend.weight < 1 {
                return Err(ConfigError::InvalidWeight {
                    url: backend.url.clone(),
                    weight: backend.weight,
                });
            }
            if !seen.insert(backend.url.as_str()) {
                return Err(ConfigError::DuplicateBackend(backend.url.clone()));
            }
        }

        if self.consistent_hash.virtual_nodes < 1 {
            return Err(ConfigError::InvalidVirtualNodes);
        }

        if self.health_check.healthy_threshold < 1 || self.health_check.unhealthy_threshold < 1 {
            return Err(ConfigError::InvalidThreshold);
        }

        Ok(())
    }
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_strategy() -> String {
    "round_robin".to_string()
}

fn default_weight() -> u32 {
    1
}

fn default_virtual_nodes() -> u32 {
    DEFAULT_VIRTUAL_NODES
}

fn default_label_separator() -> String {
    "#".to_string()
}

fn default_true() -> bool {
    true
}

fn default_health_path() -> String {
    "/health".to_string()
}

fn default_interval_secs() -> u64 {
    10
}

fn default_timeout_secs() -> u64 {
    2
}

fn default_healthy_threshold() -> u32 {
    2
}

fn default_unhealthy_threshold() -> u32 {
    3
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}
