// src/lib.rs
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod health;
pub mod load_balancer;
pub mod metrics;
pub mod proxy;
pub mod registry;
pub mod server;

pub use dispatcher::Dispatcher;
pub use error::{ConfigError, RegistryError, SelectionError};
pub use load_balancer::{create_load_balancer, LoadBalancer, Strategy};
pub use registry::{ConnectionGuard, Server, ServerRegistry};
