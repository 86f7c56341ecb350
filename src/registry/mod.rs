// src/registry/mod.rs
mod pool;
mod server;

pub use pool::{ServerRegistry, Snapshot};
pub use server::{ConnectionGuard, Server, ServerStatus};
