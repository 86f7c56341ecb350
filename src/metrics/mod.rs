// src/metrics/mod.rs
mod collector;
mod endpoint;

pub use collector::{MetricsCollector, MetricsRegistry, Timer};
pub use endpoint::{DiagnosticsService, BACKENDS_PATH, RING_PATH};
