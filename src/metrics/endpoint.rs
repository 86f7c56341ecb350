// src/metrics/endpoint.rs
use super::MetricsRegistry;
use crate::load_balancer::Strategy;
use crate::registry::ServerRegistry;
use anyhow::Result;
use hyper::header::CONTENT_TYPE;
use hyper::{Body, Request, Response, Server, StatusCode};
use serde::Serialize;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};

pub const RING_PATH: &str = "/debug/ring";
pub const BACKENDS_PATH: &str = "/debug/backends";

/// Serves Prometheus metrics plus JSON dumps of the registry and the hash
/// ring.
#[derive(Clone)]
pub struct DiagnosticsService {
    metrics: Arc<MetricsRegistry>,
    servers: Arc<ServerRegistry>,
    strategy: Arc<Strategy>,
    metrics_path: Arc<str>,
}

impl DiagnosticsService {
    pub fn new(
        metrics: Arc<MetricsRegistry>,
        servers: Arc<ServerRegistry>,
        strategy: Arc<Strategy>,
        metrics_path: impl Into<String>,
    ) -> Self {
        let metrics_path: String = metrics_path.into();
        Self {
            metrics,
            servers,
            strategy,
            metrics_path: metrics_path.into(),
        }
    }

    pub fn respond(&self, path: &str) -> Response<Body> {
        if path == &*self.metrics_path {
            return match self.metrics.gather() {
                Ok(buffer) => response(
                    StatusCode::OK,
                    "text/plain; version=0.0.4",
                    Body::from(buffer),
                ),
                Err(e) => {
                    error!("Failed to encode metrics: {}", e);
                    text(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
                }
            };
        }

        match path {
            RING_PATH => match self.strategy.ring_state() {
                Some(entries) => json(&entries),
                None => text(
                    StatusCode::NOT_FOUND,
                    "Active strategy does not use a hash ring",
                ),
            },
            BACKENDS_PATH => json(&self.servers.statuses()),
            _ => text(StatusCode::NOT_FOUND, "Not Found"),
        }
    }

    /// Bind `addr` and serve in a background task.
    pub fn spawn(self, addr: SocketAddr) -> Result<()> {
        let metrics_path = self.metrics_path.clone();
        let make_service = hyper::service::make_service_fn(move |_| {
            let service = self.clone();
            async move {
                Ok::<_, Infallible>(hyper::service::service_fn(move |req: Request<Body>| {
                    let response = service.respond(req.uri().path());
                    async move { Ok::<_, Infallible>(response) }
                }))
            }
        });

        let server = Server::try_bind(&addr)?.serve(make_service);
        info!(
            "Metrics server listening on http://{}{}",
            addr, &*metrics_path
        );

        tokio::spawn(async move {
            if let Err(e) = server.await {
                error!("Metrics server error: {}", e);
            }
        });
        Ok(())
    }
}

fn json<T: Serialize>(value: &T) -> Response<Body> {
    match serde_json::to_vec(value) {
        Ok(body) => response(StatusCode::OK, "application/json", Body::from(body)),
        Err(e) => {
            error!("Failed to serialize diagnostics: {}", e);
            text(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
        }
    }
}

fn text(status: StatusCode, message: &'static str) -> Response<Body> {
    response(status, "text/plain", Body::from(message))
}

fn response(status: StatusCode, content_type: &'static str, body: Body) -> Response<Body> {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, hyper::header::HeaderValue::from_static(content_type));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConsistentHashConfig, LoadBalancerAlgorithm};
    use crate::load_balancer::{create_load_balancer, LoadBalancer};

    fn service(algorithm: LoadBalancerAlgorithm) -> DiagnosticsService {
        let servers = Arc::new(ServerRegistry::new());
        servers.add_server("http://a:80", 1).unwrap();
        servers.add_server("http://b:80", 2).unwrap();
        let config = ConsistentHashConfig {
            virtual_nodes: 4,
            ..Default::default()
        };
        let strategy = Arc::new(create_load_balancer(algorithm, &config));
        strategy.select(&servers.snapshot(), "warmup").unwrap();

        DiagnosticsService::new(
            Arc::new(MetricsRegistry::new().unwrap()),
            servers,
            strategy,
            "/metrics",
        )
    }

    async fn body_json(response: Response<Body>) -> serde_json::Value {
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_ring_dump() {
        let service = service(LoadBalancerAlgorithm::ConsistentHash);
        let response = service.respond(RING_PATH);
        assert_eq!(response.status(), StatusCode::OK);

        let entries = body_json(response).await;
        let entries = entries.as_array().unwrap();
        // (1 + 2) * 4 virtual nodes
        assert_eq!(entries.len(), 12);
        assert!(entries[0].get("hash").is_some());
        assert!(entries[0].get("server").is_some());
    }

    #[tokio::test]
    async fn test_ring_dump_without_ring() {
        let service = service(LoadBalancerAlgorithm::RoundRobin);
        assert_eq!(service.respond(RING_PATH).status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_backend_statuses() {
        let service = service(LoadBalancerAlgorithm::RoundRobin);
        let statuses = body_json(service.respond(BACKENDS_PATH)).await;
        let statuses = statuses.as_array().unwrap();
        assert_eq!(statuses.len(), 2);
        assert_eq!(statuses[1]["id"], "http://b:80");
        assert_eq!(statuses[1]["weight"], 2);
        assert_eq!(statuses[1]["healthy"], true);
    }

    #[test]
    fn test_metrics_and_unknown_paths() {
        let service = service(LoadBalancerAlgorithm::KeyHash);
        let response = service.respond("/metrics");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[CONTENT_TYPE],
            "text/plain; version=0.0.4"
        );
        assert_eq!(service.respond("/nope").status(), StatusCode::NOT_FOUND);
    }
}
