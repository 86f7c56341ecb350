// ────────────────────────────────
// src/proxy/proxy.rs
// Forwards each request to the server the dispatcher picks for the client.
// ────────────────────────────────

use crate::dispatcher::Dispatcher;
use crate::error::SelectionError;
use crate::metrics::{MetricsCollector, Timer};
use crate::registry::{ConnectionGuard, Server};
use futures::Stream;
use hyper::body::Bytes;
use hyper::client::HttpConnector;
use hyper::header::{HeaderValue, HOST};
use hyper::{Body, Client, Request, Response, StatusCode, Uri};
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tracing::{debug, Instrument};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

pub struct Proxy {
    dispatcher: Dispatcher,
    client: Client<HttpConnector>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl Proxy {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher,
            client: Client::new(),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Proxy `req` for the client at `peer`. The client IP is the selection key.
    ///
    /// The server's connection slot stays taken until the response body has
    /// been fully sent or dropped.
    pub async fn handle(
        &self,
        req: Request<Body>,
        peer: SocketAddr,
    ) -> Result<Response<Body>, ProxyError> {
        let key = peer.ip().to_string();
        let method = req.method().to_string();
        let request_id = Uuid::new_v4();
        let timer = Timer::new();

        let guard = match self.dispatcher.acquire(&key) {
            Ok(guard) => guard,
            Err(SelectionError::NoHealthyServer) => return Err(ProxyError::NoHealthyBackends),
        };
        let server = Arc::clone(guard.server());

        let span = tracing::info_span!("proxy", %request_id, client = %key);
        let result = self
            .forward(&server, req, request_id)
            .instrument(span)
            .await;

        let status = match &result {
            Ok(response) => response.status(),
            Err(e) => e.status(),
        };
        if let Some(metrics) = &self.metrics {
            metrics.record_request(&method, status.as_u16(), server.id(), timer.elapsed());
        }

        match result {
            Ok(response) => {
                let (parts, body) = response.into_parts();
                let body = Body::wrap_stream(InFlightBody {
                    body,
                    guard: Some(guard),
                    dispatcher: self.dispatcher.clone(),
                });
                Ok(Response::from_parts(parts, body))
            }
            Err(e) => {
                self.dispatcher.release(guard);
                Err(e)
            }
        }
    }

    async fn forward(
        &self,
        server: &Server,
        mut req: Request<Body>,
        request_id: Uuid,
    ) -> Result<Response<Body>, ProxyError> {
        let uri = backend_uri(server, req.uri())?;
        debug!(backend = %server.id(), %uri, "Forwarding request");

        *req.uri_mut() = uri;
        // Let the client derive Host from the backend URI.
        req.headers_mut().remove(HOST);
        if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
            req.headers_mut().insert(REQUEST_ID_HEADER, value);
        }

        self.client
            .request(req)
            .await
            .map_err(|e| ProxyError::BackendError(e.to_string()))
    }
}

/// The server's URL with the request path appended to its own path, plus
/// the request query. Scheme and authority always come from the server.
fn backend_uri(server: &Server, request: &Uri) -> Result<Uri, ProxyError> {
    let base = server
        .url()
        .ok_or_else(|| ProxyError::BackendError(format!("{} is not a URL", server.id())))?;

    let mut target = base.clone();
    let prefix = base.path().trim_end_matches('/');
    target.set_path(&format!("{}{}", prefix, request.path()));
    target.set_query(request.query());

    target
        .as_str()
        .parse()
        .map_err(|e: hyper::http::uri::InvalidUri| ProxyError::BackendError(e.to_string()))
}

/// Response body that holds the server's connection slot until it is drained
/// or dropped.
struct InFlightBody {
    body: Body,
    guard: Option<ConnectionGuard>,
    dispatcher: Dispatcher,
}

impl Stream for InFlightBody {
    type Item = Result<Bytes, hyper::Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.body).poll_next(cx)
    }
}

impl Drop for InFlightBody {
    fn drop(&mut self) {
        if let Some(guard) = self.guard.take() {
            self.dispatcher.release(guard);
        }
    }
}

// Custom error type for proxy operations
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("No healthy backends available")]
    NoHealthyBackends,

    #[error("Backend error: {0}")]
    BackendError(String),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::NoHealthyBackends => StatusCode::SERVICE_UNAVAILABLE,
            ProxyError::BackendError(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

// Convert ProxyError to Hyper Response for error handling
impl From<ProxyError> for Response<Body> {
    fn from(err: ProxyError) -> Self {
        let status = err.status();
        let message = match err {
            ProxyError::NoHealthyBackends => "No healthy backends available",
            ProxyError::BackendError(_) => "Bad gateway",
        };

        let mut response = Response::new(Body::from(message));
        *response.status_mut() = status;
        response
    }
}
