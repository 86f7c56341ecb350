// tests/proxy_tests.rs
use backend_selector::config::{ConsistentHashConfig, LoadBalancerAlgorithm};
use backend_selector::metrics::MetricsRegistry;
use backend_selector::proxy::{Proxy, ProxyError};
use backend_selector::server::{RequestHandler, ServerBuilder};
use backend_selector::{create_load_balancer, Dispatcher, ServerRegistry};
use hyper::{Body, Client, Request, Response, StatusCode};
use mockito::Matcher;
use std::net::SocketAddr;
use std::sync::Arc;

const UUID_PATTERN: &str = "^[0-9a-f]{8}-[0-9a-f]{4}-4[0-9a-f]{3}-[0-9a-f]{4}-[0-9a-f]{12}$";

fn proxy_for(ids: &[&str]) -> (Arc<ServerRegistry>, Proxy) {
    let registry = Arc::new(ServerRegistry::new());
    for id in ids {
        registry.add_server(*id, 1).unwrap();
    }
    let strategy = create_load_balancer(
        LoadBalancerAlgorithm::ConsistentHash,
        &ConsistentHashConfig::default(),
    );
    let dispatcher = Dispatcher::new(registry.clone(), Arc::new(strategy));
    (registry, Proxy::new(dispatcher))
}

fn client() -> SocketAddr {
    "192.168.1.100:52000".parse().unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("host", "lb.example")
        .body(Body::empty())
        .unwrap()
}

async fn body_text(response: Response<Body>) -> String {
    let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_forwards_path_query_and_request_id() {
    let mut backend = mockito::Server::new_async().await;
    let mock = backend
        .mock("GET", "/api/users")
        .match_query(Matcher::UrlEncoded("id".into(), "7".into()))
        .match_header("x-request-id", Matcher::Regex(UUID_PATTERN.into()))
        .with_status(200)
        .with_body("users")
        .create_async()
        .await;

    let (registry, proxy) = proxy_for(&[backend.url().as_str()]);
    let response = proxy.handle(get("/api/users?id=7"), client()).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "users");
    mock.assert_async().await;
    assert_eq!(registry.get(&backend.url()).unwrap().active_connections(), 0);
}

#[tokio::test]
async fn test_scheme_relative_target_stays_on_selected_backend() {
    let mut registered = mockito::Server::new_async().await;
    let mut outsider = mockito::Server::new_async().await;
    registered
        .mock("GET", Matcher::Any)
        .with_body("registered")
        .create_async()
        .await;
    let outsider_mock = outsider
        .mock("GET", "/secret")
        .with_body("outsider")
        .expect(0)
        .create_async()
        .await;

    let (_registry, proxy) = proxy_for(&[registered.url().as_str()]);
    let target = format!("//{}/secret", outsider.host_with_port());
    let response = proxy.handle(get(&target), client()).await.unwrap();

    assert_eq!(body_text(response).await, "registered");
    outsider_mock.assert_async().await;
}

#[tokio::test]
async fn test_backend_path_prefix_is_kept() {
    let mut backend = mockito::Server::new_async().await;
    let mock = backend
        .mock("GET", "/prefix/users")
        .with_body("prefixed")
        .create_async()
        .await;

    let id = format!("{}/prefix", backend.url());
    let (_registry, proxy) = proxy_for(&[id.as_str()]);
    let response = proxy.handle(get("/users"), client()).await.unwrap();

    assert_eq!(body_text(response).await, "prefixed");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_connection_held_until_body_is_consumed() {
    let mut backend = mockito::Server::new_async().await;
    backend
        .mock("GET", "/download")
        .with_body(vec![b'x'; 1 << 20])
        .create_async()
        .await;

    let (registry, proxy) = proxy_for(&[backend.url().as_str()]);
    let server = registry.get(&backend.url()).unwrap();

    let response = proxy.handle(get("/download"), client()).await.unwrap();
    assert_eq!(server.active_connections(), 1);

    let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
    assert_eq!(bytes.len(), 1 << 20);
    assert_eq!(server.active_connections(), 0);
}

#[tokio::test]
async fn test_dropped_response_releases_connection() {
    let mut backend = mockito::Server::new_async().await;
    backend.mock("GET", "/").with_body("unread").create_async().await;

    let (registry, proxy) = proxy_for(&[backend.url().as_str()]);
    let server = registry.get(&backend.url()).unwrap();

    let response = proxy.handle(get("/"), client()).await.unwrap();
    assert_eq!(server.active_connections(), 1);
    drop(response);
    assert_eq!(server.active_connections(), 0);
}

#[tokio::test]
async fn test_same_client_sticks_to_one_backend() {
    let mut first = mockito::Server::new_async().await;
    let mut second = mockito::Server::new_async().await;
    first
        .mock("GET", "/")
        .with_body("first")
        .create_async()
        .await;
    second
        .mock("GET", "/")
        .with_body("second")
        .create_async()
        .await;

    let (_registry, proxy) = proxy_for(&[first.url().as_str(), second.url().as_str()]);
    let mut bodies = Vec::new();
    for _ in 0..5 {
        let response = proxy.handle(get("/"), client()).await.unwrap();
        bodies.push(body_text(response).await);
    }
    assert!(bodies.iter().all(|b| *b == bodies[0]), "{:?}", bodies);
}

#[tokio::test]
async fn test_backend_status_is_passed_through() {
    let mut backend = mockito::Server::new_async().await;
    backend
        .mock("POST", "/orders")
        .with_status(422)
        .with_body("invalid order")
        .create_async()
        .await;

    let (_registry, proxy) = proxy_for(&[backend.url().as_str()]);
    let request = Request::builder()
        .method("POST")
        .uri("/orders")
        .body(Body::from("{}"))
        .unwrap();
    let response = proxy.handle(request, client()).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body_text(response).await, "invalid order");
}

#[tokio::test]
async fn test_no_healthy_backend_is_service_unavailable() {
    let (registry, proxy) = proxy_for(&["http://127.0.0.1:1"]);
    registry.set_healthy("http://127.0.0.1:1", false).unwrap();

    let err = proxy.handle(get("/"), client()).await.unwrap_err();
    assert!(matches!(err, ProxyError::NoHealthyBackends));

    let response: Response<Body> = err.into();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_unreachable_backend_is_bad_gateway() {
    let (registry, proxy) = proxy_for(&["http://127.0.0.1:1"]);

    let err = proxy.handle(get("/"), client()).await.unwrap_err();
    assert!(matches!(err, ProxyError::BackendError(_)));
    assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(
        registry.get("http://127.0.0.1:1").unwrap().active_connections(),
        0
    );
}

#[tokio::test]
async fn test_non_url_server_is_bad_gateway() {
    let (_registry, proxy) = proxy_for(&["Server-A"]);
    let err = proxy.handle(get("/"), client()).await.unwrap_err();
    assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_request_metrics_recorded() {
    let mut backend = mockito::Server::new_async().await;
    backend.mock("GET", "/").create_async().await;

    let metrics = MetricsRegistry::new().unwrap();
    let (_registry, proxy) = proxy_for(&[backend.url().as_str()]);
    let proxy = proxy.with_metrics(metrics.collector());
    proxy.handle(get("/"), client()).await.unwrap();

    let text = String::from_utf8(metrics.gather().unwrap()).unwrap();
    let expected = format!(
        r#"lb_requests_total{{backend="{}",method="GET",status_code="200"}} 1"#,
        backend.url()
    );
    assert!(text.contains(&expected), "{}", text);
}

#[tokio::test]
async fn test_serves_over_tcp_until_shutdown() {
    let mut backend = mockito::Server::new_async().await;
    backend
        .mock("GET", "/hello")
        .with_body("hello from backend")
        .create_async()
        .await;

    let (_registry, proxy) = proxy_for(&[backend.url().as_str()]);
    let handler = RequestHandler::new(Arc::new(proxy));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();

    let server = tokio::spawn(
        ServerBuilder::new(addr)
            .with_handler(handler)
            .serve_listener(listener, async {
                let _ = stop_rx.await;
            }),
    );

    let uri = format!("http://{}/hello", addr).parse().unwrap();
    let response = Client::new().get(uri).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "hello from backend");

    stop_tx.send(()).unwrap();
    server.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_unavailable_over_tcp_is_503_response() {
    let (registry, proxy) = proxy_for(&["http://127.0.0.1:1"]);
    registry.set_healthy("http://127.0.0.1:1", false).unwrap();

    let handler = RequestHandler::new(Arc::new(proxy));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(
        ServerBuilder::new(addr)
            .with_handler(handler)
            .serve_listener(listener, std::future::pending()),
    );

    let uri = format!("http://{}/", addr).parse().unwrap();
    let response = Client::new().get(uri).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    server.abort();
}
