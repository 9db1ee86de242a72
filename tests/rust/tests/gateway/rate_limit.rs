//! Per-route admission control

use super::get_json;
use pretty_assertions::assert_eq;
use routemesh_core::{RouteDefinition, ServiceInfo};
use routemesh_gateway::GatewayConfig;
use tests::harness::TestGateway;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn backend() -> MockServer {
    let backend = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&backend)
        .await;
    backend
}

#[tokio::test]
async fn test_route_declared_limit() {
    let backend = backend().await;
    let gateway = TestGateway::with_defaults().await;
    let service = ServiceInfo::new("search", "1.0.0", backend.uri()).with_routes([
        RouteDefinition::get("/search").with_rate_limit(2),
        RouteDefinition::get("/suggest"),
    ]);
    gateway.register(service).await;

    let url = gateway.url("/api/v1/search");
    assert_eq!(get_json(&url).await.0, reqwest::StatusCode::OK);
    assert_eq!(get_json(&url).await.0, reqwest::StatusCode::OK);

    let (status, headers, body) = get_json(&url).await;
    assert_eq!(status, reqwest::StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"], "rate limit exceeded");
    let retry_after: u64 = headers["retry-after"].to_str().unwrap().parse().unwrap();
    assert!(retry_after >= 1);
    assert_eq!(body["retry_after"], format!("{}s", retry_after));

    // the other route has its own bucket
    let (status, _, _) = get_json(&gateway.url("/api/v1/suggest")).await;
    assert_eq!(status, reqwest::StatusCode::OK);

    assert_eq!(backend.received_requests().await.unwrap().len(), 3);

    gateway.stop().await;
}

#[tokio::test]
async fn test_gateway_default_limit() {
    let backend = backend().await;
    let config = GatewayConfig {
        rate_limit_count: 1,
        ..GatewayConfig::default()
    };
    let gateway = TestGateway::start(config).await;
    let service = ServiceInfo::new("search", "1.0.0", backend.uri())
        .with_route(RouteDefinition::get("/search"));
    gateway.register(service).await;

    let url = gateway.url("/api/v1/search");
    assert_eq!(get_json(&url).await.0, reqwest::StatusCode::OK);
    assert_eq!(get_json(&url).await.0, reqwest::StatusCode::TOO_MANY_REQUESTS);

    gateway.stop().await;
}

#[tokio::test]
async fn test_limit_checked_before_auth() {
    let backend = backend().await;
    let gateway = TestGateway::with_defaults().await;
    let service = ServiceInfo::new("vault", "1.0.0", backend.uri())
        .with_route(RouteDefinition::get("/secrets").protected().with_rate_limit(1));
    gateway.register(service).await;

    let url = gateway.url("/api/v1/secrets");
    assert_eq!(get_json(&url).await.0, reqwest::StatusCode::UNAUTHORIZED);
    assert_eq!(get_json(&url).await.0, reqwest::StatusCode::TOO_MANY_REQUESTS);

    gateway.stop().await;
}
