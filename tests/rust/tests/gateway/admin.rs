//! Gateway-owned endpoints and response decoration

use super::get_json;
use pretty_assertions::assert_eq;
use serde_json::json;
use tests::fixtures::{orders_service, products_service};
use tests::harness::TestGateway;

#[tokio::test]
async fn test_gateway_health() {
    let gateway = TestGateway::with_defaults().await;

    let (status, headers, body) = get_json(&gateway.url("/gateway/health")).await;
    assert_eq!(status, reqwest::StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "gateway");
    assert!(body["version"].is_string());
    assert_eq!(headers["x-gateway"], "routemesh");

    gateway.stop().await;
}

#[tokio::test]
async fn test_gateway_services_lists_registry() {
    let gateway = TestGateway::with_defaults().await;
    gateway.register(products_service("http://127.0.0.1:9000")).await;
    gateway.register(orders_service("http://127.0.0.1:9001")).await;

    let (status, _, body) = get_json(&gateway.url("/gateway/services")).await;
    assert_eq!(status, reqwest::StatusCode::OK);
    assert_eq!(body["total_services"], 2);
    assert_eq!(body["services"][0]["name"], "orders");
    assert_eq!(body["services"][1]["name"], "products");
    assert_eq!(body["services"][1]["status"], "healthy");

    gateway.stop().await;
}

#[tokio::test]
async fn test_gateway_info_counts() {
    let gateway = TestGateway::with_defaults().await;
    gateway.register(products_service("http://127.0.0.1:9000")).await;

    let (status, _, body) = get_json(&gateway.url("/gateway/info")).await;
    assert_eq!(status, reqwest::StatusCode::OK);
    assert_eq!(body["services"], 1);
    // three declared routes plus the health route
    assert_eq!(body["routes"], 4);
    assert_eq!(body["bindings"], 4);
    assert_eq!(body["api_prefix"], "/api/v1");

    gateway.stop().await;
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let gateway = TestGateway::with_defaults().await;

    let (status, headers, body) = get_json(&gateway.url("/api/v1/nothing-here")).await;
    assert_eq!(status, reqwest::StatusCode::NOT_FOUND);
    assert_eq!(body, json!({ "error": "route not found" }));
    assert_eq!(headers["x-gateway"], "routemesh");
    assert!(headers.contains_key("x-request-id"));

    gateway.stop().await;
}

#[tokio::test]
async fn test_cors_headers() {
    let gateway = TestGateway::with_defaults().await;

    let response = reqwest::Client::new()
        .get(gateway.url("/gateway/health"))
        .header("origin", "http://app.example.com")
        .send()
        .await
        .unwrap();
    assert_eq!(response.headers()["access-control-allow-origin"], "*");

    gateway.stop().await;
}
