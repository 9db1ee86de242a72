//! Forwarding: rewrite rules, headers, streaming and upstream failures

use super::get_json;
use pretty_assertions::assert_eq;
use routemesh_core::{HttpMethod, RouteDefinition, RouteKey, ServiceInfo};
use serde_json::json;
use tests::fixtures::products_service;
use tests::harness::{eventually, TestGateway};
use wiremock::matchers::{body_string, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_path_rewrite_strips_prefix_and_keeps_query() {
    let backend = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/products/42"))
        .and(query_param("foo", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": 42 })))
        .expect(1)
        .mount(&backend)
        .await;

    let gateway = TestGateway::with_defaults().await;
    gateway.register(products_service(&backend.uri())).await;

    let (status, headers, body) = get_json(&gateway.url("/api/v1/products/42?foo=1")).await;
    assert_eq!(status, reqwest::StatusCode::OK);
    assert_eq!(body, json!({ "id": 42 }));
    assert_eq!(headers["x-service-name"], "products");
    assert_eq!(headers["x-service-version"], "1.0.0");
    assert_eq!(headers["x-gateway"], "routemesh");
    assert!(headers.contains_key("x-request-id"));

    gateway.stop().await;
}

#[tokio::test]
async fn test_service_query_is_merged_first() {
    let backend = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/products"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&backend)
        .await;

    let gateway = TestGateway::with_defaults().await;
    let service = ServiceInfo::new("products", "1.0.0", format!("{}/?tenant=t1", backend.uri()))
        .with_route(RouteDefinition::get("/products"));
    gateway.register(service).await;

    let (status, _, _) = get_json(&gateway.url("/api/v1/products?page=2")).await;
    assert_eq!(status, reqwest::StatusCode::OK);

    let received = backend.received_requests().await.unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].url.query(), Some("tenant=t1&page=2"));

    gateway.stop().await;
}

#[tokio::test]
async fn test_health_proxy_ignores_inbound_query() {
    let backend = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "ok" })))
        .expect(1)
        .mount(&backend)
        .await;

    let gateway = TestGateway::with_defaults().await;
    gateway.register(products_service(&backend.uri())).await;

    let (status, headers, body) = get_json(&gateway.url("/health/products?verbose=true")).await;
    assert_eq!(status, reqwest::StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(headers["x-health-check"], "true");
    assert_eq!(headers["x-service-name"], "products");

    let received = backend.received_requests().await.unwrap();
    assert_eq!(received[0].url.path(), "/health");
    assert_eq!(received[0].url.query(), None);

    gateway.stop().await;
}

#[tokio::test]
async fn test_forwarding_headers_and_spoofed_identity() {
    let backend = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/products"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&backend)
        .await;

    let gateway = TestGateway::with_defaults().await;
    gateway.register(products_service(&backend.uri())).await;

    let response = reqwest::Client::new()
        .get(gateway.url("/api/v1/products"))
        .header("x-forwarded-for", "203.0.113.7")
        .header("x-request-id", "req-123")
        .header("x-user-id", "spoofed")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(response.headers()["x-request-id"], "req-123");

    let received = backend.received_requests().await.unwrap();
    let headers = &received[0].headers;
    assert!(headers["x-forwarded-for"]
        .to_str()
        .unwrap()
        .starts_with("203.0.113.7, "));
    assert_eq!(headers["x-request-id"], "req-123");
    assert_eq!(headers["x-forwarded-proto"], "http");
    assert!(headers.contains_key("x-forwarded-host"));
    assert!(!headers.contains_key("x-user-id"));

    gateway.stop().await;
}

#[tokio::test]
async fn test_request_body_is_forwarded() {
    let backend = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/products"))
        .and(body_string(r#"{"name":"lamp"}"#))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": 7 })))
        .expect(1)
        .mount(&backend)
        .await;

    let gateway = TestGateway::with_defaults().await;
    gateway.register(products_service(&backend.uri())).await;

    let response = reqwest::Client::new()
        .post(gateway.url("/api/v1/products"))
        .bearer_auth("any-token")
        .header("content-type", "application/json")
        .body(r#"{"name":"lamp"}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::CREATED);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["id"], 7);

    gateway.stop().await;
}

#[tokio::test]
async fn test_upstream_error_status_is_relayed() {
    let backend = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/products/13"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&backend)
        .await;

    let gateway = TestGateway::with_defaults().await;
    gateway.register(products_service(&backend.uri())).await;

    let response = reqwest::get(gateway.url("/api/v1/products/13")).await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.headers()["x-service-name"], "products");
    assert_eq!(response.text().await.unwrap(), "maintenance");

    gateway.stop().await;
}

#[tokio::test]
async fn test_unreachable_backend_is_502() {
    let gateway = TestGateway::with_defaults().await;
    // nothing listens on port 1
    gateway.register(products_service("http://127.0.0.1:1")).await;

    let (status, headers, body) = get_json(&gateway.url("/api/v1/products")).await;
    assert_eq!(status, reqwest::StatusCode::BAD_GATEWAY);
    assert_eq!(body, json!({ "error": "service unavailable" }));
    assert_eq!(headers["x-service-name"], "products");
    assert_eq!(headers["x-service-version"], "1.0.0");

    gateway.stop().await;
}

#[tokio::test]
async fn test_updated_service_url_is_used_immediately() {
    let old_backend = MockServer::start().await;
    let new_backend = MockServer::start().await;
    for backend in [&old_backend, &new_backend] {
        Mock::given(method("GET"))
            .and(path("/products"))
            .respond_with(ResponseTemplate::new(200))
            .mount(backend)
            .await;
    }

    let gateway = TestGateway::with_defaults().await;
    gateway.register(products_service(&old_backend.uri())).await;

    let mut v2 = products_service(&new_backend.uri());
    v2.version = "2.0.0".to_string();
    gateway.register(v2).await;

    let (status, headers, _) = get_json(&gateway.url("/api/v1/products")).await;
    assert_eq!(status, reqwest::StatusCode::OK);
    assert_eq!(headers["x-service-version"], "2.0.0");
    assert_eq!(old_backend.received_requests().await.unwrap().len(), 0);
    assert_eq!(new_backend.received_requests().await.unwrap().len(), 1);

    gateway.stop().await;
}

#[tokio::test]
async fn test_equivalent_pattern_keeps_first_owner() {
    let first = MockServer::start().await;
    let second = MockServer::start().await;
    for backend in [&first, &second] {
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(backend)
            .await;
    }

    let gateway = TestGateway::with_defaults().await;
    gateway
        .register(ServiceInfo::new("a", "1.0.0", first.uri()).with_route(RouteDefinition::get("/items/{id}")))
        .await;

    let b = ServiceInfo::new("b", "1.0.0", second.uri())
        .with_routes([RouteDefinition::get("/items/:sku"), RouteDefinition::get("/things")]);
    assert!(gateway.registry.register_service(b).unwrap().success);

    let router = gateway.router.clone();
    let things_bound = eventually(move || {
        let router = router.clone();
        async move {
            router
                .route_owner(&RouteKey::new(HttpMethod::Get, "/things"))
                .is_some_and(|owner| owner.name == "b")
        }
    })
    .await;
    assert!(things_bound);
    assert!(gateway
        .router
        .route_owner(&RouteKey::new(HttpMethod::Get, "/items/:sku"))
        .is_none());
    assert!(!gateway
        .router
        .service_routes("b")
        .contains(&RouteKey::new(HttpMethod::Get, "/items/:sku")));

    let (status, headers, _) = get_json(&gateway.url("/api/v1/items/7")).await;
    assert_eq!(status, reqwest::StatusCode::OK);
    assert_eq!(headers["x-service-name"], "a");
    assert_eq!(first.received_requests().await.unwrap().len(), 1);
    assert_eq!(second.received_requests().await.unwrap().len(), 0);

    gateway.stop().await;
}
