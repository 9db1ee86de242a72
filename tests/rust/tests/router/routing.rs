//! Route table ownership across registry changes

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use pretty_assertions::assert_eq;
use routemesh_core::{HttpMethod, RouteDefinition, RouteKey, ServiceInfo, ServiceStatus};
use routemesh_gateway::{
    BearerPresenceValidator, DynamicRouter, RateLimiter, ReverseProxy, RouterConfig,
};
use routemesh_registry::ServiceRegistry;
use std::sync::Arc;
use tests::fixtures::{products_service, simple_service};
use tests::harness::eventually;

fn router() -> Arc<DynamicRouter> {
    Arc::new(DynamicRouter::new(
        RouterConfig::default(),
        ReverseProxy::new().unwrap(),
        Arc::new(BearerPresenceValidator),
    ))
}

fn get(path: &str) -> RouteKey {
    RouteKey::new(HttpMethod::Get, path)
}

async fn owned_by(router: &Arc<DynamicRouter>, key: RouteKey, service: &'static str) -> bool {
    let router = router.clone();
    eventually(move || {
        let router = router.clone();
        let key = key.clone();
        async move { router.route_owner(&key).is_some_and(|s| s.name == service) }
    })
    .await
}

async fn unowned(router: &Arc<DynamicRouter>, key: RouteKey) -> bool {
    let router = router.clone();
    eventually(move || {
        let router = router.clone();
        let key = key.clone();
        async move { router.route_owner(&key).is_none() }
    })
    .await
}

#[tokio::test]
async fn test_idempotent_reregistration_emits_one_event() {
    let registry = ServiceRegistry::new();
    let (_id, mut rx) = registry.subscribe(16);

    let first = registry.register_service(simple_service("a", "1", "/x")).unwrap();
    let second = registry.register_service(simple_service("a", "1", "/x")).unwrap();
    assert!(first.success);
    assert!(second.success);

    assert!(rx.try_recv().is_ok());
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_version_bump_swaps_routes() {
    let registry = Arc::new(ServiceRegistry::new());
    let router = router();
    let watch = router.start(registry.clone(), 16);

    registry.register_service(simple_service("a", "1", "/r1")).unwrap();
    assert!(owned_by(&router, get("/r1"), "a").await);

    registry.register_service(simple_service("a", "2", "/r2")).unwrap();
    assert!(owned_by(&router, get("/r2"), "a").await);
    assert!(unowned(&router, get("/r1")).await);
    assert_eq!(router.service_routes("a"), vec![get("/r2")]);

    watch.stop().await;
}

#[tokio::test]
async fn test_conflicting_route_keeps_first_owner() {
    let registry = Arc::new(ServiceRegistry::new());
    let router = router();
    let watch = router.start(registry.clone(), 16);

    registry.register_service(simple_service("a", "1", "/x")).unwrap();
    let b = ServiceInfo::new("b", "1", "http://127.0.0.1:9001")
        .with_routes([RouteDefinition::get("/x"), RouteDefinition::get("/y")]);
    let reply = registry.register_service(b).unwrap();
    assert!(reply.success);

    assert!(owned_by(&router, get("/y"), "b").await);
    assert_eq!(router.route_owner(&get("/x")).unwrap().name, "a");
    assert_eq!(router.service_routes("b"), vec![get("/y")]);

    watch.stop().await;
}

#[tokio::test]
async fn test_conflicting_route_is_free_after_owner_leaves() {
    let registry = Arc::new(ServiceRegistry::new());
    let router = router();
    let watch = router.start(registry.clone(), 16);

    registry.register_service(simple_service("a", "1", "/x")).unwrap();
    assert!(owned_by(&router, get("/x"), "a").await);
    registry.deregister_service("a").unwrap();
    assert!(unowned(&router, get("/x")).await);

    registry.register_service(simple_service("b", "1", "/x")).unwrap();
    assert!(owned_by(&router, get("/x"), "b").await);

    watch.stop().await;
}

#[tokio::test]
async fn test_soft_deregistration() {
    let registry = ServiceRegistry::new();
    let reply = registry.deregister_service("never-registered").unwrap();
    assert!(!reply.success);
    assert_eq!(reply.message, "service not found");
}

#[tokio::test]
async fn test_snapshot_loads_only_healthy_services() {
    let registry = Arc::new(ServiceRegistry::new());
    registry.register_service(products_service("http://127.0.0.1:9000")).unwrap();
    registry.register_service(simple_service("sick", "1", "/sick")).unwrap();
    registry.record_health("sick", ServiceStatus::Unhealthy);

    let router = router();
    let watch = router.start(registry.clone(), 16);

    assert_eq!(router.route_owner(&get("/products")).unwrap().name, "products");
    assert!(router.route_owner(&RouteKey::health("products")).is_some());
    assert!(router.route_owner(&get("/sick")).is_none());

    watch.stop().await;
}

#[tokio::test]
async fn test_removed_service_is_route_not_found() {
    let registry = Arc::new(ServiceRegistry::new());
    let router = router();
    let watch = router.start(registry.clone(), 16);

    registry.register_service(simple_service("a", "1", "/gone")).unwrap();
    assert!(owned_by(&router, get("/gone"), "a").await);
    registry.deregister_service("a").unwrap();
    assert!(unowned(&router, get("/gone")).await);

    let response = router
        .dispatch(Request::get("/api/v1/gone").body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["error"], "route no longer available");
    assert_eq!(body["route"], "GET /gone");

    let response = router
        .dispatch(Request::get("/api/v1/never-bound").body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    watch.stop().await;
}

#[test]
fn test_rate_limit_allow_allow_deny() {
    let limiter = RateLimiter::new(1.0 / 60.0, 2);
    assert!(limiter.allow("10.0.0.1"));
    assert!(limiter.allow("10.0.0.1"));
    assert!(!limiter.allow("10.0.0.1"));

    // other addresses have their own bucket
    assert!(limiter.allow("10.0.0.2"));
}
