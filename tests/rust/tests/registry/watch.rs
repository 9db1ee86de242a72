//! Watch stream (server-sent events)

use futures::StreamExt;
use pretty_assertions::assert_eq;
use routemesh_core::{ServiceUpdate, ServiceUpdateType};
use std::time::Duration;
use tests::fixtures::products_service;
use tests::harness::{eventually, TestGateway};

/// Read the stream until `count` `service_update` events have arrived
async fn read_updates(response: reqwest::Response, count: usize) -> Vec<ServiceUpdate> {
    let mut stream = response.bytes_stream();
    let mut buffer = String::new();
    let mut updates = Vec::new();

    while updates.len() < count {
        let chunk = tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .expect("timed out waiting for watch event")
            .expect("watch stream ended")
            .unwrap();
        buffer.push_str(&String::from_utf8_lossy(&chunk));

        while let Some(end) = buffer.find("\n\n") {
            let frame: String = buffer.drain(..end + 2).collect();
            if !frame.lines().any(|l| l == "event: service_update") {
                continue;
            }
            let data = frame
                .lines()
                .find_map(|l| l.strip_prefix("data: "))
                .unwrap();
            updates.push(serde_json::from_str(data).unwrap());
        }
    }
    updates
}

#[tokio::test]
async fn test_watch_streams_registry_changes() {
    let gateway = TestGateway::with_defaults().await;
    let registry = gateway.registry.clone();

    let response = reqwest::Client::new()
        .get(format!("http://{}/registry/v1/watch", gateway.registry_addr))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());

    // router listener plus this stream
    let attached = eventually(|| {
        let r = registry.clone();
        async move { r.listener_count() == 2 }
    })
    .await;
    assert!(attached);

    registry
        .register_service(products_service("http://127.0.0.1:9000"))
        .unwrap();
    // same version again: no event
    registry
        .register_service(products_service("http://127.0.0.1:9000"))
        .unwrap();
    let mut v2 = products_service("http://127.0.0.1:9001");
    v2.version = "2.0.0".to_string();
    registry.register_service(v2).unwrap();
    registry.deregister_service("products").unwrap();

    let updates = read_updates(response, 3).await;
    let kinds: Vec<ServiceUpdateType> = updates.iter().map(|u| u.event_type).collect();
    assert_eq!(
        kinds,
        vec![
            ServiceUpdateType::Added,
            ServiceUpdateType::Updated,
            ServiceUpdateType::Removed
        ]
    );
    assert_eq!(updates[1].service.version, "2.0.0");
    assert_eq!(updates[1].service.url, "http://127.0.0.1:9001");

    gateway.stop().await;
}

#[tokio::test]
async fn test_watch_listener_detached_on_disconnect() {
    let gateway = TestGateway::with_defaults().await;
    let registry = gateway.registry.clone();

    let response = reqwest::Client::new()
        .get(format!("http://{}/registry/v1/watch", gateway.registry_addr))
        .send()
        .await
        .unwrap();
    let attached = eventually(|| {
        let r = registry.clone();
        async move { r.listener_count() == 2 }
    })
    .await;
    assert!(attached);

    drop(response);

    // detached at the latest when the next event hits the closed channel
    let detached = eventually(|| {
        let r = registry.clone();
        async move {
            let _ = r.register_service(products_service("http://127.0.0.1:9000"));
            let _ = r.deregister_service("products");
            r.listener_count() == 1
        }
    })
    .await;
    assert!(detached);

    gateway.stop().await;
}
