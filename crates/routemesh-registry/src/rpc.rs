//! Registry RPC surface
//!
//! HTTP/JSON binding of the registry operations, served on the registry
//! listener. The watch endpoint is a server-sent event stream; each open
//! stream is one update listener, detached when the client goes away.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{delete, get, post},
    Json, Router,
};
use futures::Stream;
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{debug, warn};

use routemesh_core::{
    ErrorBody, RegisterServiceRequest, RegistryError, RegistryReply, ServiceInfo,
    ServicesResponse, SERVICE_UPDATE_EVENT,
};

use crate::store::{ListenerId, ServiceRegistry};

/// Buffer of each watch stream's listener channel
const WATCH_BUFFER: usize = 64;

/// Build the registry router (paths already include `/registry/v1`)
pub fn registry_router(registry: Arc<ServiceRegistry>) -> Router {
    Router::new()
        .route(
            "/registry/v1/services",
            post(register_service).get(list_services),
        )
        .route("/registry/v1/services/", delete(deregister_without_name))
        .route(
            "/registry/v1/services/{name}",
            get(get_service).delete(deregister_service),
        )
        .route("/registry/v1/watch", get(watch_services))
        .route("/registry/v1/health", get(health))
        .with_state(registry)
}

/// `RegistryError` rendered as `{"error": ...}` with a matching status
pub struct RpcError(RegistryError);

impl From<RegistryError> for RpcError {
    fn from(err: RegistryError) -> Self {
        Self(err)
    }
}

impl IntoResponse for RpcError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            RegistryError::InvalidArgument(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            RegistryError::NotFound(_) => (StatusCode::NOT_FOUND, "service not found".to_string()),
            RegistryError::Transport(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
            RegistryError::Rejected(msg) => (StatusCode::CONFLICT, msg.clone()),
        };
        (status, Json(ErrorBody::new(message))).into_response()
    }
}

async fn register_service(
    State(registry): State<Arc<ServiceRegistry>>,
    body: Result<Json<RegisterServiceRequest>, JsonRejection>,
) -> Result<Json<RegistryReply>, RpcError> {
    let Json(request) =
        body.map_err(|e| RegistryError::invalid(format!("invalid request body: {}", e.body_text())))?;
    debug!("[Registry] RPC register {}", request.service.name);
    Ok(Json(registry.register_service(request.service)?))
}

async fn deregister_service(
    State(registry): State<Arc<ServiceRegistry>>,
    Path(name): Path<String>,
) -> Result<Json<RegistryReply>, RpcError> {
    debug!("[Registry] RPC deregister {}", name);
    Ok(Json(registry.deregister_service(&name)?))
}

async fn deregister_without_name() -> RpcError {
    RpcError(RegistryError::invalid("service name is required"))
}

async fn list_services(State(registry): State<Arc<ServiceRegistry>>) -> Json<ServicesResponse> {
    Json(ServicesResponse {
        services: registry.get_services(),
    })
}

async fn get_service(
    State(registry): State<Arc<ServiceRegistry>>,
    Path(name): Path<String>,
) -> Result<Json<ServiceInfo>, RpcError> {
    registry
        .get_service(&name)
        .map(Json)
        .ok_or_else(|| RpcError(RegistryError::NotFound(name)))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// Detaches the watch listener when the SSE stream is dropped
struct WatchGuard {
    registry: Arc<ServiceRegistry>,
    id: ListenerId,
}

impl Drop for WatchGuard {
    fn drop(&mut self) {
        self.registry.unregister_update_listener(self.id);
        debug!("[Registry] Watch stream {} closed", self.id);
    }
}

async fn watch_services(
    State(registry): State<Arc<ServiceRegistry>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (id, mut rx) = registry.subscribe(WATCH_BUFFER);
    debug!("[Registry] Watch stream {} opened", id);
    let guard = WatchGuard { registry, id };

    let stream = async_stream::stream! {
        let _guard = guard;
        while let Some(update) = rx.recv().await {
            match Event::default().event(SERVICE_UPDATE_EVENT).json_data(&update) {
                Ok(event) => yield Ok(event),
                Err(e) => warn!("[Registry] Failed to encode update for {}: {}", update.service.name, e),
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}
