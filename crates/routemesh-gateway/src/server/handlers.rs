//! Gateway admin handlers

use axum::{extract::State, response::Json};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

use routemesh_core::ServiceInfo;
use routemesh_registry::ServiceRegistry;

use crate::config::GatewayConfig;
use crate::router::DynamicRouter;

/// State shared by the admin handlers and the proxy fallback
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub registry: Arc<ServiceRegistry>,
    pub router: Arc<DynamicRouter>,
}

impl axum::extract::FromRef<AppState> for Arc<DynamicRouter> {
    fn from_ref(state: &AppState) -> Self {
        state.router.clone()
    }
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

pub async fn gateway_health() -> Json<HealthResponse> {
    debug!("[Gateway] Health check");
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "gateway".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[derive(Serialize)]
pub struct ServicesResponse {
    pub total_services: usize,
    pub services: Vec<ServiceInfo>,
}

/// Every registered service, for operators
pub async fn list_services(State(state): State<AppState>) -> Json<ServicesResponse> {
    let services = state.registry.get_services();
    Json(ServicesResponse {
        total_services: services.len(),
        services,
    })
}

#[derive(Serialize)]
pub struct InfoResponse {
    pub service: String,
    pub version: String,
    pub mode: String,
    pub http_port: u16,
    pub registry_port: u16,
    pub api_prefix: String,
    pub services: usize,
    pub routes: usize,
    pub bindings: usize,
    pub auth: &'static str,
}

pub async fn gateway_info(State(state): State<AppState>) -> Json<InfoResponse> {
    let config = &state.config;
    Json(InfoResponse {
        service: "routemesh-gateway".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        mode: config.mode.clone(),
        http_port: config.port,
        registry_port: config.registry_port,
        api_prefix: config.api_prefix.clone(),
        services: state.registry.service_count(),
        routes: state.router.route_count(),
        bindings: state.router.binding_count(),
        auth: if config.jwt_secret.is_some() { "jwt" } else { "bearer-presence" },
    })
}
