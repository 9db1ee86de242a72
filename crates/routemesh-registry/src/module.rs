//! Backend module contract
//!
//! Every module of a backend service implements `ModulePort`. The service
//! mounts its handlers through `register_routes` and the registry client
//! reads `route_definitions` to build the registration payload, so nothing
//! has to branch on the concrete module type.

use axum::Router;
use std::sync::Arc;

use routemesh_core::RouteDefinition;

pub trait ModulePort: Send + Sync {
    /// Prefix every route of this module is mounted under (e.g. "/products")
    fn path_prefix(&self) -> &str;

    /// Routes relative to `path_prefix`
    fn route_definitions(&self) -> Vec<RouteDefinition>;

    /// Mount this module's handlers onto the service's own router
    fn register_routes(&self, router: Router) -> Router;
}

/// All routes of `modules`, each prefixed with its module's `path_prefix`
pub fn aggregate_routes(modules: &[Arc<dyn ModulePort>]) -> Vec<RouteDefinition> {
    modules
        .iter()
        .flat_map(|module| {
            let prefix = module.path_prefix().to_string();
            module
                .route_definitions()
                .into_iter()
                .map(move |route| route.prefixed(&prefix))
        })
        .collect()
}

pub fn register_all_routes(modules: &[Arc<dyn ModulePort>], router: Router) -> Router {
    modules
        .iter()
        .fold(router, |router, module| module.register_routes(router))
}
