//! # RouteMesh Service Registry
//!
//! Authoritative in-memory directory of backend services and the
//! change-notification channel the gateway's router consumes.
//!
//! ## Modules
//!
//! - `store` - `ServiceRegistry`, the locked service map and listener fan-out
//! - `rpc` - HTTP/JSON surface (register, deregister, list, SSE watch)
//! - `client` - `RegistryClient`, embedded in backend services
//! - `module` - `ModulePort`, the uniform contract of a backend module
//! - `health` - background health monitor

pub mod client;
pub mod health;
pub mod module;
pub mod rpc;
pub mod store;

pub use client::{RegistryClient, RegistryClientConfig};
pub use health::{HealthMonitor, HEALTH_CHECK_TIMEOUT};
pub use module::{aggregate_routes, register_all_routes, ModulePort};
pub use rpc::registry_router;
pub use store::{ListenerId, ServiceRegistry};
