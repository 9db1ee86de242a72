//! Domain entities

mod event;
mod route;
mod service;
mod status;

pub use event::{ServiceUpdate, ServiceUpdateType};
pub use route::{HttpMethod, RouteDefinition, RouteKey};
pub use service::ServiceInfo;
pub use status::ServiceStatus;
