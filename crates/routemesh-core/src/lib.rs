//! # RouteMesh Core Library
//!
//! Domain types shared by the registry, the gateway and backend services.
//!
//! ## Modules
//!
//! - `domain` - Services, routes, statuses and registry change events
//! - `dto` - Request/response bodies of the registry RPC surface
//! - `error` - `RegistryError`, the error type of every registry operation

pub mod domain;
pub mod dto;
pub mod error;

// Re-export commonly used types
pub use domain::*;
pub use dto::*;
pub use error::{RegistryError, Result};
