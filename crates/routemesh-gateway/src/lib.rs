//! RouteMesh Gateway
//!
//! Single entry point for a fleet of HTTP services. Services register over
//! the registry RPC listener; the gateway turns registry changes into a
//! live route table and reverse-proxies matching traffic:
//!
//! - **router**: route table, bindings, dispatch (rate limit, auth, proxy)
//! - **proxy**: target selection and streaming forwarder
//! - **auth**: bearer-token identity and header propagation
//! - **rate_limit**: token buckets keyed by client address
//! - **server**: listeners, admin endpoints, middleware and shutdown

pub mod auth;
pub mod config;
pub mod error;
pub mod logging;
pub mod proxy;
pub mod rate_limit;
pub mod router;
pub mod server;

pub use auth::{authenticate, BearerPresenceValidator, Identity, IdentityValidator, JwtValidator};
pub use config::{ConfigError, GatewayConfig};
pub use error::GatewayError;
pub use proxy::{ForwardContext, ProxyTarget, ReverseProxy};
pub use rate_limit::RateLimiter;
pub use router::{DynamicRouter, RouterConfig, WatchHandle};
pub use server::{cancel_on_signal, shutdown_signal, AppState, GatewayServer};
