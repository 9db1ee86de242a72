//! Dynamic Router
//!
//! Turns registry state into the live route table and serves proxied
//! traffic. Three structures sit behind one lock:
//!
//! - route table: route key -> owning service
//! - registered-routes index: service name -> route keys it owns
//! - binding table: what the HTTP fallback can dispatch
//!
//! The table and index are only written by `apply_update` (called from the
//! single watch task); request handlers only read.

mod table;
mod watch;

pub use table::{Binding, BindingKind, BindingTable, PathPattern, RoutePolicy};
pub use watch::WatchHandle;

use axum::{
    extract::{Request, State},
    response::{IntoResponse, Response},
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use routemesh_core::{HttpMethod, RouteKey, ServiceInfo, ServiceUpdate, ServiceUpdateType};

use crate::auth::{authenticate, IdentityValidator};
use crate::error::GatewayError;
use crate::logging::TraceContext;
use crate::proxy::{ForwardContext, ProxyTarget, ReverseProxy, REQUEST_ID_HEADER};
use crate::rate_limit::{client_addr, peer_addr, RateLimiter};

/// Router settings derived from the gateway config
#[derive(Debug, Clone)]
pub struct RouterConfig {
    pub api_prefix: String,
    /// Requests per minute for routes that declare no limit
    pub default_rate_limit: u32,
    pub default_timeout: Duration,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            api_prefix: "/api/v1".to_string(),
            default_rate_limit: 100,
            default_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Default)]
struct RouterState {
    route_to_service: HashMap<RouteKey, Arc<ServiceInfo>>,
    registered_routes: HashMap<String, Vec<RouteKey>>,
    bindings: BindingTable,
}

pub struct DynamicRouter {
    config: RouterConfig,
    state: RwLock<RouterState>,
    proxy: ReverseProxy,
    validator: Arc<dyn IdentityValidator>,
}

impl DynamicRouter {
    pub fn new(
        config: RouterConfig,
        proxy: ReverseProxy,
        validator: Arc<dyn IdentityValidator>,
    ) -> Self {
        Self {
            config,
            state: RwLock::new(RouterState::default()),
            proxy,
            validator,
        }
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Add the routes of every healthy service in `services`
    pub fn load_snapshot(&self, services: &[ServiceInfo]) -> usize {
        let mut state = self.state.write();
        let mut loaded = 0;
        for service in services.iter().filter(|s| s.status.is_healthy()) {
            self.add_service_routes(&mut state, service);
            loaded += 1;
        }
        info!(
            "[Router] Loaded {} of {} services from snapshot",
            loaded,
            services.len()
        );
        loaded
    }

    /// Apply one registry event to the route table
    pub fn apply_update(&self, update: &ServiceUpdate) {
        let mut state = self.state.write();
        let service = &update.service;

        match update.event_type {
            ServiceUpdateType::Added => {
                info!("[Router] Adding service {}", service.name);
                self.add_service_routes(&mut state, service);
            }
            ServiceUpdateType::Removed => {
                info!("[Router] Removing service {}", service.name);
                Self::remove_service_routes(&mut state, &service.name);
            }
            ServiceUpdateType::Updated => {
                info!("[Router] Updating service {} to v{}", service.name, service.version);
                Self::remove_service_routes(&mut state, &service.name);
                self.add_service_routes(&mut state, service);
            }
        }
    }

    fn add_service_routes(&self, state: &mut RouterState, service: &ServiceInfo) -> Vec<RouteKey> {
        let owner = Arc::new(service.clone());
        let mut owned: Vec<RouteKey> = Vec::with_capacity(service.routes.len() + 1);

        for route in &service.routes {
            let key = route.key();
            if !Self::claim(state, &key, &owner) || owned.contains(&key) {
                continue;
            }

            let limit = if route.rate_limit > 0 {
                route.rate_limit
            } else {
                self.config.default_rate_limit
            };
            let policy = RoutePolicy {
                limiter: Arc::new(RateLimiter::per_minute(limit)),
                protected: route.protected,
                timeout: route.timeout_duration().unwrap_or(self.config.default_timeout),
            };
            let path = format!("{}{}", self.config.api_prefix, route.path);
            state.bindings.bind(key.clone(), BindingKind::Service, &path, policy);

            debug!(
                "[Router] {} {} -> {}{}",
                key.method,
                path,
                service.name,
                if route.protected { " (protected)" } else { "" }
            );
            owned.push(key);
        }

        if service.has_health_endpoint() {
            let key = RouteKey::health(&service.name);
            if Self::claim(state, &key, &owner) {
                let policy = RoutePolicy {
                    limiter: Arc::new(RateLimiter::per_minute(self.config.default_rate_limit)),
                    protected: false,
                    timeout: self.config.default_timeout,
                };
                let path = key.path.clone();
                state.bindings.bind(key.clone(), BindingKind::Health, &path, policy);
                owned.push(key);
            }
        }

        info!(
            "[Router] {} v{} owns {} routes",
            service.name,
            service.version,
            owned.len()
        );
        state
            .registered_routes
            .insert(service.name.clone(), owned.clone());
        owned
    }

    /// Record `owner` for `key` unless another service already owns it, or
    /// any service owns a different key matching the same requests
    fn claim(state: &mut RouterState, key: &RouteKey, owner: &Arc<ServiceInfo>) -> bool {
        if let Some(current) = state.route_to_service.get(key) {
            if current.name != owner.name {
                warn!(
                    "[Router] Route conflict: {} already owned by {}, skipping for {}",
                    key, current.name, owner.name
                );
                return false;
            }
        } else if let Some((existing, current)) = Self::equivalent_owner(state, key) {
            warn!(
                "[Router] Route conflict: {} overlaps {} owned by {}, skipping for {}",
                key, existing, current.name, owner.name
            );
            return false;
        }
        state.route_to_service.insert(key.clone(), owner.clone());
        true
    }

    /// Owned key with the same method and path shape as `key` but a different path
    fn equivalent_owner<'a>(
        state: &'a RouterState,
        key: &RouteKey,
    ) -> Option<(&'a RouteKey, &'a Arc<ServiceInfo>)> {
        let pattern = PathPattern::parse(&key.path);
        state.route_to_service.iter().find(|(owned, _)| {
            owned.method == key.method
                && owned.path != key.path
                && PathPattern::parse(&owned.path).same_shape(&pattern)
        })
    }

    fn remove_service_routes(state: &mut RouterState, name: &str) -> usize {
        let Some(keys) = state.registered_routes.remove(name) else {
            debug!("[Router] No routes registered for {}", name);
            return 0;
        };

        for key in &keys {
            let owned_by_service = state
                .route_to_service
                .get(key)
                .is_some_and(|owner| owner.name == name);
            if owned_by_service {
                state.route_to_service.remove(key);
            }
        }
        info!("[Router] Released {} routes of {}", keys.len(), name);
        keys.len()
    }

    /// Current owner of `key`
    pub fn route_owner(&self, key: &RouteKey) -> Option<Arc<ServiceInfo>> {
        self.state.read().route_to_service.get(key).cloned()
    }

    /// Route keys owned by `service_name`
    pub fn service_routes(&self, service_name: &str) -> Vec<RouteKey> {
        self.state
            .read()
            .registered_routes
            .get(service_name)
            .cloned()
            .unwrap_or_default()
    }

    pub fn route_count(&self) -> usize {
        self.state.read().route_to_service.len()
    }

    pub fn binding_count(&self) -> usize {
        self.state.read().bindings.len()
    }

    /// Drop idle rate-limit buckets of every bound route
    pub fn evict_idle_buckets(&self, ttl: Duration) -> usize {
        let state = self.state.read();
        state
            .bindings
            .iter()
            .map(|binding| binding.policy.limiter.evict_idle(ttl))
            .sum()
    }

    /// Serve one request: rate limit, then auth for protected routes, then
    /// proxy to the owner looked up now.
    pub async fn dispatch(&self, request: Request) -> Response {
        match self.try_dispatch(request).await {
            Ok(response) => response,
            Err(err) => err.into_response(),
        }
    }

    async fn try_dispatch(&self, request: Request) -> Result<Response, GatewayError> {
        let method: HttpMethod = request
            .method()
            .as_str()
            .parse()
            .map_err(|_| GatewayError::route_not_found())?;

        let (key, kind, policy) = {
            let state = self.state.read();
            let binding = state
                .bindings
                .lookup(method, request.uri().path())
                .ok_or_else(GatewayError::route_not_found)?;
            (binding.key.clone(), binding.kind, binding.policy.clone())
        };

        let client = client_addr(request.headers(), peer_addr(&request));
        if let Err(retry_after) = policy.limiter.check(&client) {
            debug!("[Router] Rate limited {} on {}", client, key);
            return Err(GatewayError::RateLimited { retry_after });
        }

        let identity = if policy.protected {
            Some(authenticate(request.headers(), self.validator.as_ref())?)
        } else {
            None
        };

        let service = self
            .route_owner(&key)
            .ok_or_else(|| GatewayError::route_unavailable(key.to_string()))?;

        let target = match kind {
            BindingKind::Service => ProxyTarget::for_route(
                &service,
                request.uri(),
                &self.config.api_prefix,
                policy.timeout,
            )?,
            BindingKind::Health => ProxyTarget::for_health(&service, policy.timeout)?,
        };

        let request_id = request
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(String::from)
            .or_else(|| {
                request
                    .extensions()
                    .get::<TraceContext>()
                    .map(|ctx| ctx.trace_id.clone())
            });

        let ctx = ForwardContext {
            client_addr: client,
            request_id,
            identity,
        };
        self.proxy.forward(target, request, ctx).await
    }
}

/// axum fallback handler for everything not served by the admin routes
pub async fn proxy_fallback(State(router): State<Arc<DynamicRouter>>, request: Request) -> Response {
    router.dispatch(request).await
}
