//! Gateway Server
//!
//! Owns both listeners: the public HTTP listener (admin routes plus the
//! dynamic proxy fallback) and the registry RPC listener. Wires the
//! registry, the router's watch loop, the health monitor and the
//! rate-limit reaper together, and drains everything on shutdown.

mod handlers;
pub mod logging_middleware;
mod shutdown;

pub use handlers::AppState;
pub use shutdown::{cancel_on_signal, shutdown_signal};

use anyhow::Context;
use axum::{
    http::HeaderValue,
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any as CorsAny, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use routemesh_registry::{registry_router, HealthMonitor, ServiceRegistry};

use crate::auth::{BearerPresenceValidator, IdentityValidator, JwtValidator};
use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::proxy::ReverseProxy;
use crate::router::{proxy_fallback, DynamicRouter, RouterConfig};

pub const GATEWAY_HEADER: &str = "x-gateway";

/// Gateway process: registry, router and both HTTP surfaces
pub struct GatewayServer {
    config: Arc<GatewayConfig>,
    registry: Arc<ServiceRegistry>,
    router: Arc<DynamicRouter>,
}

impl GatewayServer {
    /// Gateway with a fresh, empty registry
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        Self::with_registry(config, Arc::new(ServiceRegistry::new()))
    }

    pub fn with_registry(
        config: GatewayConfig,
        registry: Arc<ServiceRegistry>,
    ) -> Result<Self, GatewayError> {
        info!("[Gateway] Initializing...");

        let validator: Arc<dyn IdentityValidator> = match &config.jwt_secret {
            Some(secret) => {
                info!("[Gateway] JWT validation: enabled (HS256)");
                Arc::new(JwtValidator::new(secret))
            }
            None => {
                warn!("[Gateway] JWT validation: disabled (no secret configured), protected routes only require a bearer token");
                Arc::new(BearerPresenceValidator)
            }
        };

        let router = Arc::new(DynamicRouter::new(
            RouterConfig {
                api_prefix: config.api_prefix.clone(),
                default_rate_limit: config.rate_limit_count,
                default_timeout: config.proxy_timeout,
            },
            ReverseProxy::new()?,
            validator,
        ));

        Ok(Self {
            config: Arc::new(config),
            registry,
            router,
        })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn registry(&self) -> Arc<ServiceRegistry> {
        self.registry.clone()
    }

    pub fn router(&self) -> Arc<DynamicRouter> {
        self.router.clone()
    }

    pub fn state(&self) -> AppState {
        AppState {
            config: self.config.clone(),
            registry: self.registry.clone(),
            router: self.router.clone(),
        }
    }

    /// Public router: admin routes, everything else through the proxy
    pub fn gateway_app(&self) -> Router {
        let mut app = Router::new()
            .route("/gateway/health", get(handlers::gateway_health))
            .route("/gateway/services", get(handlers::list_services))
            .route("/gateway/info", get(handlers::gateway_info))
            .fallback(proxy_fallback)
            .with_state(self.state())
            .layer(middleware::from_fn(
                logging_middleware::http_logging_middleware,
            ))
            .layer(CatchPanicLayer::custom(handle_panic))
            .layer(middleware::map_response(add_gateway_header))
            .layer(TraceLayer::new_for_http());

        if self.config.enable_cors {
            let cors = CorsLayer::new()
                .allow_origin(CorsAny)
                .allow_methods(CorsAny)
                .allow_headers(CorsAny);
            app = app.layer(cors);
        }

        app
    }

    /// Registry RPC router
    pub fn registry_app(&self) -> Router {
        registry_router(self.registry.clone())
            .layer(CatchPanicLayer::custom(handle_panic))
            .layer(TraceLayer::new_for_http())
    }

    /// Run until `shutdown` is cancelled, then drain within the grace period.
    pub async fn run(self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let http_addr = self.config.addr();
        let registry_addr = self.config.registry_addr();

        let http_listener = TcpListener::bind(&http_addr)
            .await
            .with_context(|| format!("failed to bind gateway listener on {}", http_addr))?;
        let registry_listener = TcpListener::bind(&registry_addr)
            .await
            .with_context(|| format!("failed to bind registry listener on {}", registry_addr))?;

        info!(
            "[Gateway] HTTP on {}, registry on {} (mode={}, prefix={:?})",
            http_listener.local_addr()?,
            registry_listener.local_addr()?,
            self.config.mode,
            self.config.api_prefix
        );

        let watch = self
            .router
            .start(self.registry.clone(), self.config.listener_buffer);

        let health = match self.config.health_check_interval {
            Some(interval) => Some(
                HealthMonitor::new(self.registry.clone(), interval)
                    .context("failed to build health monitor")?
                    .spawn(shutdown.clone()),
            ),
            None => {
                info!("[Gateway] Health monitor disabled");
                None
            }
        };

        let reaper = self
            .config
            .rate_limit_idle_ttl
            .map(|ttl| spawn_bucket_reaper(self.router.clone(), ttl, shutdown.clone()));

        let http_task = serve(http_listener, self.gateway_app(), shutdown.clone(), "gateway");
        let registry_task = serve(registry_listener, self.registry_app(), shutdown.clone(), "registry");
        let http_abort = http_task.abort_handle();
        let registry_abort = registry_task.abort_handle();

        shutdown.cancelled().await;
        info!(
            "[Gateway] Shutting down (grace {:?})",
            self.config.shutdown_grace
        );

        // ends the router's watch loop and any open watch streams
        self.registry.close_listeners();

        let mut failures = Vec::new();
        match tokio::time::timeout(self.config.shutdown_grace, async {
            (http_task.await, registry_task.await)
        })
        .await
        {
            Ok((http, registry)) => {
                for (name, result) in [("gateway", http), ("registry", registry)] {
                    match result {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => failures.push(format!("{} server: {}", name, e)),
                        Err(e) => failures.push(format!("{} server task: {}", name, e)),
                    }
                }
            }
            Err(_) => {
                warn!("[Gateway] Grace period elapsed, aborting remaining connections");
                http_abort.abort();
                registry_abort.abort();
            }
        }

        let applied = watch.stop().await;
        info!("[Gateway] Router applied {} updates", applied);
        if let Some(task) = health {
            let _ = task.await;
        }
        if let Some(task) = reaper {
            let _ = task.await;
        }

        if failures.is_empty() {
            info!("[Gateway] Stopped");
            Ok(())
        } else {
            anyhow::bail!(failures.join("; "))
        }
    }
}

/// Serve `app` until `shutdown`; an early exit cancels `shutdown` too.
fn serve(
    listener: TcpListener,
    app: Router,
    shutdown: CancellationToken,
    name: &'static str,
) -> JoinHandle<std::io::Result<()>> {
    tokio::spawn(async move {
        let signal = shutdown.clone();
        let result = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move { signal.cancelled().await })
        .await;

        if let Err(e) = &result {
            error!("[Gateway] {} server failed: {}", name, e);
        }
        shutdown.cancel();
        result
    })
}

fn spawn_bucket_reaper(
    router: Arc<DynamicRouter>,
    ttl: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("[Gateway] Evicting rate-limit buckets idle for {:?}", ttl);
        let mut ticker = tokio::time::interval(ttl);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    router.evict_idle_buckets(ttl);
                }
            }
        }
    })
}

async fn add_gateway_header(mut response: Response) -> Response {
    response
        .headers_mut()
        .insert(GATEWAY_HEADER, HeaderValue::from_static("routemesh"));
    response
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    error!("[Gateway] Handler panicked: {}", detail);
    GatewayError::Internal(detail).into_response()
}
