use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use super::{RouteDefinition, RouteKey, ServiceStatus};
use crate::{RegistryError, Result};

/// Characters a service name may not carry; the name is a URL path segment
/// in the registry RPC and in the health route
const RESERVED_NAME_CHARS: &[char] = &['/', '?', '#', '%', '\\'];

/// One registered backend service.
///
/// `name` is the registry key. `registered_at` and `last_health_check`
/// are stamped by the registry; values sent by a client are overwritten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub name: String,

    /// Opaque; a different value on re-registration is an update
    pub version: String,

    /// Base address requests are proxied to
    pub url: String,

    /// Path appended to `url` for health checks (e.g. "/health")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_endpoint: Option<String>,

    #[serde(default)]
    pub routes: Vec<RouteDefinition>,

    #[serde(default)]
    pub status: ServiceStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registered_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_health_check: Option<DateTime<Utc>>,
}

impl ServiceInfo {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            url: url.into(),
            health_endpoint: None,
            routes: Vec::new(),
            status: ServiceStatus::Unknown,
            registered_at: None,
            last_health_check: None,
        }
    }

    pub fn with_health_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.health_endpoint = Some(endpoint.into());
        self
    }

    pub fn with_route(mut self, route: RouteDefinition) -> Self {
        self.routes.push(route);
        self
    }

    pub fn with_routes(mut self, routes: impl IntoIterator<Item = RouteDefinition>) -> Self {
        self.routes.extend(routes);
        self
    }

    pub fn with_status(mut self, status: ServiceStatus) -> Self {
        self.status = status;
        self
    }

    /// Check the fields a registration must carry.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(RegistryError::invalid("service name is required"));
        }
        if self
            .name
            .chars()
            .any(|c| c.is_whitespace() || c.is_control() || RESERVED_NAME_CHARS.contains(&c))
        {
            return Err(RegistryError::invalid(format!(
                "invalid service name: {:?}",
                self.name
            )));
        }
        if self.version.trim().is_empty() {
            return Err(RegistryError::invalid("service version is required"));
        }
        if self.url.trim().is_empty() {
            return Err(RegistryError::invalid("service url is required"));
        }
        if self.routes.is_empty() {
            return Err(RegistryError::invalid("at least one route is required"));
        }

        let parsed = Url::parse(&self.url)
            .map_err(|e| RegistryError::invalid(format!("invalid service url: {}", e)))?;
        if !matches!(parsed.scheme(), "http" | "https") || parsed.host().is_none() {
            return Err(RegistryError::invalid(format!(
                "invalid service url: {}",
                self.url
            )));
        }

        if let Some(route) = self.routes.iter().find(|r| !r.path.starts_with('/')) {
            return Err(RegistryError::invalid(format!(
                "route path must start with '/': {}",
                route.path
            )));
        }

        Ok(())
    }

    pub fn has_health_endpoint(&self) -> bool {
        self.health_endpoint
            .as_deref()
            .is_some_and(|e| !e.trim().is_empty())
    }

    /// `{url}{health_endpoint}`, when a health endpoint is declared
    pub fn health_url(&self) -> Option<String> {
        self.health_endpoint
            .as_deref()
            .filter(|e| !e.trim().is_empty())
            .map(|endpoint| join_url(&self.url, endpoint))
    }

    /// URL polled by the health monitor; falls back to `{url}/health`
    pub fn health_probe_url(&self) -> String {
        self.health_url()
            .unwrap_or_else(|| join_url(&self.url, "/health"))
    }

    /// Route keys this service claims, including the synthesized health route
    pub fn route_keys(&self) -> Vec<RouteKey> {
        let mut keys: Vec<RouteKey> = self.routes.iter().map(RouteDefinition::key).collect();
        if self.has_health_endpoint() {
            keys.push(RouteKey::health(&self.name));
        }
        keys
    }
}

fn join_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    if path.starts_with('/') {
        format!("{}{}", base, path)
    } else {
        format!("{}/{}", base, path)
    }
}
