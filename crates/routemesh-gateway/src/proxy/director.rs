//! Request rewrite rules
//!
//! The forwarding target is computed into a per-request `ProxyTarget`
//! from the live `ServiceInfo`; nothing shared is mutated per request.

use http::Uri;
use std::time::Duration;
use url::Url;

use routemesh_core::ServiceInfo;

use crate::error::GatewayError;

/// Where one request is forwarded to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyTarget {
    pub service_name: String,
    pub service_version: String,
    pub url: Url,
    pub timeout: Duration,
    pub health_check: bool,
}

impl ProxyTarget {
    /// Target for a service route: scheme and host of the service, inbound
    /// path minus `api_prefix`, service query merged before inbound query.
    pub fn for_route(
        service: &ServiceInfo,
        inbound: &Uri,
        api_prefix: &str,
        timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let base = parse_service_url(service)?;
        let path = strip_prefix(inbound.path(), api_prefix);
        let query = merge_query(base.query(), inbound.query());

        let mut url = base;
        url.set_path(&path);
        url.set_query(query.as_deref());

        Ok(Self {
            service_name: service.name.clone(),
            service_version: service.version.clone(),
            url,
            timeout,
            health_check: false,
        })
    }

    /// Target for the synthesized health route: always the declared health
    /// endpoint, inbound path and query ignored.
    pub fn for_health(service: &ServiceInfo, timeout: Duration) -> Result<Self, GatewayError> {
        let endpoint = service
            .health_endpoint
            .as_deref()
            .filter(|e| !e.trim().is_empty())
            .ok_or_else(|| GatewayError::route_unavailable(format!("GET /health/{}", service.name)))?;

        let mut url = parse_service_url(service)?;
        if endpoint.starts_with('/') {
            url.set_path(endpoint);
        } else {
            url.set_path(&format!("/{}", endpoint));
        }
        url.set_query(None);

        Ok(Self {
            service_name: service.name.clone(),
            service_version: service.version.clone(),
            url,
            timeout,
            health_check: true,
        })
    }
}

fn parse_service_url(service: &ServiceInfo) -> Result<Url, GatewayError> {
    Url::parse(&service.url).map_err(|e| {
        GatewayError::Internal(format!(
            "invalid service configuration for {}: {}",
            service.name, e
        ))
    })
}

/// Strip `prefix` from `path`; an empty result becomes "/"
pub fn strip_prefix(path: &str, prefix: &str) -> String {
    let stripped = if prefix.is_empty() {
        path
    } else {
        match path.strip_prefix(prefix) {
            Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
            _ => path,
        }
    };

    if stripped.is_empty() {
        "/".to_string()
    } else {
        stripped.to_string()
    }
}

/// Either side empty: use the other. Both set: target first, joined by `&`.
pub fn merge_query(target: Option<&str>, inbound: Option<&str>) -> Option<String> {
    let target = target.filter(|q| !q.is_empty());
    let inbound = inbound.filter(|q| !q.is_empty());
    match (target, inbound) {
        (None, None) => None,
        (Some(q), None) | (None, Some(q)) => Some(q.to_string()),
        (Some(t), Some(i)) => Some(format!("{}&{}", t, i)),
    }
}
