//! Reverse proxy
//!
//! One shared `reqwest::Client` (and connection pool) for every upstream.
//! Request and response bodies are streamed, never buffered.

mod director;

pub use director::{merge_query, strip_prefix, ProxyTarget};

use axum::{
    body::Body,
    extract::Request,
    response::{IntoResponse, Response},
};
use http::{header, HeaderMap, HeaderName, HeaderValue};
use tracing::{debug, warn};

use crate::auth::{Identity, IDENTITY_HEADERS};
use crate::error::GatewayError;

pub const SERVICE_NAME_HEADER: &str = "x-service-name";
pub const SERVICE_VERSION_HEADER: &str = "x-service-version";
pub const HEALTH_CHECK_HEADER: &str = "x-health-check";
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Connection-scoped headers never forwarded in either direction
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

pub fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP_HEADERS.contains(&name.as_str())
}

/// Per-request facts the proxy adds to the forwarded request
#[derive(Debug, Clone, Default)]
pub struct ForwardContext {
    pub client_addr: String,
    pub request_id: Option<String>,
    pub identity: Option<Identity>,
}

#[derive(Clone)]
pub struct ReverseProxy {
    client: reqwest::Client,
}

impl ReverseProxy {
    pub fn new() -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| GatewayError::Internal(format!("failed to build proxy client: {}", e)))?;
        Ok(Self { client })
    }

    /// Forward `request` to `target` and relay the upstream response.
    pub async fn forward(
        &self,
        target: ProxyTarget,
        request: Request,
        ctx: ForwardContext,
    ) -> Result<Response, GatewayError> {
        let (parts, body) = request.into_parts();
        let original_host = parts.headers.get(header::HOST).cloned();
        let headers = upstream_headers(&parts.headers, original_host, &ctx);

        debug!(
            "[Proxy] {} {} -> {} ({})",
            parts.method, parts.uri, target.url, target.service_name
        );

        let mut upstream = self
            .client
            .request(parts.method, target.url.clone())
            .headers(headers)
            .timeout(target.timeout);
        if !target.health_check {
            upstream = upstream.body(reqwest::Body::wrap_stream(body.into_data_stream()));
        }

        let upstream = match upstream.send().await {
            Ok(upstream) => upstream,
            Err(e) => {
                warn!(
                    "[Proxy] {} unreachable at {}: {}",
                    target.service_name, target.url, e
                );
                let mut response = GatewayError::Transport {
                    service: target.service_name.clone(),
                    reason: e.to_string(),
                }
                .into_response();
                stamp_service(response.headers_mut(), &target);
                return Ok(response);
            }
        };

        let status = upstream.status();
        let mut response_headers = HeaderMap::with_capacity(upstream.headers().len() + 3);
        for (name, value) in upstream.headers() {
            if !is_hop_by_hop(name) {
                response_headers.append(name.clone(), value.clone());
            }
        }
        stamp_service(&mut response_headers, &target);

        let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
        *response.status_mut() = status;
        *response.headers_mut() = response_headers;
        Ok(response)
    }
}

/// Inbound headers minus hop-by-hop, `Host` and identity headers, plus
/// forwarding headers and the authenticated identity.
fn upstream_headers(
    inbound: &HeaderMap,
    original_host: Option<HeaderValue>,
    ctx: &ForwardContext,
) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(inbound.len() + 8);
    for (name, value) in inbound {
        if is_hop_by_hop(name)
            || name == header::HOST
            || IDENTITY_HEADERS.contains(&name.as_str())
        {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }

    let forwarded_for = match inbound
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
    {
        Some(prior) if !prior.is_empty() => format!("{}, {}", prior, ctx.client_addr),
        _ => ctx.client_addr.clone(),
    };
    insert_str(&mut headers, "x-forwarded-for", &forwarded_for);
    if let Some(host) = original_host {
        headers.insert("x-forwarded-host", host);
    }
    if !headers.contains_key("x-forwarded-proto") {
        headers.insert("x-forwarded-proto", HeaderValue::from_static("http"));
    }

    if !headers.contains_key(REQUEST_ID_HEADER) {
        if let Some(id) = &ctx.request_id {
            insert_str(&mut headers, REQUEST_ID_HEADER, id);
        }
    }

    if let Some(identity) = &ctx.identity {
        for (name, value) in identity.headers() {
            headers.insert(name, value);
        }
    }

    headers
}

/// Which service answered, on relayed and gateway-made responses alike
fn stamp_service(headers: &mut HeaderMap, target: &ProxyTarget) {
    insert_str(headers, SERVICE_NAME_HEADER, &target.service_name);
    insert_str(headers, SERVICE_VERSION_HEADER, &target.service_version);
    if target.health_check {
        headers.insert(HEALTH_CHECK_HEADER, HeaderValue::from_static("true"));
    }
}

fn insert_str(headers: &mut HeaderMap, name: &'static str, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(name, value);
    }
}
