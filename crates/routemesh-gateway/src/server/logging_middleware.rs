//! HTTP Request/Response Logging Middleware
//!
//! One entry and one exit line per request, correlated by trace ID.
//! Bodies are never read here: proxied bodies are streamed through.

use axum::{
    extract::Request,
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use tracing::{debug, Instrument};

use crate::logging::{RequestSpan, TraceContext};
use crate::proxy::{REQUEST_ID_HEADER, SERVICE_NAME_HEADER};
use crate::rate_limit::{client_addr, peer_addr};

/// Headers that should be redacted
const SENSITIVE_HEADERS: &[&str] = &["authorization", "cookie", "set-cookie", "x-api-key"];

/// Headers worth a DEBUG line
const LOGGED_HEADERS: &[&str] = &[
    "content-type",
    "accept",
    "user-agent",
    "authorization",
    "x-forwarded-for",
    "x-request-id",
];

/// Compact header summary with sensitive values redacted
pub fn redact_headers_compact(headers: &HeaderMap) -> String {
    headers
        .iter()
        .filter(|(name, _)| LOGGED_HEADERS.contains(&name.as_str()))
        .map(|(name, value)| {
            if SENSITIVE_HEADERS.contains(&name.as_str()) {
                format!("{}=[REDACTED]", name)
            } else {
                format!("{}={:?}", name, value)
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Logging middleware for requests and responses
///
/// Puts the `TraceContext` into request extensions and echoes the trace id
/// back as `X-Request-Id`.
pub async fn http_logging_middleware(mut request: Request, next: Next) -> Response {
    let inbound_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    let ctx = TraceContext::new(request.method().as_str(), request.uri().path())
        .with_trace_id(inbound_id)
        .with_client(client_addr(request.headers(), peer_addr(&request)));

    let span = RequestSpan::enter(&ctx);

    async move {
        RequestSpan::log_entry(&ctx);
        debug!(
            trace_id = %ctx.trace_id,
            headers = %redact_headers_compact(request.headers()),
            "Request headers"
        );

        request.extensions_mut().insert(ctx.clone());
        let mut response = next.run(request).await;

        let service = response
            .headers()
            .get(SERVICE_NAME_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        RequestSpan::log_exit(&ctx, response.status().as_u16(), service.as_deref());

        if !response.headers().contains_key(REQUEST_ID_HEADER) {
            if let Ok(value) = HeaderValue::from_str(&ctx.trace_id) {
                response.headers_mut().insert(REQUEST_ID_HEADER, value);
            }
        }
        response
    }
    .instrument(span)
    .await
}
