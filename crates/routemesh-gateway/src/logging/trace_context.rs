//! Per-request correlation
//!
//! Every request through the public listener gets a `TraceContext`: a short
//! id (or the caller's `X-Request-Id`), the client address and a start time.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tracing::{info, info_span, warn, Span};

static NEXT_REQUEST: AtomicU64 = AtomicU64::new(0);

/// Six lowercase hex digits, e.g. "4f0a9c"
pub fn generate_trace_id() -> String {
    let seq = NEXT_REQUEST.fetch_add(1, Ordering::Relaxed);
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::from(d.subsec_nanos()))
        .unwrap_or(0);
    format!("{:06x}", (seq.wrapping_mul(0x9E37_79B9) ^ nanos) & 0xFF_FFFF)
}

/// Correlation data for a single gateway request
#[derive(Debug, Clone)]
pub struct TraceContext {
    /// Trace ID (6 hex chars), also forwarded upstream as X-Request-Id
    pub trace_id: String,
    pub method: String,
    pub path: String,
    /// Client address as seen by the gateway
    pub client: Option<String>,
    pub started_at: Instant,
}

impl TraceContext {
    pub fn new(method: &str, path: &str) -> Self {
        Self {
            trace_id: generate_trace_id(),
            method: method.to_string(),
            path: path.to_string(),
            client: None,
            started_at: Instant::now(),
        }
    }

    pub fn with_client(mut self, client: String) -> Self {
        self.client = Some(client);
        self
    }

    /// Reuse an inbound request id instead of the generated one
    pub fn with_trace_id(mut self, trace_id: Option<String>) -> Self {
        if let Some(id) = trace_id.filter(|id| !id.is_empty()) {
            self.trace_id = id;
        }
        self
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started_at.elapsed().as_millis() as u64
    }

    pub fn short_client(&self) -> &str {
        self.client.as_deref().unwrap_or("-")
    }
}

/// Span and entry/exit lines of one request
pub struct RequestSpan;

impl RequestSpan {
    /// Every line logged while handling the request inherits these fields
    pub fn enter(ctx: &TraceContext) -> Span {
        info_span!(
            "request",
            trace_id = %ctx.trace_id,
            method = %ctx.method,
            path = %ctx.path,
        )
    }

    pub fn log_entry(ctx: &TraceContext) {
        info!(
            trace_id = %ctx.trace_id,
            "→ {} {} client={}",
            ctx.method,
            ctx.path,
            ctx.short_client()
        );
    }

    /// `detail` is the upstream service when the request was proxied
    pub fn log_exit(ctx: &TraceContext, status: u16, detail: Option<&str>) {
        let elapsed = ctx.elapsed_ms();

        match (detail, status >= 500) {
            (Some(d), false) => info!(trace_id = %ctx.trace_id, "← {} via {} ({}ms)", status, d, elapsed),
            (None, false) => info!(trace_id = %ctx.trace_id, "← {} ({}ms)", status, elapsed),
            (Some(d), true) => warn!(trace_id = %ctx.trace_id, "← {} via {} ({}ms)", status, d, elapsed),
            (None, true) => warn!(trace_id = %ctx.trace_id, "← {} ({}ms)", status, elapsed),
        }
    }
}
