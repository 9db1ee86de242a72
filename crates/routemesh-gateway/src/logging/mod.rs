//! Request logging helpers
//!
//! Trace IDs and the consolidated entry/exit lines written by the HTTP
//! logging middleware. Subscriber setup lives in the gateway binary.

mod trace_context;

pub use trace_context::{generate_trace_id, RequestSpan, TraceContext};
