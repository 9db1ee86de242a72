//! Gateway error taxonomy
//!
//! Every gateway-originated failure is one of these kinds. `IntoResponse`
//! is the single place a kind turns into a status code and a
//! `{"error": ...}` body.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("{message}")]
    NotFound {
        message: String,
        route: Option<String>,
    },

    #[error("route conflict: {0}")]
    Conflict(String),

    #[error("upstream {service} failed: {reason}")]
    Transport { service: String, reason: String },

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("rate limit exceeded, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn route_not_found() -> Self {
        Self::NotFound {
            message: "route not found".to_string(),
            route: None,
        }
    }

    /// A bound route whose owning service is gone
    pub fn route_unavailable(route: impl Into<String>) -> Self {
        Self::NotFound {
            message: "route no longer available".to_string(),
            route: Some(route.into()),
        }
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::Validation(_) => StatusCode::BAD_REQUEST,
            GatewayError::NotFound { .. } => StatusCode::NOT_FOUND,
            GatewayError::Conflict(_) => StatusCode::CONFLICT,
            GatewayError::Transport { .. } => StatusCode::BAD_GATEWAY,
            GatewayError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            GatewayError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Whole seconds, rounded up, never below one
pub fn retry_after_secs(retry_after: Duration) -> u64 {
    let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
    secs.max(1)
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match self {
            GatewayError::Validation(msg)
            | GatewayError::Conflict(msg)
            | GatewayError::Unauthorized(msg) => (status, Json(json!({ "error": msg }))).into_response(),
            GatewayError::NotFound { message, route } => {
                let body = match route {
                    Some(route) => json!({ "error": message, "route": route }),
                    None => json!({ "error": message }),
                };
                (status, Json(body)).into_response()
            }
            GatewayError::Transport { .. } => {
                (status, Json(json!({ "error": "service unavailable" }))).into_response()
            }
            GatewayError::RateLimited { retry_after } => {
                let secs = retry_after_secs(retry_after);
                let mut response = (
                    status,
                    Json(json!({
                        "error": "rate limit exceeded",
                        "retry_after": format!("{}s", secs),
                    })),
                )
                    .into_response();
                response
                    .headers_mut()
                    .insert(header::RETRY_AFTER, HeaderValue::from(secs));
                response
            }
            GatewayError::Internal(_) => {
                (status, Json(json!({ "error": "internal server error" }))).into_response()
            }
        }
    }
}
