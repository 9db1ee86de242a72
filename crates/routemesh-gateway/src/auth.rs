//! Identity validation for protected routes
//!
//! The gateway does not issue tokens. It extracts the bearer token, hands it
//! to an `IdentityValidator` and forwards the resulting identity upstream as
//! `X-User-*` headers.

use axum::http::{header, HeaderMap, HeaderName, HeaderValue};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use tracing::debug;

use crate::error::GatewayError;

type HmacSha256 = Hmac<Sha256>;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_EMAIL_HEADER: &str = "x-user-email";
pub const USER_NAME_HEADER: &str = "x-user-name";
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// Identity headers the gateway owns; inbound copies are always stripped
pub const IDENTITY_HEADERS: &[&str] = &[
    USER_ID_HEADER,
    USER_EMAIL_HEADER,
    USER_NAME_HEADER,
    USER_ROLE_HEADER,
];

/// Authenticated caller
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    pub user_id: Option<String>,
    pub email: Option<String>,
    pub name: Option<String>,
    pub role: Option<String>,
}

impl Identity {
    /// Header pairs forwarded to the backend
    pub fn headers(&self) -> Vec<(HeaderName, HeaderValue)> {
        [
            (USER_ID_HEADER, &self.user_id),
            (USER_EMAIL_HEADER, &self.email),
            (USER_NAME_HEADER, &self.name),
            (USER_ROLE_HEADER, &self.role),
        ]
        .into_iter()
        .filter_map(|(name, value)| {
            let value = HeaderValue::from_str(value.as_deref()?).ok()?;
            Some((HeaderName::from_static(name), value))
        })
        .collect()
    }
}

/// Validates a bearer token and yields the caller's identity.
pub trait IdentityValidator: Send + Sync {
    fn validate(&self, token: &str) -> Option<Identity>;
}

/// Accepts any non-empty token. Used when no signing secret is configured.
pub struct BearerPresenceValidator;

impl IdentityValidator for BearerPresenceValidator {
    fn validate(&self, token: &str) -> Option<Identity> {
        (!token.is_empty()).then(Identity::default)
    }
}

#[derive(Debug, Deserialize)]
struct Claims {
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    exp: Option<i64>,
    #[serde(default)]
    nbf: Option<i64>,
}

/// HS256 JWT validator
pub struct JwtValidator {
    secret: Vec<u8>,
}

impl JwtValidator {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
        }
    }
}

impl IdentityValidator for JwtValidator {
    fn validate(&self, token: &str) -> Option<Identity> {
        let mut parts = token.split('.');
        let (Some(header_b64), Some(payload_b64), Some(signature_b64), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            debug!("[Auth] Token is not a three-part JWT");
            return None;
        };

        let header: serde_json::Value =
            serde_json::from_slice(&URL_SAFE_NO_PAD.decode(header_b64).ok()?).ok()?;
        if header.get("alg").and_then(|a| a.as_str()) != Some("HS256") {
            debug!("[Auth] Unsupported token algorithm");
            return None;
        }

        let signature = URL_SAFE_NO_PAD.decode(signature_b64).ok()?;
        let mut mac = HmacSha256::new_from_slice(&self.secret).ok()?;
        mac.update(header_b64.as_bytes());
        mac.update(b".");
        mac.update(payload_b64.as_bytes());
        if mac.verify_slice(&signature).is_err() {
            debug!("[Auth] Invalid token signature");
            return None;
        }

        let claims: Claims =
            serde_json::from_slice(&URL_SAFE_NO_PAD.decode(payload_b64).ok()?).ok()?;

        let now = chrono::Utc::now().timestamp();
        if claims.exp.is_some_and(|exp| now >= exp) {
            debug!("[Auth] Token expired");
            return None;
        }
        if claims.nbf.is_some_and(|nbf| now < nbf) {
            debug!("[Auth] Token not yet valid");
            return None;
        }
        if claims.token_type.as_deref().is_some_and(|t| t != "access") {
            debug!("[Auth] Refusing non-access token");
            return None;
        }

        Some(Identity {
            user_id: claims.user_id.or(claims.sub),
            email: claims.email,
            name: claims.name,
            role: claims.role,
        })
    }
}

/// Check the `Authorization` header of a protected request.
pub fn authenticate(
    headers: &HeaderMap,
    validator: &dyn IdentityValidator,
) -> Result<Identity, GatewayError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or_else(|| GatewayError::unauthorized("authorization header required"))?;

    let value = value
        .to_str()
        .map_err(|_| GatewayError::unauthorized("invalid token format"))?;

    let mut parts = value.split(' ');
    let token = match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) if !token.is_empty() => token,
        _ => return Err(GatewayError::unauthorized("invalid token format")),
    };

    validator
        .validate(token)
        .ok_or_else(|| GatewayError::unauthorized("invalid token"))
}
