//! Gateway configuration
//!
//! Read from the process environment after loading `.env` files.
//! `GatewayConfig::default()` never touches the environment.

use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: String, value: String },
}

/// Gateway process configuration
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Public HTTP listener
    pub host: String,
    pub port: u16,
    /// Registry RPC listener
    pub registry_host: String,
    pub registry_port: u16,
    /// Informational run mode (debug/release)
    pub mode: String,
    /// Prefix service routes are bound under and the director strips
    pub api_prefix: String,
    /// Default requests per minute (and burst) per client address
    pub rate_limit_count: u32,
    /// Idle rate-limit buckets are evicted after this long; `None` keeps them
    pub rate_limit_idle_ttl: Option<Duration>,
    /// Enables HS256 validation on protected routes
    pub jwt_secret: Option<String>,
    pub proxy_timeout: Duration,
    pub shutdown_grace: Duration,
    /// `None` disables the health monitor
    pub health_check_interval: Option<Duration>,
    /// Capacity of the router's update channel
    pub listener_buffer: usize,
    pub enable_cors: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            registry_host: "0.0.0.0".to_string(),
            registry_port: 50051,
            mode: "debug".to_string(),
            api_prefix: "/api/v1".to_string(),
            rate_limit_count: 100,
            rate_limit_idle_ttl: None,
            jwt_secret: None,
            proxy_timeout: Duration::from_secs(30),
            shutdown_grace: Duration::from_secs(30),
            health_check_interval: Some(Duration::from_secs(30)),
            listener_buffer: 100,
            enable_cors: true,
        }
    }
}

impl GatewayConfig {
    /// Load `gateway/.env` then `.env` (first value wins), then read the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::from_filename("gateway/.env").ok();
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(v) = get("API_HOST") {
            config.host = v;
        }
        if let Some(v) = get("API_PORT") {
            config.port = parse("API_PORT", &v)?;
        }
        if let Some(v) = get("REGISTRY_HOST") {
            config.registry_host = v;
        }
        // GRPC_* are accepted as aliases for deployments that predate REGISTRY_*
        if let Some(v) = get("REGISTRY_PORT").or_else(|| get("GRPC_PORT")) {
            config.registry_port = parse("REGISTRY_PORT", &v)?;
        }
        if let Some(v) = get("MODE") {
            config.mode = v;
        }
        if let Some(v) = lookup("API_PREFIX") {
            config.api_prefix = normalize_prefix(&v);
        }
        if let Some(v) = get("RATE_LIMIT_COUNT") {
            let count: u32 = parse("RATE_LIMIT_COUNT", &v)?;
            if count == 0 {
                return Err(invalid("RATE_LIMIT_COUNT", &v));
            }
            config.rate_limit_count = count;
        }
        if let Some(v) = get("RATE_LIMIT_IDLE_TTL_SECS") {
            config.rate_limit_idle_ttl = optional_secs(parse("RATE_LIMIT_IDLE_TTL_SECS", &v)?);
        }
        config.jwt_secret = get("JWT_SECRET");
        if let Some(v) = get("PROXY_TIMEOUT_SECS") {
            config.proxy_timeout = Duration::from_secs(parse("PROXY_TIMEOUT_SECS", &v)?);
        }
        if let Some(v) = get("SHUTDOWN_GRACE_SECS") {
            config.shutdown_grace = Duration::from_secs(parse("SHUTDOWN_GRACE_SECS", &v)?);
        }
        if let Some(v) = get("HEALTH_CHECK_INTERVAL_SECS") {
            config.health_check_interval =
                optional_secs(parse("HEALTH_CHECK_INTERVAL_SECS", &v)?);
        }
        if let Some(v) = get("LISTENER_BUFFER") {
            let buffer: usize = parse("LISTENER_BUFFER", &v)?;
            if buffer == 0 {
                return Err(invalid("LISTENER_BUFFER", &v));
            }
            config.listener_buffer = buffer;
        }
        if let Some(v) = get("ENABLE_CORS") {
            config.enable_cors = parse_bool("ENABLE_CORS", &v)?;
        }

        Ok(config)
    }

    /// Public listener address, `host:port`
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn registry_addr(&self) -> String {
        format!("{}:{}", self.registry_host, self.registry_port)
    }

    /// Base URL clients use to reach the gateway
    pub fn base_url(&self) -> String {
        format!("http://localhost:{}", self.port)
    }

    pub fn is_release(&self) -> bool {
        self.mode.eq_ignore_ascii_case("release")
    }
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_string(),
        value: value.to_string(),
    }
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| invalid(key, value))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(key, value)),
    }
}

fn optional_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

/// "/api/v1/" -> "/api/v1", "api" -> "/api", "/" or "" -> ""
pub fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{}", trimmed)
    }
}
