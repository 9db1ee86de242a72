//! Registry Client
//!
//! Runs inside a backend service. Collects the routes of the service's
//! modules into one `ServiceInfo`, registers it on startup and deregisters
//! on shutdown. Failures are returned to the caller, who is expected to log
//! them and keep serving.

use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use routemesh_core::{
    ErrorBody, RegisterServiceRequest, RegistryError, RegistryReply, Result, ServiceInfo,
    ServicesResponse, REGISTRY_API_PREFIX,
};

use crate::module::{aggregate_routes, ModulePort};

/// Identity of the backend service plus where the registry lives
#[derive(Debug, Clone)]
pub struct RegistryClientConfig {
    /// Registry address, `host:port` or a full `http://` URL
    pub gateway_address: String,
    pub service_name: String,
    pub service_version: String,
    /// Base URL the gateway should proxy to
    pub service_url: String,
    pub health_endpoint: Option<String>,
    pub request_timeout: Duration,
}

impl RegistryClientConfig {
    pub fn new(
        gateway_address: impl Into<String>,
        service_name: impl Into<String>,
        service_version: impl Into<String>,
        service_url: impl Into<String>,
    ) -> Self {
        Self {
            gateway_address: gateway_address.into(),
            service_name: service_name.into(),
            service_version: service_version.into(),
            service_url: service_url.into(),
            health_endpoint: Some("/health".to_string()),
            request_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_health_endpoint(mut self, endpoint: Option<String>) -> Self {
        self.health_endpoint = endpoint;
        self
    }

    /// Base URL of the registry RPC surface
    pub fn registry_url(&self) -> String {
        let addr = self.gateway_address.trim_end_matches('/');
        if addr.starts_with("http://") || addr.starts_with("https://") {
            format!("{}{}", addr, REGISTRY_API_PREFIX)
        } else {
            format!("http://{}{}", addr, REGISTRY_API_PREFIX)
        }
    }
}

pub struct RegistryClient {
    http: reqwest::Client,
    base_url: String,
    config: RegistryClientConfig,
    modules: Vec<Arc<dyn ModulePort>>,
}

impl RegistryClient {
    pub fn new(config: RegistryClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| RegistryError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            base_url: config.registry_url(),
            config,
            modules: Vec::new(),
        })
    }

    pub fn with_module(mut self, module: Arc<dyn ModulePort>) -> Self {
        self.modules.push(module);
        self
    }

    pub fn with_modules(mut self, modules: impl IntoIterator<Item = Arc<dyn ModulePort>>) -> Self {
        self.modules.extend(modules);
        self
    }

    pub fn modules(&self) -> &[Arc<dyn ModulePort>] {
        &self.modules
    }

    /// The registration payload: service identity plus every module's routes
    pub fn service_info(&self) -> ServiceInfo {
        let mut service = ServiceInfo::new(
            &self.config.service_name,
            &self.config.service_version,
            &self.config.service_url,
        )
        .with_routes(aggregate_routes(&self.modules));
        service.health_endpoint = self.config.health_endpoint.clone();
        service
    }

    pub async fn register_with_gateway(&self) -> Result<RegistryReply> {
        let service = self.service_info();
        // fail fast instead of a round trip that can only be rejected
        service.validate()?;

        info!(
            "[RegistryClient] Registering {} v{} ({} routes) with {}",
            service.name,
            service.version,
            service.routes.len(),
            self.base_url
        );

        let response = self
            .http
            .post(format!("{}/services", self.base_url))
            .json(&RegisterServiceRequest { service })
            .send()
            .await
            .map_err(transport)?;

        let reply: RegistryReply = decode(response).await?;
        if !reply.success {
            return Err(RegistryError::Rejected(reply.message));
        }
        info!("[RegistryClient] {}", reply.message);
        Ok(reply)
    }

    /// Deregister and release the connection pool, whatever the outcome.
    pub async fn deregister_from_gateway(self) -> Result<RegistryReply> {
        let name = self.config.service_name.clone();
        info!("[RegistryClient] Deregistering {}", name);

        let result = match service_url(&self.base_url, &name) {
            Ok(url) => match self.http.delete(url).send().await {
                Ok(response) => decode::<RegistryReply>(response).await,
                Err(e) => Err(transport(e)),
            },
            Err(e) => Err(e),
        };

        match &result {
            Ok(reply) if reply.success => debug!("[RegistryClient] {}", reply.message),
            Ok(reply) => warn!("[RegistryClient] Deregister of {} refused: {}", name, reply.message),
            Err(e) => warn!("[RegistryClient] Deregister of {} failed: {}", name, e),
        }

        drop(self.http);
        result
    }

    pub async fn get_services(&self) -> Result<Vec<ServiceInfo>> {
        let response = self
            .http
            .get(format!("{}/services", self.base_url))
            .send()
            .await
            .map_err(transport)?;
        let body: ServicesResponse = decode(response).await?;
        Ok(body.services)
    }
}

/// `{base_url}/services/{name}` with `name` encoded as one path segment
fn service_url(base_url: &str, name: &str) -> Result<Url> {
    let mut url = Url::parse(base_url)
        .map_err(|e| RegistryError::invalid(format!("invalid registry address {}: {}", base_url, e)))?;
    url.path_segments_mut()
        .map_err(|_| RegistryError::invalid(format!("invalid registry address {}", base_url)))?
        .pop_if_empty()
        .push("services")
        .push(name);
    Ok(url)
}

fn transport(err: reqwest::Error) -> RegistryError {
    RegistryError::Transport(err.to_string())
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    if status.is_success() {
        return response.json::<T>().await.map_err(transport);
    }

    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .map(|body| body.error)
        .unwrap_or(text);

    match status {
        StatusCode::BAD_REQUEST => Err(RegistryError::InvalidArgument(message)),
        StatusCode::NOT_FOUND => Err(RegistryError::NotFound(message)),
        _ => Err(RegistryError::Rejected(format!("{}: {}", status, message))),
    }
}
