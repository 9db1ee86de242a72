//! Background health monitor
//!
//! Polls every registered service and writes the result back through
//! `ServiceRegistry::record_health`. Routes are owned by register and
//! deregister only, so a failing check never touches the route table.

use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use routemesh_core::{RegistryError, Result, ServiceInfo, ServiceStatus};

use crate::store::ServiceRegistry;

/// Timeout of a single health probe
pub const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

pub struct HealthMonitor {
    registry: Arc<ServiceRegistry>,
    http: reqwest::Client,
    interval: Duration,
}

impl HealthMonitor {
    pub fn new(registry: Arc<ServiceRegistry>, interval: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(HEALTH_CHECK_TIMEOUT)
            .build()
            .map_err(|e| RegistryError::Transport(e.to_string()))?;
        Ok(Self {
            registry,
            http,
            interval,
        })
    }

    /// Probe one service: 2xx is healthy, anything else unhealthy
    pub async fn probe(&self, service: &ServiceInfo) -> ServiceStatus {
        let url = service.health_probe_url();
        match self.http.get(&url).send().await {
            Ok(response) if response.status().is_success() => ServiceStatus::Healthy,
            Ok(response) => {
                debug!(
                    "[Health] {} answered {} at {}",
                    service.name,
                    response.status(),
                    url
                );
                ServiceStatus::Unhealthy
            }
            Err(e) => {
                debug!("[Health] {} unreachable at {}: {}", service.name, url, e);
                ServiceStatus::Unhealthy
            }
        }
    }

    /// One pass over all services. Returns how many were healthy.
    pub async fn check_all(&self) -> usize {
        let services = self.registry.get_services();
        let results = join_all(services.iter().map(|service| async move {
            (service.name.as_str(), self.probe(service).await)
        }))
        .await;

        let mut healthy = 0;
        for (name, status) in results {
            if status.is_healthy() {
                healthy += 1;
            }
            // service may have been deregistered while we were probing
            if !self.registry.record_health(name, status) {
                debug!("[Health] {} gone before result was recorded", name);
            }
        }
        healthy
    }

    /// Run until `cancel` fires
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("[Health] Monitor started (every {:?})", self.interval);
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // first tick completes immediately; skip it so fresh registrations settle
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let total = self.registry.service_count();
                        if total == 0 {
                            continue;
                        }
                        let healthy = self.check_all().await;
                        if healthy < total {
                            warn!("[Health] {}/{} services healthy", healthy, total);
                        } else {
                            debug!("[Health] {}/{} services healthy", healthy, total);
                        }
                    }
                }
            }
            info!("[Health] Monitor stopped");
        })
    }
}
