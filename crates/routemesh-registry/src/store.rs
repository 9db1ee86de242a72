//! Service Registry store
//!
//! One reader/writer lock guards both the service map and the listener
//! list. Register/deregister hold the write lock across the mutation and
//! the fan-out, so events for a single service reach every listener in
//! emission order. Fan-out uses `try_send`: a full listener loses that
//! event (logged), a closed listener is dropped from the list.

use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use routemesh_core::{
    RegistryError, RegistryReply, Result, ServiceInfo, ServiceStatus, ServiceUpdate,
};

/// Handle returned by `register_update_listener`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(Uuid);

impl ListenerId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // first 8 chars are enough to tell listeners apart in logs
        let id = self.0.to_string();
        f.write_str(&id[..8])
    }
}

struct Listener {
    id: ListenerId,
    tx: mpsc::Sender<ServiceUpdate>,
}

#[derive(Default)]
struct RegistryState {
    services: HashMap<String, ServiceInfo>,
    listeners: Vec<Listener>,
}

impl RegistryState {
    fn broadcast(&mut self, update: ServiceUpdate) {
        self.listeners.retain(|listener| match listener.tx.try_send(update.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(
                    "[Registry] Listener {} is full, dropping {} for {}",
                    listener.id,
                    update.event_type,
                    update.service.name
                );
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("[Registry] Listener {} closed, removing", listener.id);
                false
            }
        });
    }
}

/// In-memory service registry.
#[derive(Default)]
pub struct ServiceRegistry {
    state: RwLock<RegistryState>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a service.
    ///
    /// - unknown name: stored, `ADDED` emitted
    /// - known name, different version: replaced, `UPDATED` emitted
    /// - known name, same version: success, nothing emitted
    pub fn register_service(&self, mut service: ServiceInfo) -> Result<RegistryReply> {
        service.validate()?;

        let mut state = self.state.write();

        let previous_version = state.services.get(&service.name).map(|s| s.version.clone());
        if previous_version.as_deref() == Some(service.version.as_str()) {
            debug!(
                "[Registry] {} v{} already registered, ignoring",
                service.name, service.version
            );
            return Ok(RegistryReply::accepted(format!(
                "service {} already registered",
                service.name
            )));
        }

        service.registered_at = Some(Utc::now());
        service.status = ServiceStatus::Healthy;
        service.last_health_check = None;

        let name = service.name.clone();
        let update = match previous_version {
            None => {
                info!(
                    "[Registry] Registered {} v{} at {} ({} routes)",
                    name,
                    service.version,
                    service.url,
                    service.routes.len()
                );
                ServiceUpdate::added(service.clone())
            }
            Some(old) => {
                info!(
                    "[Registry] Updated {} v{} -> v{} ({} routes)",
                    name,
                    old,
                    service.version,
                    service.routes.len()
                );
                ServiceUpdate::updated(service.clone())
            }
        };

        state.services.insert(name.clone(), service);
        state.broadcast(update);

        Ok(RegistryReply::accepted(format!(
            "service {} registered successfully",
            name
        )))
    }

    /// Remove a service. Unknown names are a soft failure (`success = false`).
    pub fn deregister_service(&self, name: &str) -> Result<RegistryReply> {
        // names are stored verbatim, so they are matched verbatim
        if name.trim().is_empty() {
            return Err(RegistryError::invalid("service name is required"));
        }

        let mut state = self.state.write();
        let Some(service) = state.services.remove(name) else {
            debug!("[Registry] Deregister for unknown service {}", name);
            return Ok(RegistryReply::refused("service not found"));
        };

        info!("[Registry] Deregistered {} v{}", service.name, service.version);
        state.broadcast(ServiceUpdate::removed(service));

        Ok(RegistryReply::accepted(format!(
            "service {} deregistered successfully",
            name
        )))
    }

    /// Snapshot of all services, sorted by name
    pub fn get_services(&self) -> Vec<ServiceInfo> {
        let state = self.state.read();
        let mut services: Vec<ServiceInfo> = state.services.values().cloned().collect();
        services.sort_by(|a, b| a.name.cmp(&b.name));
        services
    }

    pub fn get_service(&self, name: &str) -> Option<ServiceInfo> {
        self.state.read().services.get(name).cloned()
    }

    pub fn service_count(&self) -> usize {
        self.state.read().services.len()
    }

    /// Store a health check result. Does not emit an update.
    ///
    /// Returns false when the service is no longer registered.
    pub fn record_health(&self, name: &str, status: ServiceStatus) -> bool {
        let mut state = self.state.write();
        match state.services.get_mut(name) {
            Some(service) => {
                if service.status != status {
                    info!(
                        "[Registry] {} health {} -> {}",
                        name, service.status, status
                    );
                }
                service.status = status;
                service.last_health_check = Some(Utc::now());
                true
            }
            None => false,
        }
    }

    /// Attach a consumer of `ServiceUpdate`s
    pub fn register_update_listener(&self, tx: mpsc::Sender<ServiceUpdate>) -> ListenerId {
        let id = ListenerId::new();
        let mut state = self.state.write();
        state.listeners.push(Listener { id, tx });
        debug!(
            "[Registry] Listener {} attached ({} total)",
            id,
            state.listeners.len()
        );
        id
    }

    /// Detach a listener. Its sender is dropped here, so the receiver sees
    /// the channel close once no other senders remain.
    pub fn unregister_update_listener(&self, id: ListenerId) -> bool {
        let mut state = self.state.write();
        let before = state.listeners.len();
        state.listeners.retain(|l| l.id != id);
        let removed = state.listeners.len() != before;
        if removed {
            debug!("[Registry] Listener {} detached", id);
        }
        removed
    }

    /// Create a channel of `capacity` and attach its sender
    pub fn subscribe(&self, capacity: usize) -> (ListenerId, mpsc::Receiver<ServiceUpdate>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (self.register_update_listener(tx), rx)
    }

    /// Detach every listener, closing their channels. Used at shutdown so
    /// watch loops and watch streams end.
    pub fn close_listeners(&self) -> usize {
        let mut state = self.state.write();
        let closed = state.listeners.len();
        state.listeners.clear();
        if closed > 0 {
            info!("[Registry] Closed {} update listeners", closed);
        }
        closed
    }

    pub fn listener_count(&self) -> usize {
        self.state.read().listeners.len()
    }
}
