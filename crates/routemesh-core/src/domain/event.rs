//! Registry change events
//!
//! Exactly one `ServiceUpdate` is produced per registry mutation and fanned
//! out to every listener. Events are facts; they are never mutated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ServiceInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ServiceUpdateType {
    Added,
    Updated,
    Removed,
}

impl fmt::Display for ServiceUpdateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ServiceUpdateType::Added => "ADDED",
            ServiceUpdateType::Updated => "UPDATED",
            ServiceUpdateType::Removed => "REMOVED",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceUpdate {
    pub event_type: ServiceUpdateType,
    pub service: ServiceInfo,
    pub timestamp: DateTime<Utc>,
}

impl ServiceUpdate {
    pub fn new(event_type: ServiceUpdateType, service: ServiceInfo) -> Self {
        Self {
            event_type,
            service,
            timestamp: Utc::now(),
        }
    }

    pub fn added(service: ServiceInfo) -> Self {
        Self::new(ServiceUpdateType::Added, service)
    }

    pub fn updated(service: ServiceInfo) -> Self {
        Self::new(ServiceUpdateType::Updated, service)
    }

    pub fn removed(service: ServiceInfo) -> Self {
        Self::new(ServiceUpdateType::Removed, service)
    }

    pub fn service_name(&self) -> &str {
        &self.service.name
    }
}
