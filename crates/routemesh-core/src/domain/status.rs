use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a registered service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Starting,
    Healthy,
    Unhealthy,
    Stopping,
    Maintenance,
    #[default]
    #[serde(other)]
    Unknown,
}

impl ServiceStatus {
    /// Parse a status name; anything unrecognised is `Unknown`
    pub fn parse_lossy(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "starting" => ServiceStatus::Starting,
            "healthy" => ServiceStatus::Healthy,
            "unhealthy" => ServiceStatus::Unhealthy,
            "stopping" => ServiceStatus::Stopping,
            "maintenance" => ServiceStatus::Maintenance,
            _ => ServiceStatus::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceStatus::Starting => "starting",
            ServiceStatus::Healthy => "healthy",
            ServiceStatus::Unhealthy => "unhealthy",
            ServiceStatus::Stopping => "stopping",
            ServiceStatus::Maintenance => "maintenance",
            ServiceStatus::Unknown => "unknown",
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self, ServiceStatus::Healthy)
    }

    /// Healthy or still starting up
    pub fn is_available(&self) -> bool {
        matches!(self, ServiceStatus::Healthy | ServiceStatus::Starting)
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
