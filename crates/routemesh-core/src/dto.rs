//! Registry RPC wire bodies
//!
//! Shared by the registry's HTTP surface and `RegistryClient` so both sides
//! agree on field names.

use serde::{Deserialize, Serialize};

use crate::ServiceInfo;

/// Path prefix of the registry RPC surface
pub const REGISTRY_API_PREFIX: &str = "/registry/v1";

/// SSE event name used by the watch stream
pub const SERVICE_UPDATE_EVENT: &str = "service_update";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterServiceRequest {
    pub service: ServiceInfo,
}

/// Outcome of register/deregister.
///
/// `success = false` is a soft failure (e.g. deregistering an unknown
/// service), not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryReply {
    pub success: bool,
    pub message: String,
}

impl RegistryReply {
    pub fn accepted(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn refused(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ServicesResponse {
    #[serde(default)]
    pub services: Vec<ServiceInfo>,
}

/// Body of every error response: `{"error": "..."}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
