//! Registry error taxonomy

use thiserror::Error;

/// Errors produced by registry operations, on either side of the RPC boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Caller supplied missing or malformed input. Not retryable as-is.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("service not found: {0}")]
    NotFound(String),

    /// The registry could not be reached (connect error, timeout, bad body).
    #[error("registry unreachable: {0}")]
    Transport(String),

    /// The registry answered but refused the request.
    #[error("registry rejected request: {0}")]
    Rejected(String),
}

impl RegistryError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Whether a later retry with the same input could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

pub type Result<T> = std::result::Result<T, RegistryError>;
