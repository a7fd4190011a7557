//! Error types for the port reconciler.

use ovn_orch_common::Retryable;
use thiserror::Error;

/// Failure reported by a collaborator (tenant store, ledger, northbound
/// store, chassis directory).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// The store could not be reached or timed out.
    #[error("Backend unavailable during {operation}: {message}")]
    Unavailable {
        /// The operation that failed (e.g., "put_port", "list_chassis").
        operation: String,
        /// Error message.
        message: String,
    },

    /// A referenced object does not exist.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Object kind (e.g., "ha_chassis_group").
        kind: String,
        /// Object identifier.
        id: String,
    },

    /// The store refused the request (constraint violation, bad data).
    #[error("Backend rejected {operation}: {message}")]
    Rejected { operation: String, message: String },
}

impl BackendError {
    /// Creates an unavailable error.
    pub fn unavailable(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unavailable {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Creates a not-found error.
    pub fn not_found(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            id: id.into(),
        }
    }

    /// Creates a rejected error.
    pub fn rejected(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Rejected {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Returns true if retrying the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

impl Retryable for BackendError {
    fn is_retryable(&self) -> bool {
        BackendError::is_retryable(self)
    }
}

/// Daemon-level errors.
#[derive(Error, Debug)]
pub enum PortOrchError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Collaborator error
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for daemon operations
pub type Result<T> = std::result::Result<T, PortOrchError>;
