//! Common error and result types

use thiserror::Error;

/// Errors raised by the fleet control plane
#[derive(Debug, Clone, Error)]
pub enum FleetError {
    /// Neither a stored record nor a live agent answers for this key
    #[error("Unknown node: {0}")]
    UnknownNode(String),

    /// No internal or tunnel IPv4 path to reach the node
    #[error("No reachable network for node {0}")]
    NoReachableNetwork(String),

    /// Remote agent call failed
    #[error("Remote command failed on {node}: {message}")]
    RemoteCommand { node: String, message: String },

    /// Remote agent call did not answer in time
    #[error("{operation} on {node} timed out")]
    Timeout { node: String, operation: String },

    /// Caller has no rights over the referenced record
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    #[error("Validation error: {0}")]
    Validation(String),

    /// A record with the same natural key already exists
    #[error("Duplicate {kind} key '{key}'")]
    Conflict { kind: &'static str, key: String },

    #[error("Database error: {0}")]
    Database(String),

    #[error("NATS error: {0}")]
    Nats(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for FleetError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, FleetError>;
