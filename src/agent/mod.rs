//! Remote agent channel
//!
//! Per-node RPC to the agent process running on each compute node. Every
//! call is addressed by node key and may fail or time out; callers decide
//! whether a failure is fatal.

pub mod messages;
pub mod nats;

pub use messages::{
    decode_ack, AgentAction, AgentReply, CommandRequest, CommandResult, WriteFileRequest,
    AGENT_SUBJECT_PREFIX,
};
pub use nats::{NatsAgentChannel, NatsClient};

use async_trait::async_trait;
use std::time::Duration;

use crate::models::{InterfaceReport, NodeTelemetry};
use crate::types::{FleetError, Result};

/// Calls the core makes against a node's agent
#[async_trait]
pub trait AgentChannel: Send + Sync {
    /// Liveness check returning current telemetry
    async fn heartbeat(&self, node_key: &str) -> Result<NodeTelemetry>;

    /// Interfaces in the order the agent reports them
    async fn list_networks(&self, node_key: &str) -> Result<Vec<InterfaceReport>>;

    /// Run a shell command on the node
    async fn run_command(&self, node_key: &str, command: &str) -> Result<CommandResult>;

    async fn write_file(&self, node_key: &str, path: &str, data: &str) -> Result<()>;
}

/// Bound an agent call by `limit`, mapping expiry to `FleetError::Timeout`
pub async fn with_deadline<T, F>(limit: Duration, node_key: &str, operation: &str, call: F) -> Result<T>
where
    F: std::future::Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(FleetError::Timeout {
            node: node_key.to_string(),
            operation: operation.to_string(),
        }),
    }
}
