//! NATS transport for the agent channel
//!
//! Connection management and request/reply with a per-request timeout.

use async_nats::{Client, ConnectOptions};
use async_trait::async_trait;
use bytes::Bytes;
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use super::messages::{decode_ack, AgentAction, AgentReply, CommandRequest, CommandResult, WriteFileRequest};
use super::AgentChannel;
use crate::config::NatsArgs;
use crate::models::{InterfaceReport, NodeTelemetry};
use crate::types::{FleetError, Result};

/// Default request timeout for RPC-style calls
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default ping interval for keep-alive
const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(120);

/// NATS client wrapper
#[derive(Clone)]
pub struct NatsClient {
    client: Client,
    request_timeout: Duration,
}

impl NatsClient {
    pub async fn new(args: &NatsArgs, name: &str) -> Result<Self> {
        info!("Connecting to NATS at {}", args.nats_url);

        // No retry_on_initial_connect: fail fast when NATS is down at startup.
        // Reconnection still applies after the first successful connect.
        let mut options = ConnectOptions::new()
            .name(name)
            .ping_interval(DEFAULT_PING_INTERVAL)
            .connection_timeout(Duration::from_secs(5));

        if let (Some(user), Some(pass)) = (&args.nats_user, &args.nats_password) {
            options = options.user_and_password(user.clone(), pass.clone());
        }

        let client = options
            .connect(&args.nats_url)
            .await
            .map_err(|e| FleetError::Nats(format!("Failed to connect: {}", e)))?;

        info!("Connected to NATS at {}", args.nats_url);

        Ok(Self {
            client,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        })
    }

    /// Set the request timeout for RPC calls
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Request/response with timeout
    pub async fn request(&self, subject: &str, payload: Bytes) -> Result<async_nats::Message> {
        tokio::time::timeout(
            self.request_timeout,
            self.client.request(subject.to_string(), payload),
        )
        .await
        .map_err(|_| FleetError::Timeout {
            node: subject.to_string(),
            operation: "request".to_string(),
        })?
        .map_err(|e| FleetError::Nats(format!("Request failed: {}", e)))
    }

    pub async fn flush(&self) -> Result<()> {
        self.client
            .flush()
            .await
            .map_err(|e| FleetError::Nats(format!("Flush failed: {}", e)))
    }
}

/// Agent channel speaking JSON over NATS request/reply
#[derive(Clone)]
pub struct NatsAgentChannel {
    nats: NatsClient,
    prefix: String,
}

impl NatsAgentChannel {
    pub fn new(nats: NatsClient, prefix: impl Into<String>) -> Self {
        Self {
            nats,
            prefix: prefix.into(),
        }
    }

    async fn call_raw<Req: Serialize>(
        &self,
        node_key: &str,
        action: AgentAction,
        request: &Req,
    ) -> Result<async_nats::Message> {
        let subject = action.subject(&self.prefix, node_key);
        let payload = serde_json::to_vec(request)?;
        debug!(node_key = %node_key, subject = %subject, "Agent request");

        self.nats
            .request(&subject, payload.into())
            .await
            .map_err(|e| match e {
                FleetError::Timeout { .. } => FleetError::Timeout {
                    node: node_key.to_string(),
                    operation: action.as_str().to_string(),
                },
                other => other,
            })
    }

    async fn call<Req: Serialize, Resp: DeserializeOwned>(
        &self,
        node_key: &str,
        action: AgentAction,
        request: &Req,
    ) -> Result<Resp> {
        let message = self.call_raw(node_key, action, request).await?;
        AgentReply::<Resp>::decode(node_key, &message.payload)
    }
}

#[async_trait]
impl AgentChannel for NatsAgentChannel {
    async fn heartbeat(&self, node_key: &str) -> Result<NodeTelemetry> {
        self.call(node_key, AgentAction::Heartbeat, &serde_json::json!({}))
            .await
    }

    async fn list_networks(&self, node_key: &str) -> Result<Vec<InterfaceReport>> {
        self.call(node_key, AgentAction::ListNetworks, &serde_json::json!({}))
            .await
    }

    async fn run_command(&self, node_key: &str, command: &str) -> Result<CommandResult> {
        let request = CommandRequest {
            cmd: command.to_string(),
        };
        self.call(node_key, AgentAction::Cmd, &request).await
    }

    async fn write_file(&self, node_key: &str, path: &str, data: &str) -> Result<()> {
        let request = WriteFileRequest {
            path: path.to_string(),
            data: data.to_string(),
        };
        let message = self
            .call_raw(node_key, AgentAction::WriteFile, &request)
            .await?;
        decode_ack(node_key, &message.payload)
    }
}
