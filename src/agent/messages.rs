//! Agent RPC message types
//!
//! Requests go to `<prefix>.<node_key>.<action>`; the agent replies with an
//! `AgentReply` envelope carrying either `data` or `error`.

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::types::{FleetError, Result};

/// Default subject prefix for agent requests
pub const AGENT_SUBJECT_PREFIX: &str = "fleet.agent";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentAction {
    Heartbeat,
    ListNetworks,
    Cmd,
    WriteFile,
}

impl AgentAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Heartbeat => "heartbeat",
            Self::ListNetworks => "listNetworks",
            Self::Cmd => "cmd",
            Self::WriteFile => "fs.writeFile",
        }
    }

    /// Subject this action is served on for a given node
    pub fn subject(&self, prefix: &str, node_key: &str) -> String {
        format!("{}.{}.{}", prefix, node_key, self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandRequest {
    pub cmd: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteFileRequest {
    pub path: String,
    pub data: String,
}

/// Outcome of a shell command on the node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandResult {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// Reply envelope sent by the agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentReply<T> {
    #[serde(default = "Option::default", skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: DeserializeOwned> AgentReply<T> {
    /// Decode a reply payload, turning agent-side errors into `RemoteCommand`
    pub fn decode(node_key: &str, payload: &[u8]) -> Result<T> {
        let reply: AgentReply<T> = serde_json::from_slice(payload)?;
        match (reply.error, reply.data) {
            (Some(message), _) => Err(FleetError::RemoteCommand {
                node: node_key.to_string(),
                message,
            }),
            (None, Some(data)) => Ok(data),
            (None, None) => Err(FleetError::RemoteCommand {
                node: node_key.to_string(),
                message: "empty reply".to_string(),
            }),
        }
    }
}

/// Decode a reply where only success matters
pub fn decode_ack(node_key: &str, payload: &[u8]) -> Result<()> {
    let reply: AgentReply<serde_json::Value> = serde_json::from_slice(payload)?;
    match reply.error {
        Some(message) => Err(FleetError::RemoteCommand {
            node: node_key.to_string(),
            message,
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subjects() {
        assert_eq!(
            AgentAction::Heartbeat.subject(AGENT_SUBJECT_PREFIX, "triton"),
            "fleet.agent.triton.heartbeat"
        );
        assert_eq!(
            AgentAction::WriteFile.subject("ops", "n1"),
            "ops.n1.fs.writeFile"
        );
    }

    #[test]
    fn test_decode_error_reply() {
        let payload = br#"{"error":"mount: permission denied"}"#;
        let err = AgentReply::<CommandResult>::decode("n1", payload).unwrap_err();
        assert!(matches!(err, FleetError::RemoteCommand { ref message, .. } if message.contains("permission")));
    }

    #[test]
    fn test_decode_ack() {
        assert!(decode_ack("n1", br#"{}"#).is_ok());
        assert!(decode_ack("n1", br#"{"data":null}"#).is_ok());
        assert!(decode_ack("n1", br#"{"error":"EACCES"}"#).is_err());
    }

    #[test]
    fn test_decode_data_reply() {
        let payload = br#"{"data":{"code":0,"stdout":"ok"}}"#;
        let result = AgentReply::<CommandResult>::decode("n1", payload).unwrap();
        assert!(result.success());
        assert_eq!(result.stdout, "ok");
    }
}
