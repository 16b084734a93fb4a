//! Node record and heartbeat telemetry

use bson::serde_helpers::{
    chrono_datetime_as_bson_datetime, chrono_datetime_as_bson_datetime_optional,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{field_matches, new_record_id, Entity, Matches, RecordId};

/// CPU snapshot reported by the agent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CpuInfo {
    pub vendor: String,
    pub family: String,
    pub model: String,
    pub speed_string: String,
    pub cores: u32,
    pub load1: f64,
    pub load5: f64,
    pub load15: f64,
    pub utilization: f64,
    pub speed: f64,
}

/// Memory snapshot reported by the agent (bytes)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MemoryInfo {
    pub free: u64,
    pub total: u64,
    pub percent: f64,
    pub used: u64,
}

/// Account the agent runs as
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserInfo {
    pub uid: u32,
    pub gid: u32,
    pub username: String,
    pub homedir: String,
    pub shell: String,
}

/// Heartbeat payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodeTelemetry {
    pub hostname: String,
    pub arch: String,
    pub platform: String,
    #[serde(rename = "type")]
    pub os_type: String,
    pub release: String,
    /// Seconds since boot
    pub uptime: f64,
    pub cpu: CpuInfo,
    pub memory: MemoryInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserInfo>,
}

/// A registered compute node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    #[serde(rename = "_id")]
    pub id: RecordId,

    /// Stable key assigned by the agent
    #[serde(rename = "nodeID")]
    pub node_key: String,

    /// Operator-given display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    pub online: bool,

    #[serde(default)]
    pub telemetry: NodeTelemetry,

    #[serde(default, with = "chrono_datetime_as_bson_datetime_optional")]
    pub online_at: Option<DateTime<Utc>>,

    #[serde(default, with = "chrono_datetime_as_bson_datetime_optional")]
    pub offline_at: Option<DateTime<Utc>>,

    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl Node {
    /// Build a record for a node seen for the first time
    pub fn from_heartbeat(node_key: &str, telemetry: NodeTelemetry, now: DateTime<Utc>) -> Self {
        Self {
            id: new_record_id(),
            node_key: node_key.to_string(),
            name: None,
            online: true,
            telemetry,
            online_at: Some(now),
            offline_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a fresh heartbeat, returning true when this is an offline -> online edge
    pub fn record_heartbeat(&mut self, telemetry: NodeTelemetry, now: DateTime<Utc>) -> bool {
        let came_online = !self.online;
        self.telemetry = telemetry;
        self.online = true;
        if came_online {
            self.online_at = Some(now);
        }
        self.updated_at = now;
        came_online
    }

    /// Mark offline after a failed heartbeat
    pub fn mark_offline(&mut self, now: DateTime<Utc>) {
        self.online = false;
        self.offline_at = Some(now);
        self.updated_at = now;
    }

    /// Forced offline transition used by the stale sweep
    pub fn mark_stale(&mut self, now: DateTime<Utc>) {
        self.online = false;
        self.offline_at = Some(now);
        self.online_at = None;
        self.updated_at = now;
    }

    pub fn hostname(&self) -> &str {
        &self.telemetry.hostname
    }
}

impl Entity for Node {
    const KIND: &'static str = "nodes";
    type Query = NodeQuery;

    fn id(&self) -> &str {
        &self.id
    }

    fn unique_key(&self) -> Option<&str> {
        Some(&self.node_key)
    }
}

/// Typed filter over node records
#[derive(Debug, Clone, Default)]
pub struct NodeQuery {
    pub id: Option<RecordId>,
    pub node_key: Option<String>,
    pub hostname: Option<String>,
    pub online: Option<bool>,
    /// Only nodes whose last update is strictly older than this instant
    pub updated_before: Option<DateTime<Utc>>,
}

impl NodeQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn by_id(id: impl Into<RecordId>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }

    pub fn by_key(node_key: impl Into<String>) -> Self {
        Self {
            node_key: Some(node_key.into()),
            ..Self::default()
        }
    }

    pub fn by_hostname(hostname: impl Into<String>) -> Self {
        Self {
            hostname: Some(hostname.into()),
            ..Self::default()
        }
    }

    pub fn online(mut self, online: bool) -> Self {
        self.online = Some(online);
        self
    }

    pub fn updated_before(mut self, cutoff: DateTime<Utc>) -> Self {
        self.updated_before = Some(cutoff);
        self
    }
}

impl Matches<Node> for NodeQuery {
    fn matches(&self, node: &Node) -> bool {
        field_matches(self.id.as_deref(), node.id.as_str())
            && field_matches(self.node_key.as_deref(), node.node_key.as_str())
            && field_matches(self.hostname.as_deref(), node.telemetry.hostname.as_str())
            && field_matches(self.online.as_ref(), &node.online)
            && self.updated_before.map_or(true, |cutoff| node.updated_at < cutoff)
    }
}
