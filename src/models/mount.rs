//! Mount record

use bson::serde_helpers::chrono_datetime_as_bson_datetime;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{field_matches, new_record_id, Entity, Matches, RecordId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MountType {
    /// Remote export attached over NFS
    Nfs,
    /// Already present on the node, never touched remotely
    Local,
}

/// A disk attached to a node at a mountpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mount {
    #[serde(rename = "_id")]
    pub id: RecordId,

    /// Node the mount lives on
    pub node: RecordId,

    /// Disk being mounted (may be owned by another node)
    pub device: RecordId,

    pub mountpoint: String,

    /// Fixed at creation
    #[serde(rename = "type")]
    pub mount_type: MountType,

    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl Mount {
    pub fn new(
        node: impl Into<RecordId>,
        device: impl Into<RecordId>,
        mountpoint: impl Into<String>,
        mount_type: MountType,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: new_record_id(),
            node: node.into(),
            device: device.into(),
            mountpoint: mountpoint.into(),
            mount_type,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_local(&self) -> bool {
        self.mount_type == MountType::Local
    }
}

impl Entity for Mount {
    const KIND: &'static str = "mounts";
    type Query = MountQuery;

    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, Default)]
pub struct MountQuery {
    pub id: Option<RecordId>,
    pub node: Option<RecordId>,
    pub device: Option<RecordId>,
}

impl MountQuery {
    pub fn by_id(id: impl Into<RecordId>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }

    pub fn by_node(node: impl Into<RecordId>) -> Self {
        Self {
            node: Some(node.into()),
            ..Self::default()
        }
    }

    pub fn by_device(device: impl Into<RecordId>) -> Self {
        Self {
            device: Some(device.into()),
            ..Self::default()
        }
    }
}

impl Matches<Mount> for MountQuery {
    fn matches(&self, mount: &Mount) -> bool {
        field_matches(self.id.as_deref(), mount.id.as_str())
            && field_matches(self.node.as_deref(), mount.node.as_str())
            && field_matches(self.device.as_deref(), mount.device.as_str())
    }
}
