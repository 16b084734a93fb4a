//! Disk record

use bson::serde_helpers::chrono_datetime_as_bson_datetime;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{field_matches, new_record_id, Entity, Matches, RecordId};

/// Physical class of a disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiskType {
    Ssd,
    Nvme,
    Raid0,
    Flash,
    Disk,
}

/// A block device exported by a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Disk {
    #[serde(rename = "_id")]
    pub id: RecordId,

    /// Owning node
    pub node: RecordId,

    /// Export path on the owning node
    pub path: String,

    #[serde(rename = "type")]
    pub disk_type: DiskType,

    /// Size in bytes
    pub size: u64,

    /// Device identifier, e.g. `/dev/nvme0n1`
    pub device: String,

    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl Disk {
    pub fn new(
        node: impl Into<RecordId>,
        path: impl Into<String>,
        disk_type: DiskType,
        size: u64,
        device: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: new_record_id(),
            node: node.into(),
            path: path.into(),
            disk_type,
            size,
            device: device.into(),
            created_at: now,
            updated_at: now,
        }
    }
}

impl Entity for Disk {
    const KIND: &'static str = "disks";
    type Query = DiskQuery;

    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, Default)]
pub struct DiskQuery {
    pub id: Option<RecordId>,
    pub node: Option<RecordId>,
}

impl DiskQuery {
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
}

impl Matches<Disk> for DiskQuery {
    fn matches(&self, disk: &Disk) -> bool {
        field_matches(self.id.as_deref(), disk.id.as_str())
            && field_matches(self.node.as_deref(), disk.node.as_str())
    }
}
