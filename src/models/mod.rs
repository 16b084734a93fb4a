//! Fleet records
//!
//! The four record kinds held by the entity store, each paired with a typed
//! query. Foreign keys are plain record ids resolved through the store.

pub mod disk;
pub mod mount;
pub mod network;
pub mod node;

pub use disk::{Disk, DiskQuery, DiskType};
pub use mount::{Mount, MountQuery, MountType};
pub use network::{AddressFamily, InterfaceReport, NetworkInterface, NetworkQuery};
pub use node::{CpuInfo, MemoryInfo, Node, NodeQuery, NodeTelemetry, UserInfo};

use std::fmt::Debug;

/// Record identifier
pub type RecordId = String;

/// Generate a fresh record identifier
pub fn new_record_id() -> RecordId {
    uuid::Uuid::new_v4().to_string()
}

/// A typed query that can test a record
pub trait Matches<E> {
    fn matches(&self, entity: &E) -> bool;
}

/// A record kind stored by the entity store
pub trait Entity: Clone + Debug + Send + Sync + 'static {
    /// Kind name, also used as the collection name
    const KIND: &'static str;

    type Query: Matches<Self> + Debug + Clone + Send + Sync;

    fn id(&self) -> &str;

    /// Natural key that must be unique across the collection, if any
    fn unique_key(&self) -> Option<&str> {
        None
    }
}

/// Equality check for an optional query field
pub(crate) fn field_matches<T: PartialEq + ?Sized>(want: Option<&T>, have: &T) -> bool {
    want.map_or(true, |w| w == have)
}
