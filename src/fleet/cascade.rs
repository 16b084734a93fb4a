//! Dependent record cleanup on node removal
//!
//! Disks, mounts and interfaces referencing the removed node are each
//! found and deleted concurrently. A failed delete is logged and never
//! blocks its siblings; nothing is retried.

use async_trait::async_trait;
use futures::future::join_all;
use tracing::{info, warn};

use crate::events::{EventHandler, FleetEvent};
use crate::models::{DiskQuery, Entity, MountQuery, NetworkQuery};
use crate::store::{EntityStore, Repository};
use crate::types::FleetError;

#[derive(Debug, Default)]
pub struct CascadeReport {
    pub disks_deleted: usize,
    pub mounts_deleted: usize,
    pub networks_deleted: usize,
    /// `(kind, record id, error)`
    pub failures: Vec<(&'static str, String, FleetError)>,
}

impl CascadeReport {
    pub fn deleted(&self) -> usize {
        self.disks_deleted + self.mounts_deleted + self.networks_deleted
    }
}

/// Delete every record matching `query`, returning (deleted, failures)
async fn purge<E: Entity>(
    repo: &dyn Repository<E>,
    query: E::Query,
) -> (usize, Vec<(&'static str, String, FleetError)>) {
    let records = match repo.find(&query).await {
        Ok(records) => records,
        Err(e) => return (0, vec![(E::KIND, String::new(), e)]),
    };

    let results = join_all(records.iter().map(|record| async move {
        (record.id().to_string(), repo.delete(record.id()).await)
    }))
    .await;

    let mut deleted = 0;
    let mut failures = Vec::new();
    for (id, result) in results {
        match result {
            Ok(()) => deleted += 1,
            Err(e) => {
                warn!(kind = E::KIND, id = %id, error = %e, "Cascade delete failed");
                failures.push((E::KIND, id, e));
            }
        }
    }
    (deleted, failures)
}

pub struct CascadeCleanup {
    store: EntityStore,
}

impl CascadeCleanup {
    pub fn new(store: EntityStore) -> Self {
        Self { store }
    }

    /// Remove every disk, mount and interface owned by `node_id`
    pub async fn cleanup(&self, node_id: &str) -> CascadeReport {
        let ((disks, disk_failures), (mounts, mount_failures), (networks, network_failures)) = tokio::join!(
            purge(self.store.disks.as_ref(), DiskQuery::by_node(node_id)),
            purge(self.store.mounts.as_ref(), MountQuery::by_node(node_id)),
            purge(self.store.networks.as_ref(), NetworkQuery::by_node(node_id)),
        );

        let mut failures = disk_failures;
        failures.extend(mount_failures);
        failures.extend(network_failures);

        CascadeReport {
            disks_deleted: disks,
            mounts_deleted: mounts,
            networks_deleted: networks,
            failures,
        }
    }
}

#[async_trait]
impl EventHandler for CascadeCleanup {
    fn name(&self) -> &'static str {
        "cascade-cleanup"
    }

    async fn handle(&self, event: &FleetEvent) {
        if let FleetEvent::NodeRemoved(node) = event {
            let report = self.cleanup(&node.id).await;
            info!(
                node_key = %node.node_key,
                disks = report.disks_deleted,
                mounts = report.mounts_deleted,
                networks = report.networks_deleted,
                failed = report.failures.len(),
                "Removed node's dependent records"
            );
        }
    }
}
