//! Operator-facing fleet operations
//!
//! Node lookup, certificate push, fleet totals, node-scoped listings and the
//! operator mutations that feed the lifecycle bus (`remove_node`,
//! `create_mount`, `remove_mount`).
//!
//! A scope naming a node that does not resolve is rejected with
//! `PermissionDenied`, the same answer the authorization layer gives.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use super::FleetContext;
use crate::agent::with_deadline;
use crate::events::FleetEvent;
use crate::models::{
    Disk, DiskQuery, DiskType, Mount, MountQuery, MountType, NetworkInterface, NetworkQuery, Node,
    NodeQuery,
};
use crate::types::{FleetError, Result};

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// TLS material for a domain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Certificate {
    pub cert: String,
    pub privkey: String,
}

/// Looks up the current certificate for a domain
#[async_trait]
pub trait CertificateResolver: Send + Sync {
    async fn resolve_domain(&self, domain: &str) -> Result<Certificate>;
}

/// Outcome of one file write in `write_cert`
#[derive(Debug)]
pub struct WriteOutcome {
    pub path: String,
    pub result: Result<()>,
}

/// Fleet-wide capacity totals
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FleetStats {
    /// Total CPU cores
    pub cpu: u64,
    /// Total memory in GiB
    pub memory: f64,
    /// Used memory in GiB
    pub memory_used: f64,
}

/// A node with its non-docker interfaces
#[derive(Debug, Clone)]
pub struct NodeView {
    pub node: Node,
    pub networks: Vec<NetworkInterface>,
}

/// A mount with its node and disk resolved
#[derive(Debug, Clone)]
pub struct MountView {
    pub mount: Mount,
    pub node: Option<Node>,
    pub device: Option<Disk>,
}

pub struct FleetService {
    ctx: FleetContext,
    certificates: Option<Arc<dyn CertificateResolver>>,
}

impl FleetService {
    pub fn new(ctx: FleetContext) -> Self {
        Self {
            ctx,
            certificates: None,
        }
    }

    pub fn with_certificates(mut self, resolver: Arc<dyn CertificateResolver>) -> Self {
        self.certificates = Some(resolver);
        self
    }

    /// Find a node by hostname, falling back to node key
    pub async fn resolve_node(&self, name: &str) -> Result<Option<Node>> {
        let nodes = &self.ctx.store.nodes;
        match nodes.find_one(&NodeQuery::by_hostname(name)).await? {
            Some(node) => Ok(Some(node)),
            None => nodes.find_one(&NodeQuery::by_key(name)).await,
        }
    }

    /// Push a domain's certificate and key to a node
    ///
    /// Both writes are issued together and reported independently; one
    /// failing does not cancel the other.
    pub async fn write_cert(
        &self,
        node_key: &str,
        domain: &str,
        cert_path: &str,
        key_path: &str,
    ) -> Result<Vec<WriteOutcome>> {
        if self
            .ctx
            .store
            .nodes
            .find_one(&NodeQuery::by_key(node_key))
            .await?
            .is_none()
        {
            return Err(FleetError::UnknownNode(node_key.to_string()));
        }

        let resolver = self
            .certificates
            .as_ref()
            .ok_or_else(|| FleetError::Validation("no certificate resolver configured".to_string()))?;
        let certificate = resolver.resolve_domain(domain).await?;

        let (cert_result, key_result) = tokio::join!(
            self.write_file(node_key, cert_path, &certificate.cert),
            self.write_file(node_key, key_path, &certificate.privkey),
        );

        let outcomes = vec![
            WriteOutcome {
                path: cert_path.to_string(),
                result: cert_result,
            },
            WriteOutcome {
                path: key_path.to_string(),
                result: key_result,
            },
        ];

        for outcome in &outcomes {
            match &outcome.result {
                Ok(()) => info!(node_key = %node_key, domain = %domain, path = %outcome.path, "Certificate file written"),
                Err(e) => warn!(node_key = %node_key, domain = %domain, path = %outcome.path, error = %e, "Certificate file write failed"),
            }
        }

        Ok(outcomes)
    }

    async fn write_file(&self, node_key: &str, path: &str, data: &str) -> Result<()> {
        with_deadline(
            self.ctx.agent_timeout,
            node_key,
            "fs.writeFile",
            self.ctx.agent.write_file(node_key, path, data),
        )
        .await
    }

    /// Sum of cores and memory across every known node
    pub async fn stats(&self) -> Result<FleetStats> {
        let nodes = self.ctx.store.nodes.find(&NodeQuery::all()).await?;

        Ok(nodes.iter().fold(FleetStats::default(), |mut stats, node| {
            stats.cpu += u64::from(node.telemetry.cpu.cores);
            stats.memory += node.telemetry.memory.total as f64 / GIB;
            stats.memory_used += node.telemetry.memory.used as f64 / GIB;
            stats
        }))
    }

    /// The node must exist for a scoped call to proceed
    async fn authorize_node(&self, node_id: &str) -> Result<Node> {
        self.ctx
            .store
            .nodes
            .get(node_id)
            .await?
            .ok_or_else(|| FleetError::PermissionDenied(format!("no access to node {}", node_id)))
    }

    /// A node with its non-docker interfaces populated
    pub async fn node_view(&self, node_id: &str) -> Result<NodeView> {
        let node = self.ctx.store.nodes.resolve(node_id).await?;
        let networks = self
            .ctx
            .store
            .networks
            .find(&NetworkQuery::by_node(node_id).docker(false))
            .await?;
        Ok(NodeView { node, networks })
    }

    pub async fn networks(&self, scope: Option<&str>) -> Result<Vec<NetworkInterface>> {
        let query = match scope {
            Some(node_id) => NetworkQuery::by_node(self.authorize_node(node_id).await?.id),
            None => NetworkQuery::default(),
        };
        self.ctx.store.networks.find(&query).await
    }

    /// Interface holding `address`, with its node
    pub async fn network_by_address(&self, address: &str) -> Result<Option<(NetworkInterface, Option<Node>)>> {
        let query = NetworkQuery::default().address(address);
        match self.ctx.store.networks.find_one(&query).await? {
            Some(iface) => {
                let node = self.ctx.store.nodes.get(&iface.node).await?;
                Ok(Some((iface, node)))
            }
            None => Ok(None),
        }
    }

    pub async fn disks(&self, scope: Option<&str>) -> Result<Vec<Disk>> {
        let query = match scope {
            Some(node_id) => DiskQuery::by_node(self.authorize_node(node_id).await?.id),
            None => DiskQuery::default(),
        };
        self.ctx.store.disks.find(&query).await
    }

    pub async fn mounts(&self, scope: Option<&str>) -> Result<Vec<MountView>> {
        let query = match scope {
            Some(node_id) => MountQuery::by_node(self.authorize_node(node_id).await?.id),
            None => MountQuery::default(),
        };

        let mounts = self.ctx.store.mounts.find(&query).await?;
        let mut views = Vec::with_capacity(mounts.len());
        for mount in mounts {
            let node = self.ctx.store.nodes.get(&mount.node).await?;
            let device = self.ctx.store.disks.get(&mount.device).await?;
            views.push(MountView { mount, node, device });
        }
        Ok(views)
    }

    /// Delete a node record and announce it; dependents are cleaned up by subscribers
    pub async fn remove_node(&self, node_id: &str) -> Result<Node> {
        let node = self.ctx.store.nodes.resolve(node_id).await?;
        self.ctx.store.nodes.delete(&node.id).await?;
        info!(node_key = %node.node_key, hostname = %node.hostname(), "Node removed");
        self.ctx.events.publish(FleetEvent::NodeRemoved(node.clone()));
        Ok(node)
    }

    pub async fn create_disk(
        &self,
        node_id: &str,
        path: &str,
        disk_type: DiskType,
        size: u64,
        device: &str,
    ) -> Result<Disk> {
        let node = self.authorize_node(node_id).await?;
        require_absolute("path", path)?;

        let disk = self
            .ctx
            .store
            .disks
            .create(Disk::new(node.id, path, disk_type, size, device))
            .await?;
        info!(disk = %disk.id, node = %disk.node, path = %disk.path, "Disk created");
        Ok(disk)
    }

    /// Delete a disk; mounts that still reference it are left in place
    pub async fn remove_disk(&self, disk_id: &str) -> Result<Disk> {
        let disk = self.ctx.store.disks.resolve(disk_id).await?;

        let dependents = self.ctx.store.mounts.find(&MountQuery::by_device(disk_id)).await?;
        if !dependents.is_empty() {
            warn!(disk = %disk.id, mounts = dependents.len(), "Removing disk still referenced by mounts");
        }

        self.ctx.store.disks.delete(&disk.id).await?;
        info!(disk = %disk.id, node = %disk.node, "Disk removed");
        Ok(disk)
    }

    /// Create a mount record and announce it to the orchestrator
    pub async fn create_mount(
        &self,
        node_id: &str,
        disk_id: &str,
        mountpoint: &str,
        mount_type: MountType,
    ) -> Result<Mount> {
        let node = self.authorize_node(node_id).await?;
        let disk = self.ctx.store.disks.resolve(disk_id).await?;
        require_absolute("mountpoint", mountpoint)?;

        let mount = self
            .ctx
            .store
            .mounts
            .create(Mount::new(node.id, disk.id, mountpoint, mount_type))
            .await?;
        info!(mount = %mount.id, node_key = %node.node_key, mountpoint = %mount.mountpoint, "Mount created");
        self.ctx.events.publish(FleetEvent::MountCreated(mount.clone()));
        Ok(mount)
    }

    pub async fn remove_mount(&self, mount_id: &str) -> Result<Mount> {
        let mount = self.ctx.store.mounts.resolve(mount_id).await?;
        self.ctx.store.mounts.delete(&mount.id).await?;
        info!(mount = %mount.id, mountpoint = %mount.mountpoint, "Mount removed");
        self.ctx.events.publish(FleetEvent::MountRemoved(mount.clone()));
        Ok(mount)
    }
}

fn require_absolute(field: &str, path: &str) -> Result<()> {
    if path.starts_with('/') && path.len() > 1 {
        Ok(())
    } else {
        Err(FleetError::Validation(format!("{} must be an absolute path, got '{}'", field, path)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_absolute() {
        assert!(require_absolute("mountpoint", "/mnt/x").is_ok());
        assert!(require_absolute("mountpoint", "mnt/x").is_err());
        assert!(require_absolute("mountpoint", "/").is_err());
        assert!(require_absolute("mountpoint", "").is_err());
    }

    #[test]
    fn test_stats_wire_format() {
        let stats = FleetStats {
            cpu: 16,
            memory: 32.0,
            memory_used: 8.5,
        };
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["memoryUsed"], 8.5);
        assert_eq!(json["cpu"], 16);
    }
}
