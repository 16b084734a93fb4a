//! Interface topology sync
//!
//! When a node comes online its agent's interface list is upserted by
//! `(node, address)`. Interfaces the agent stops reporting are left alone.

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::FleetContext;
use crate::agent::with_deadline;
use crate::events::{EventHandler, FleetEvent};
use crate::models::{NetworkInterface, NetworkQuery, Node};
use crate::types::Result;

pub struct NetworkSync {
    ctx: FleetContext,
}

impl NetworkSync {
    pub fn new(ctx: FleetContext) -> Self {
        Self { ctx }
    }

    /// Pull the node's interfaces and upsert each; returns how many were written
    ///
    /// Upserts run in reported order so insertion order follows the agent's.
    pub async fn sync_node(&self, node: &Node) -> Result<usize> {
        let reports = with_deadline(
            self.ctx.agent_timeout,
            &node.node_key,
            "listNetworks",
            self.ctx.agent.list_networks(&node.node_key),
        )
        .await?;

        let mut written = 0;
        for report in reports {
            let query = NetworkQuery::by_node(node.id.as_str()).address(report.address.as_str());
            let result = match self.ctx.store.networks.find_one(&query).await {
                Ok(Some(mut iface)) => {
                    iface.apply_report(report);
                    self.ctx.store.networks.update(iface).await
                }
                Ok(None) => {
                    self.ctx
                        .store
                        .networks
                        .create(NetworkInterface::from_report(node.id.as_str(), report))
                        .await
                }
                Err(e) => Err(e),
            };

            match result {
                Ok(iface) => {
                    debug!(node_key = %node.node_key, address = %iface.address, "Interface synced");
                    written += 1;
                }
                Err(e) => {
                    warn!(node_key = %node.node_key, error = %e, "Failed to sync interface");
                }
            }
        }

        info!(node_key = %node.node_key, interfaces = written, "Network topology synced");
        Ok(written)
    }
}

#[async_trait]
impl EventHandler for NetworkSync {
    fn name(&self) -> &'static str {
        "network-sync"
    }

    async fn handle(&self, event: &FleetEvent) {
        if let FleetEvent::NodeOnline(node) = event {
            if let Err(e) = self.sync_node(node).await {
                warn!(node_key = %node.node_key, error = %e, "Network sync failed");
            }
        }
    }
}
