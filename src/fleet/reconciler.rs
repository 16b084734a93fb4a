//! Fleet liveness reconciliation
//!
//! ## State machine
//!
//! `Unknown -> Online -> Offline -> Online -> ...` with no terminal state.
//!
//! | record | heartbeat | action                                           |
//! |--------|-----------|--------------------------------------------------|
//! | no     | no        | `UnknownNode`                                    |
//! | yes    | no        | mark offline if online, emit `node-offline`      |
//! | no     | yes       | create online, emit `node-online`                |
//! | yes    | yes       | refresh telemetry, emit `node-online` on an edge |
//!
//! Any heartbeat failure (timeout, refusal, transport) counts as "no
//! heartbeat". Events are edge-triggered: repeated polling of a steady node
//! emits nothing.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tracing::{debug, info, warn};

use super::{FleetContext, SweepReport};
use crate::agent::with_deadline;
use crate::events::FleetEvent;
use crate::models::{Node, NodeQuery, NodeTelemetry};
use crate::types::{FleetError, Result};

pub struct FleetReconciler {
    ctx: FleetContext,
}

impl FleetReconciler {
    pub fn new(ctx: FleetContext) -> Self {
        Self { ctx }
    }

    /// Reconcile one node against its agent
    pub async fn reconcile_node(&self, node_key: &str) -> Result<Node> {
        let existing = self
            .ctx
            .store
            .nodes
            .find_one(&NodeQuery::by_key(node_key))
            .await?;

        let heartbeat = match with_deadline(
            self.ctx.agent_timeout,
            node_key,
            "heartbeat",
            self.ctx.agent.heartbeat(node_key),
        )
        .await
        {
            Ok(telemetry) => Some(telemetry),
            Err(e) => {
                debug!(node_key = %node_key, error = %e, "No heartbeat");
                None
            }
        };

        let now = Utc::now();

        match (existing, heartbeat) {
            (None, None) => Err(FleetError::UnknownNode(node_key.to_string())),

            (Some(node), None) if !node.online => Ok(node),

            (Some(mut node), None) => {
                node.mark_offline(now);
                let node = self.ctx.store.nodes.update(node).await?;
                warn!(node_key = %node_key, hostname = %node.hostname(), "Node went offline");
                self.ctx.events.publish(FleetEvent::NodeOffline(node.clone()));
                Ok(node)
            }

            (None, Some(telemetry)) => {
                let fresh = Node::from_heartbeat(node_key, telemetry.clone(), now);
                match self.ctx.store.nodes.create(fresh).await {
                    Ok(node) => {
                        info!(node_key = %node_key, hostname = %node.hostname(), "New node registered");
                        self.ctx.events.publish(FleetEvent::NodeOnline(node.clone()));
                        Ok(node)
                    }
                    // A concurrent reconcile registered the key first
                    Err(FleetError::Conflict { .. }) => {
                        debug!(node_key = %node_key, "Node registered concurrently, refreshing");
                        let node = self
                            .ctx
                            .store
                            .nodes
                            .find_one(&NodeQuery::by_key(node_key))
                            .await?
                            .ok_or_else(|| FleetError::UnknownNode(node_key.to_string()))?;
                        self.refresh(node, telemetry, now).await
                    }
                    Err(e) => Err(e),
                }
            }

            (Some(node), Some(telemetry)) => self.refresh(node, telemetry, now).await,
        }
    }

    /// Apply a heartbeat to a stored node, emitting `node-online` on an edge
    async fn refresh(
        &self,
        mut node: Node,
        telemetry: NodeTelemetry,
        now: DateTime<Utc>,
    ) -> Result<Node> {
        let came_online = node.record_heartbeat(telemetry, now);
        let node = self.ctx.store.nodes.update(node).await?;
        if came_online {
            info!(node_key = %node.node_key, hostname = %node.hostname(), "Node back online");
            self.ctx.events.publish(FleetEvent::NodeOnline(node.clone()));
        }
        Ok(node)
    }

    /// Reconcile every known node concurrently
    ///
    /// A stuck agent only costs its own timeout; failures are collected in
    /// the report and never abort the pass.
    pub async fn reconcile_fleet(&self) -> Result<SweepReport> {
        let nodes = self.ctx.store.nodes.find(&NodeQuery::all()).await?;

        let results = join_all(nodes.iter().map(|node| async move {
            (node.node_key.as_str(), self.reconcile_node(&node.node_key).await)
        }))
        .await;

        let mut report = SweepReport::default();
        for (node_key, result) in results {
            if let Err(e) = &result {
                warn!(node_key = %node_key, error = %e, "Node reconciliation failed");
            }
            report.record(node_key, result);
        }

        info!(
            checked = nodes.len(),
            online = report.online_count(),
            offline = report.offline_count(),
            failed = report.failures.len(),
            "Fleet reconciliation complete"
        );

        Ok(report)
    }
}
