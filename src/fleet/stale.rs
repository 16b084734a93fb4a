//! Stale sweep
//!
//! Catches agents that stop answering without ever failing a heartbeat: any
//! node still marked online whose record has not been touched within the
//! threshold is forced offline.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::time::Duration;
use tracing::{info, warn};

use super::{FleetContext, SweepReport};
use crate::events::FleetEvent;
use crate::models::NodeQuery;
use crate::types::{FleetError, Result};

/// Default staleness threshold (15 minutes)
pub const DEFAULT_STALE_THRESHOLD: Duration = Duration::from_secs(15 * 60);

pub struct StaleSweep {
    ctx: FleetContext,
    threshold: Duration,
}

impl StaleSweep {
    pub fn new(ctx: FleetContext, threshold: Duration) -> Self {
        Self { ctx, threshold }
    }

    pub async fn sweep(&self) -> Result<SweepReport> {
        self.sweep_at(Utc::now()).await
    }

    /// Sweep as if the current time were `now`
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let threshold = chrono::Duration::from_std(self.threshold)
            .map_err(|e| FleetError::Validation(format!("stale threshold out of range: {}", e)))?;
        let cutoff = now - threshold;

        let stale = self
            .ctx
            .store
            .nodes
            .find(&NodeQuery::all().online(true).updated_before(cutoff))
            .await?;

        let results = join_all(stale.into_iter().map(|mut node| async move {
            let node_key = node.node_key.clone();
            node.mark_stale(now);
            (node_key, self.ctx.store.nodes.update(node).await)
        }))
        .await;

        let mut report = SweepReport::default();
        for (node_key, result) in results {
            match &result {
                Ok(node) => {
                    warn!(node_key = %node_key, hostname = %node.hostname(), "Stale node forced offline");
                    self.ctx.events.publish(FleetEvent::NodeOffline(node.clone()));
                }
                Err(e) => {
                    warn!(node_key = %node_key, error = %e, "Failed to mark stale node offline");
                }
            }
            report.record(&node_key, result);
        }

        if !report.nodes.is_empty() || !report.is_clean() {
            info!(
                marked = report.nodes.len(),
                failed = report.failures.len(),
                "Stale sweep complete"
            );
        }

        Ok(report)
    }
}
