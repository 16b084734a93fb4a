//! Fleet control plane
//!
//! ## Components
//!
//! - `reconciler` - heartbeat-driven online/offline state machine per node
//! - `stale` - forces nodes without recent updates offline
//! - `networks` - syncs interface topology when a node comes online
//! - `selector` - picks the network path used for mount traffic
//! - `mounts` - drives attach/detach command sequences on mount lifecycle
//! - `cascade` - deletes dependent records when a node is removed
//! - `registry` - operator-facing node, disk and mount operations
//!
//! Everything here shares one `FleetContext`: the entity store, the agent
//! channel, the event bus and the per-call agent timeout.

pub mod cascade;
pub mod mounts;
pub mod networks;
pub mod reconciler;
pub mod registry;
pub mod selector;
pub mod stale;

pub use cascade::{CascadeCleanup, CascadeReport};
pub use mounts::{attach_commands, detach_commands, CommandPipeline, MountOrchestrator, PipelineReport};
pub use networks::NetworkSync;
pub use reconciler::FleetReconciler;
pub use registry::{Certificate, CertificateResolver, FleetService, FleetStats, MountView, NodeView, WriteOutcome};
pub use selector::select_mount_address;
pub use stale::StaleSweep;

use std::sync::Arc;
use std::time::Duration;

use crate::agent::AgentChannel;
use crate::events::EventBus;
use crate::models::Node;
use crate::store::EntityStore;
use crate::types::FleetError;

/// Default bound on a single agent call
pub const DEFAULT_AGENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared handles used by every fleet component
#[derive(Clone)]
pub struct FleetContext {
    pub store: EntityStore,
    pub agent: Arc<dyn AgentChannel>,
    pub events: EventBus,
    pub agent_timeout: Duration,
}

impl FleetContext {
    pub fn new(store: EntityStore, agent: Arc<dyn AgentChannel>, events: EventBus) -> Self {
        Self {
            store,
            agent,
            events,
            agent_timeout: DEFAULT_AGENT_TIMEOUT,
        }
    }

    pub fn with_agent_timeout(mut self, timeout: Duration) -> Self {
        self.agent_timeout = timeout;
        self
    }
}

/// Outcome of a fleet-wide pass; per-node failures never abort the pass
#[derive(Debug, Default)]
pub struct SweepReport {
    pub nodes: Vec<Node>,
    pub failures: Vec<(String, FleetError)>,
}

impl SweepReport {
    pub fn record(&mut self, node_key: &str, result: crate::Result<Node>) {
        match result {
            Ok(node) => self.nodes.push(node),
            Err(e) => self.failures.push((node_key.to_string(), e)),
        }
    }

    pub fn online_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.online).count()
    }

    pub fn offline_count(&self) -> usize {
        self.nodes.iter().filter(|n| !n.online).count()
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}
