//! Shared fixtures for integration tests
//!
//! A scripted in-process agent channel, a repository wrapper that fails on
//! demand, and helpers for building a fleet context over the in-memory store.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

use fleetd::agent::{AgentChannel, CommandResult};
use fleetd::events::{EventBus, FleetEvent};
use fleetd::fleet::FleetContext;
use fleetd::models::{Entity, InterfaceReport, Node, NodeTelemetry};
use fleetd::store::{EntityStore, MemoryRepository, Repository};
use fleetd::{FleetError, Result};

/// Agent timeout used by every test context
pub const TEST_AGENT_TIMEOUT: Duration = Duration::from_millis(100);

/// Scripted agent channel
///
/// Nodes answer heartbeats only while marked alive; hung nodes never answer.
/// Every command and file write is recorded in call order.
#[derive(Default)]
pub struct MockAgent {
    alive: Mutex<HashMap<String, NodeTelemetry>>,
    hung: Mutex<HashSet<String>>,
    latency: Mutex<Option<Duration>>,
    networks: Mutex<HashMap<String, Vec<InterfaceReport>>>,
    failing_commands: Mutex<Vec<String>>,
    failing_writes: Mutex<HashSet<String>>,
    commands: Mutex<Vec<(String, String)>>,
    writes: Mutex<Vec<(String, String, String)>>,
}

impl MockAgent {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_alive(&self, node_key: &str, hostname: &str) {
        self.alive
            .lock()
            .unwrap()
            .insert(node_key.to_string(), telemetry(hostname));
    }

    pub fn set_telemetry(&self, node_key: &str, telemetry: NodeTelemetry) {
        self.alive.lock().unwrap().insert(node_key.to_string(), telemetry);
    }

    pub fn set_dead(&self, node_key: &str) {
        self.alive.lock().unwrap().remove(node_key);
    }

    /// Calls to this node never return
    pub fn hang(&self, node_key: &str) {
        self.hung.lock().unwrap().insert(node_key.to_string());
    }

    /// Heartbeats wait this long before answering
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = Some(latency);
    }

    pub fn set_networks(&self, node_key: &str, reports: Vec<InterfaceReport>) {
        self.networks
            .lock()
            .unwrap()
            .insert(node_key.to_string(), reports);
    }

    /// Commands starting with `prefix` fail with `RemoteCommand`
    pub fn fail_command(&self, prefix: &str) {
        self.failing_commands.lock().unwrap().push(prefix.to_string());
    }

    pub fn fail_write(&self, path: &str) {
        self.failing_writes.lock().unwrap().insert(path.to_string());
    }

    /// `(node_key, command)` in call order
    pub fn commands(&self) -> Vec<(String, String)> {
        self.commands.lock().unwrap().clone()
    }

    pub fn commands_for(&self, node_key: &str) -> Vec<String> {
        self.commands()
            .into_iter()
            .filter(|(key, _)| key == node_key)
            .map(|(_, cmd)| cmd)
            .collect()
    }

    /// `(node_key, path, data)` in call order
    pub fn writes(&self) -> Vec<(String, String, String)> {
        self.writes.lock().unwrap().clone()
    }

    fn is_hung(&self, node_key: &str) -> bool {
        self.hung.lock().unwrap().contains(node_key)
    }

    async fn stall() {
        tokio::time::sleep(Duration::from_secs(3600)).await;
    }
}

#[async_trait]
impl AgentChannel for MockAgent {
    async fn heartbeat(&self, node_key: &str) -> Result<NodeTelemetry> {
        if self.is_hung(node_key) {
            Self::stall().await;
        }
        let latency = *self.latency.lock().unwrap();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        let alive = self.alive.lock().unwrap().get(node_key).cloned();
        alive.ok_or_else(|| FleetError::Nats(format!("no responders for {}", node_key)))
    }

    async fn list_networks(&self, node_key: &str) -> Result<Vec<InterfaceReport>> {
        if self.is_hung(node_key) {
            Self::stall().await;
        }
        Ok(self
            .networks
            .lock()
            .unwrap()
            .get(node_key)
            .cloned()
            .unwrap_or_default())
    }

    async fn run_command(&self, node_key: &str, command: &str) -> Result<CommandResult> {
        self.commands
            .lock()
            .unwrap()
            .push((node_key.to_string(), command.to_string()));

        let fails = self
            .failing_commands
            .lock()
            .unwrap()
            .iter()
            .any(|prefix| command.starts_with(prefix.as_str()));

        if fails {
            return Err(FleetError::RemoteCommand {
                node: node_key.to_string(),
                message: format!("{}: failed", command),
            });
        }
        Ok(CommandResult::default())
    }

    async fn write_file(&self, node_key: &str, path: &str, data: &str) -> Result<()> {
        self.writes
            .lock()
            .unwrap()
            .push((node_key.to_string(), path.to_string(), data.to_string()));

        if self.failing_writes.lock().unwrap().contains(path) {
            return Err(FleetError::RemoteCommand {
                node: node_key.to_string(),
                message: format!("EACCES: {}", path),
            });
        }
        Ok(())
    }
}

/// In-memory repository whose updates and deletes fail for chosen ids
pub struct FlakyRepository<E: Entity> {
    inner: MemoryRepository<E>,
    broken: Mutex<HashSet<String>>,
}

impl<E: Entity> FlakyRepository<E> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryRepository::new(),
            broken: Mutex::new(HashSet::new()),
        })
    }

    pub fn break_id(&self, id: &str) {
        self.broken.lock().unwrap().insert(id.to_string());
    }

    fn check(&self, id: &str) -> Result<()> {
        if self.broken.lock().unwrap().contains(id) {
            return Err(FleetError::Database(format!("write to {} rejected", id)));
        }
        Ok(())
    }
}

#[async_trait]
impl<E: Entity> Repository<E> for FlakyRepository<E> {
    async fn find(&self, query: &E::Query) -> Result<Vec<E>> {
        self.inner.find(query).await
    }

    async fn get(&self, id: &str) -> Result<Option<E>> {
        self.inner.get(id).await
    }

    async fn create(&self, entity: E) -> Result<E> {
        self.inner.create(entity).await
    }

    async fn update(&self, entity: E) -> Result<E> {
        self.check(entity.id())?;
        self.inner.update(entity).await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.check(id)?;
        self.inner.delete(id).await
    }
}

pub fn telemetry(hostname: &str) -> NodeTelemetry {
    let mut telemetry = NodeTelemetry {
        hostname: hostname.to_string(),
        arch: "x64".to_string(),
        platform: "linux".to_string(),
        os_type: "Linux".to_string(),
        ..Default::default()
    };
    telemetry.cpu.cores = 8;
    telemetry.memory.total = 16 * 1024 * 1024 * 1024;
    telemetry.memory.used = 4 * 1024 * 1024 * 1024;
    telemetry
}

/// Fleet context over `store` with the short test timeout
pub fn context_with(store: EntityStore, agent: Arc<MockAgent>) -> FleetContext {
    FleetContext::new(store, agent, EventBus::new()).with_agent_timeout(TEST_AGENT_TIMEOUT)
}

pub fn context(agent: Arc<MockAgent>) -> FleetContext {
    context_with(EntityStore::memory(), agent)
}

/// Insert an online node record directly
pub async fn seed_node(store: &EntityStore, node_key: &str, hostname: &str) -> Node {
    store
        .nodes
        .create(Node::from_heartbeat(node_key, telemetry(hostname), chrono::Utc::now()))
        .await
        .unwrap()
}

/// Everything published so far
pub fn drain(rx: &mut broadcast::Receiver<FleetEvent>) -> Vec<FleetEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn event_names(events: &[FleetEvent]) -> Vec<&'static str> {
    events.iter().map(FleetEvent::name).collect()
}
