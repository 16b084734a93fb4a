//! Periodic task supervisor
//!
//! Owns the fixed-interval loops (fleet reconciliation, stale sweep) with an
//! explicit start/stop lifecycle. `run_once` drives a single tick by name so
//! tests never wait on a timer.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::fleet::{FleetReconciler, StaleSweep};
use crate::types::{FleetError, Result};

#[async_trait]
pub trait PeriodicTask: Send + Sync {
    fn name(&self) -> &'static str;

    fn interval(&self) -> Duration;

    async fn run(&self) -> Result<()>;
}

pub struct Supervisor {
    tasks: Vec<Arc<dyn PeriodicTask>>,
    shutdown_tx: broadcast::Sender<()>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Supervisor {
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            tasks: Vec::new(),
            shutdown_tx,
            handles: Mutex::new(Vec::new()),
        }
    }

    pub fn register(mut self, task: Arc<dyn PeriodicTask>) -> Self {
        self.tasks.push(task);
        self
    }

    pub fn task_names(&self) -> Vec<&'static str> {
        self.tasks.iter().map(|t| t.name()).collect()
    }

    /// Spawn one loop per task; the first tick fires immediately
    pub async fn start(&self) {
        let mut handles = self.handles.lock().await;
        if !handles.is_empty() {
            debug!("Supervisor already running");
            return;
        }

        for task in &self.tasks {
            let task = Arc::clone(task);
            let mut shutdown_rx = self.shutdown_tx.subscribe();

            info!(task = task.name(), interval_secs = task.interval().as_secs(), "Starting periodic task");

            handles.push(tokio::spawn(async move {
                let mut tick = interval(task.interval());
                tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

                loop {
                    tokio::select! {
                        _ = tick.tick() => {
                            if let Err(e) = task.run().await {
                                error!(task = task.name(), error = %e, "Periodic task failed");
                            }
                        }
                        _ = shutdown_rx.recv() => {
                            debug!(task = task.name(), "Periodic task shutting down");
                            break;
                        }
                    }
                }
            }));
        }
    }

    /// Signal every loop to stop and wait for them to finish
    pub async fn stop(&self) {
        info!("Stopping supervisor");
        let _ = self.shutdown_tx.send(());

        let mut handles = self.handles.lock().await;
        for handle in handles.drain(..) {
            if let Err(e) = handle.await {
                error!(error = %e, "Periodic task ended abnormally");
            }
        }
    }

    pub async fn is_running(&self) -> bool {
        !self.handles.lock().await.is_empty()
    }

    /// Run one tick of the named task now
    pub async fn run_once(&self, name: &str) -> Result<()> {
        let task = self
            .tasks
            .iter()
            .find(|t| t.name() == name)
            .ok_or_else(|| FleetError::NotFound {
                kind: "task",
                id: name.to_string(),
            })?;
        task.run().await
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

/// Full fleet reconciliation on a fixed interval
pub struct ReconcileTask {
    reconciler: Arc<FleetReconciler>,
    interval: Duration,
}

impl ReconcileTask {
    pub fn new(reconciler: Arc<FleetReconciler>, interval: Duration) -> Self {
        Self { reconciler, interval }
    }
}

#[async_trait]
impl PeriodicTask for ReconcileTask {
    fn name(&self) -> &'static str {
        "reconcile"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn run(&self) -> Result<()> {
        self.reconciler.reconcile_fleet().await.map(|_| ())
    }
}

/// Stale sweep on a fixed interval
pub struct StaleSweepTask {
    sweep: Arc<StaleSweep>,
    interval: Duration,
}

impl StaleSweepTask {
    pub fn new(sweep: Arc<StaleSweep>, interval: Duration) -> Self {
        Self { sweep, interval }
    }
}

#[async_trait]
impl PeriodicTask for StaleSweepTask {
    fn name(&self) -> &'static str {
        "stale-sweep"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn run(&self) -> Result<()> {
        self.sweep.sweep().await.map(|_| ())
    }
}
