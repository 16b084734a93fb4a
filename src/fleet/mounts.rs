//! Mount attach/detach orchestration
//!
//! Turns mount lifecycle events into remote filesystem commands:
//!
//! - created (nfs): `mkdir <mp>` then `mount -t nfs <addr>:<path> <mp>`
//! - removed (nfs): `umount <mp>` then `rm -rf <mp>/`
//! - local mounts: nothing, they already exist on the node
//!
//! Steps run strictly in order and each is caught on its own, so a failed
//! step never suppresses the next one. Nothing is retried; a failed attach
//! leaves the mount record in place.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::selector::select_mount_address;
use super::FleetContext;
use crate::agent::{with_deadline, AgentChannel, CommandResult};
use crate::events::{EventHandler, FleetEvent};
use crate::models::Mount;
use crate::types::{FleetError, Result};

/// Commands that attach an nfs export at the mountpoint
pub fn attach_commands(mountpoint: &str, address: &str, export_path: &str) -> Vec<String> {
    vec![
        format!("mkdir {}", mountpoint),
        format!("mount -t nfs {}:{} {}", address, export_path, mountpoint),
    ]
}

/// Commands that detach and clean up a mountpoint
pub fn detach_commands(mountpoint: &str) -> Vec<String> {
    vec![
        format!("umount {}", mountpoint),
        format!("rm -rf {}/", mountpoint),
    ]
}

/// Result of one pipeline step
#[derive(Debug)]
pub struct StepOutcome {
    pub command: String,
    pub result: Result<CommandResult>,
}

impl StepOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(&self.result, Ok(r) if r.success())
    }
}

#[derive(Debug, Default)]
pub struct PipelineReport {
    pub steps: Vec<StepOutcome>,
}

impl PipelineReport {
    pub fn all_succeeded(&self) -> bool {
        self.steps.iter().all(StepOutcome::succeeded)
    }

    pub fn failed_steps(&self) -> usize {
        self.steps.iter().filter(|s| !s.succeeded()).count()
    }
}

/// Ordered remote commands against one node, each step caught independently
pub struct CommandPipeline {
    agent: Arc<dyn AgentChannel>,
    node_key: String,
    timeout: Duration,
    steps: Vec<String>,
}

impl CommandPipeline {
    pub fn new(agent: Arc<dyn AgentChannel>, node_key: impl Into<String>, timeout: Duration) -> Self {
        Self {
            agent,
            node_key: node_key.into(),
            timeout,
            steps: Vec::new(),
        }
    }

    pub fn steps(mut self, commands: impl IntoIterator<Item = String>) -> Self {
        self.steps.extend(commands);
        self
    }

    /// Run every step in order; failures are logged and recorded, never short-circuit
    pub async fn run(self) -> PipelineReport {
        let mut report = PipelineReport::default();

        for command in self.steps {
            let result = with_deadline(
                self.timeout,
                &self.node_key,
                "cmd",
                self.agent.run_command(&self.node_key, &command),
            )
            .await;

            match &result {
                Ok(r) if r.success() => {
                    debug!(node_key = %self.node_key, command = %command, "Remote command ok");
                }
                Ok(r) => {
                    warn!(
                        node_key = %self.node_key,
                        command = %command,
                        code = r.code,
                        stderr = %r.stderr.trim(),
                        "Remote command exited non-zero"
                    );
                }
                Err(e) => {
                    warn!(node_key = %self.node_key, command = %command, error = %e, "Remote command failed");
                }
            }

            report.steps.push(StepOutcome { command, result });
        }

        report
    }
}

/// Reacts to mount lifecycle events
pub struct MountOrchestrator {
    ctx: FleetContext,
}

impl MountOrchestrator {
    pub fn new(ctx: FleetContext) -> Self {
        Self { ctx }
    }

    /// Attach a newly created mount; `None` for local mounts
    ///
    /// Without an internal or tunnel path to the disk's node the attach is
    /// aborted with `NoReachableNetwork` and no command is issued.
    pub async fn attach(&self, mount: &Mount) -> Result<Option<PipelineReport>> {
        if mount.is_local() {
            debug!(mount = %mount.id, "Local mount, nothing to attach");
            return Ok(None);
        }

        let node = self.ctx.store.nodes.resolve(&mount.node).await?;
        let disk = self.ctx.store.disks.resolve(&mount.device).await?;
        let address = select_mount_address(&self.ctx.store, &disk.node).await?;

        info!(
            node_key = %node.node_key,
            mountpoint = %mount.mountpoint,
            address = %address,
            export = %disk.path,
            "Attaching nfs mount"
        );

        let report = self
            .pipeline(&node.node_key)
            .steps(attach_commands(&mount.mountpoint, &address, &disk.path))
            .run()
            .await;

        Ok(Some(report))
    }

    /// Detach a removed mount; `None` for local mounts
    pub async fn detach(&self, mount: &Mount) -> Result<Option<PipelineReport>> {
        if mount.is_local() {
            debug!(mount = %mount.id, "Local mount, nothing to detach");
            return Ok(None);
        }

        let node = self.ctx.store.nodes.resolve(&mount.node).await?;

        info!(node_key = %node.node_key, mountpoint = %mount.mountpoint, "Detaching nfs mount");

        let report = self
            .pipeline(&node.node_key)
            .steps(detach_commands(&mount.mountpoint))
            .run()
            .await;

        Ok(Some(report))
    }

    fn pipeline(&self, node_key: &str) -> CommandPipeline {
        CommandPipeline::new(self.ctx.agent.clone(), node_key, self.ctx.agent_timeout)
    }
}

fn log_outcome(action: &str, mount: &Mount, outcome: Result<Option<PipelineReport>>) {
    match outcome {
        Ok(Some(report)) if !report.all_succeeded() => {
            warn!(
                mount = %mount.id,
                mountpoint = %mount.mountpoint,
                failed = report.failed_steps(),
                "Mount {} finished with failures",
                action
            );
        }
        Ok(_) => {}
        Err(e @ FleetError::NoReachableNetwork(_)) => {
            error!(mount = %mount.id, mountpoint = %mount.mountpoint, error = %e, "Mount {} aborted", action);
        }
        Err(e) => {
            error!(mount = %mount.id, error = %e, "Mount {} failed", action);
        }
    }
}

#[async_trait]
impl EventHandler for MountOrchestrator {
    fn name(&self) -> &'static str {
        "mount-orchestrator"
    }

    async fn handle(&self, event: &FleetEvent) {
        match event {
            FleetEvent::MountCreated(mount) => log_outcome("attach", mount, self.attach(mount).await),
            FleetEvent::MountRemoved(mount) => log_outcome("detach", mount, self.detach(mount).await),
            _ => {}
        }
    }
}
