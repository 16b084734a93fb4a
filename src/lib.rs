//! fleetd - control plane for a fleet of compute nodes
//!
//! Keeps an authoritative, self-healing view of which nodes are alive and
//! drives network storage mounts across them.
//!
//! ## Components
//!
//! - **Agent**: per-node RPC over NATS (heartbeat, interfaces, commands, files)
//! - **Store**: typed CRUD over nodes, disks, interfaces and mounts (MongoDB or in-memory)
//! - **Events**: in-process lifecycle bus (`node-online`, `mount-created`, ...)
//! - **Fleet**: reconciler, stale sweep, network selector, mount orchestrator, cascade cleanup
//! - **Scheduler**: supervisor for the periodic loops

pub mod agent;
pub mod config;
pub mod events;
pub mod fleet;
pub mod models;
pub mod scheduler;
pub mod store;
pub mod types;

pub use config::Args;
pub use types::{FleetError, Result};
