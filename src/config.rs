//! Configuration for fleetd
//!
//! CLI arguments and environment variable handling using clap.

use clap::{Parser, ValueEnum};
use std::time::Duration;
use uuid::Uuid;

/// fleetd - node liveness and mount orchestration for a compute fleet
#[derive(Parser, Debug, Clone)]
#[command(name = "fleetd")]
#[command(about = "Fleet control plane: node liveness reconciliation and storage mounts")]
pub struct Args {
    /// Unique identifier for this control-plane instance
    #[arg(long, env = "NODE_ID", default_value_t = Uuid::new_v4())]
    pub node_id: Uuid,

    /// Enable development mode (in-memory store fallback when MongoDB is down)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// NATS configuration
    #[command(flatten)]
    pub nats: NatsArgs,

    /// Entity store backend
    #[arg(long, env = "STORE", value_enum, default_value_t = StoreBackend::Mongo)]
    pub store: StoreBackend,

    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "fleet")]
    pub mongodb_db: String,

    /// Subject prefix agents listen on (`<prefix>.<node_key>.<action>`)
    #[arg(long, env = "AGENT_SUBJECT_PREFIX", default_value = "fleet.agent")]
    pub agent_subject_prefix: String,

    /// Timeout for a single agent call in milliseconds
    #[arg(long, env = "AGENT_TIMEOUT_MS", default_value = "10000")]
    pub agent_timeout_ms: u64,

    /// Seconds between full fleet reconciliation passes
    #[arg(long, env = "RECONCILE_INTERVAL_SECS", default_value = "300")]
    pub reconcile_interval_secs: u64,

    /// Seconds between stale sweeps
    #[arg(long, env = "STALE_SWEEP_INTERVAL_SECS", default_value = "60")]
    pub stale_sweep_interval_secs: u64,

    /// Online nodes not updated for this many seconds are forced offline
    #[arg(long, env = "STALE_THRESHOLD_SECS", default_value = "900")]
    pub stale_threshold_secs: u64,
}

/// NATS connection configuration
#[derive(Parser, Debug, Clone)]
pub struct NatsArgs {
    /// NATS server URL
    #[arg(long, env = "NATS_URL", default_value = "nats://127.0.0.1:4222")]
    pub nats_url: String,

    /// NATS username (optional)
    #[arg(long, env = "NATS_USER")]
    pub nats_user: Option<String>,

    /// NATS password (optional)
    #[arg(long, env = "NATS_PASSWORD")]
    pub nats_password: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreBackend {
    Mongo,
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

impl Args {
    pub fn agent_timeout(&self) -> Duration {
        Duration::from_millis(self.agent_timeout_ms)
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs)
    }

    pub fn stale_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.stale_sweep_interval_secs)
    }

    pub fn stale_threshold(&self) -> Duration {
        Duration::from_secs(self.stale_threshold_secs)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.agent_timeout_ms == 0 {
            return Err("AGENT_TIMEOUT_MS must be greater than zero".to_string());
        }

        if self.reconcile_interval_secs == 0 || self.stale_sweep_interval_secs == 0 {
            return Err("Sweep intervals must be greater than zero".to_string());
        }

        if self.stale_threshold_secs < self.stale_sweep_interval_secs {
            return Err(
                "STALE_THRESHOLD_SECS must not be shorter than STALE_SWEEP_INTERVAL_SECS".to_string(),
            );
        }

        if self.agent_subject_prefix.trim().is_empty() {
            return Err("AGENT_SUBJECT_PREFIX must not be empty".to_string());
        }

        Ok(())
    }
}
