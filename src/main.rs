//! fleetd - node liveness reconciliation and storage mount orchestration

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fleetd::{
    agent::{NatsAgentChannel, NatsClient},
    config::{Args, LogFormat, StoreBackend},
    events::{EventBus, EventHandler},
    fleet::{CascadeCleanup, FleetContext, FleetReconciler, MountOrchestrator, NetworkSync, StaleSweep},
    scheduler::{ReconcileTask, StaleSweepTask, Supervisor},
    store::{EntityStore, MongoClient},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    // Initialize tracing/logging
    let log_level = args.log_level.clone();
    let json = args.log_format == LogFormat::Json;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("fleetd={},info", log_level).into()),
        )
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(|| tracing_subscriber::fmt::layer()))
        .init();

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  fleetd - fleet control plane");
    info!("======================================");
    info!("Node ID: {}", args.node_id);
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });
    info!("NATS: {}", args.nats.nats_url);
    info!("Agent subjects: {}.<node>.<action>", args.agent_subject_prefix);
    info!("Store: {:?}", args.store);
    info!(
        "Reconcile every {}s, stale sweep every {}s (threshold {}s)",
        args.reconcile_interval_secs, args.stale_sweep_interval_secs, args.stale_threshold_secs
    );
    info!("======================================");

    // The agent channel is mandatory: without it nothing can be reconciled
    let nats = match NatsClient::new(&args.nats, &format!("fleetd-{}", args.node_id)).await {
        Ok(client) => client.with_timeout(args.agent_timeout()),
        Err(e) => {
            error!("NATS connection failed: {}", e);
            std::process::exit(1);
        }
    };

    let store = match args.store {
        StoreBackend::Memory => {
            warn!("Using in-memory store, state is lost on restart");
            EntityStore::memory()
        }
        StoreBackend::Mongo => match connect_mongo(&args).await {
            Ok(store) => store,
            Err(e) if args.dev_mode => {
                warn!("MongoDB unavailable (dev mode, falling back to in-memory store): {}", e);
                EntityStore::memory()
            }
            Err(e) => {
                error!("MongoDB connection failed: {}", e);
                std::process::exit(1);
            }
        },
    };

    let agent = Arc::new(NatsAgentChannel::new(nats.clone(), args.agent_subject_prefix.clone()));
    let events = EventBus::new();
    let ctx = FleetContext::new(store.clone(), agent, events.clone()).with_agent_timeout(args.agent_timeout());

    // Lifecycle subscribers
    let handlers: Vec<Arc<dyn EventHandler>> = vec![
        Arc::new(NetworkSync::new(ctx.clone())),
        Arc::new(MountOrchestrator::new(ctx.clone())),
        Arc::new(CascadeCleanup::new(store.clone())),
    ];
    let handler_tasks: Vec<_> = handlers
        .into_iter()
        .map(|handler| {
            info!(handler = handler.name(), "Subscribing event handler");
            events.spawn_handler(handler)
        })
        .collect();

    let reconciler = Arc::new(FleetReconciler::new(ctx.clone()));
    let stale = Arc::new(StaleSweep::new(ctx.clone(), args.stale_threshold()));

    let supervisor = Supervisor::new()
        .register(Arc::new(ReconcileTask::new(reconciler, args.reconcile_interval())))
        .register(Arc::new(StaleSweepTask::new(stale, args.stale_sweep_interval())));
    supervisor.start().await;

    info!("fleetd running, press Ctrl-C to stop");
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }

    info!("Shutting down");
    supervisor.stop().await;
    // Enough for an in-flight two-step mount pipeline to finish
    events.shutdown(handler_tasks, args.agent_timeout() * 2).await;
    if let Err(e) = nats.flush().await {
        warn!("NATS flush on shutdown failed: {}", e);
    }

    info!("fleetd stopped");
    Ok(())
}

async fn connect_mongo(args: &Args) -> fleetd::Result<EntityStore> {
    let client = MongoClient::new(&args.mongodb_uri, &args.mongodb_db).await?;
    info!("MongoDB connected (database '{}')", client.db_name());
    EntityStore::mongo(&client).await
}
