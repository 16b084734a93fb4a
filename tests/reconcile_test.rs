//! Fleet reconciliation integration tests
//!
//! Drives the reconciler against a scripted agent and the in-memory store:
//! - the heartbeat decision table
//! - edge-triggered online/offline events
//! - per-node isolation of hung agents during a fleet pass
//! - interface sync on node-online

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_test::{assert_err, assert_ok};

use common::{context, drain, event_names, seed_node, telemetry, MockAgent};
use fleetd::events::{EventHandler, FleetEvent};
use fleetd::fleet::{FleetReconciler, NetworkSync};
use fleetd::models::{InterfaceReport, NetworkQuery, NodeQuery};
use fleetd::scheduler::{ReconcileTask, Supervisor};
use fleetd::FleetError;

// =============================================================================
// Decision table
// =============================================================================

#[tokio::test]
async fn test_unknown_node_without_heartbeat_fails() {
    let agent = MockAgent::new();
    let ctx = context(agent);
    let reconciler = FleetReconciler::new(ctx.clone());

    let err = assert_err!(reconciler.reconcile_node("ghost").await);
    assert!(matches!(err, FleetError::UnknownNode(key) if key == "ghost"));

    let nodes = assert_ok!(ctx.store.nodes.find(&NodeQuery::all()).await);
    assert!(nodes.is_empty());
}

#[tokio::test]
async fn test_first_heartbeat_registers_node() {
    let agent = MockAgent::new();
    agent.set_alive("agent-1", "alpha");
    let ctx = context(agent);
    let mut rx = ctx.events.subscribe();
    let reconciler = FleetReconciler::new(ctx.clone());

    let node = assert_ok!(reconciler.reconcile_node("agent-1").await);
    assert!(node.online);
    assert_eq!(node.hostname(), "alpha");
    assert!(node.online_at.is_some());

    let stored = assert_ok!(ctx.store.nodes.find(&NodeQuery::by_key("agent-1")).await);
    assert_eq!(stored.len(), 1);

    assert_eq!(event_names(&drain(&mut rx)), vec!["node-online"]);
}

#[tokio::test]
async fn test_concurrent_first_heartbeats_register_once() {
    let agent = MockAgent::new();
    agent.set_alive("agent-1", "alpha");
    agent.set_latency(Duration::from_millis(10));
    let ctx = context(agent);
    let mut rx = ctx.events.subscribe();
    let reconciler = FleetReconciler::new(ctx.clone());

    let (a, b) = tokio::join!(
        reconciler.reconcile_node("agent-1"),
        reconciler.reconcile_node("agent-1")
    );
    let a = assert_ok!(a);
    let b = assert_ok!(b);
    assert_eq!(a.id, b.id);

    let stored = assert_ok!(ctx.store.nodes.find(&NodeQuery::by_key("agent-1")).await);
    assert_eq!(stored.len(), 1);
    assert_eq!(event_names(&drain(&mut rx)), vec!["node-online"]);
}

#[tokio::test]
async fn test_one_record_per_node_key() {
    let agent = MockAgent::new();
    agent.set_alive("agent-1", "alpha");
    let ctx = context(agent);
    let reconciler = FleetReconciler::new(ctx.clone());

    for _ in 0..3 {
        assert_ok!(reconciler.reconcile_node("agent-1").await);
    }

    let stored = assert_ok!(ctx.store.nodes.find(&NodeQuery::by_key("agent-1")).await);
    assert_eq!(stored.len(), 1);
}

#[tokio::test]
async fn test_steady_online_emits_nothing_but_refreshes() {
    let agent = MockAgent::new();
    agent.set_alive("agent-1", "alpha");
    let ctx = context(agent.clone());
    let reconciler = FleetReconciler::new(ctx.clone());

    let first = assert_ok!(reconciler.reconcile_node("agent-1").await);
    let mut rx = ctx.events.subscribe();

    let mut fresh = telemetry("alpha");
    fresh.uptime = 4200.0;
    agent.set_telemetry("agent-1", fresh);

    let second = assert_ok!(reconciler.reconcile_node("agent-1").await);
    let third = assert_ok!(reconciler.reconcile_node("agent-1").await);

    assert!(drain(&mut rx).is_empty());
    assert_eq!(third.telemetry.uptime, 4200.0);
    assert!(second.updated_at >= first.updated_at);
    assert_eq!(third.online_at, first.online_at);
}

#[tokio::test]
async fn test_offline_edge_fires_once() {
    let agent = MockAgent::new();
    agent.set_alive("agent-1", "alpha");
    let ctx = context(agent.clone());
    let reconciler = FleetReconciler::new(ctx.clone());
    assert_ok!(reconciler.reconcile_node("agent-1").await);

    let mut rx = ctx.events.subscribe();
    agent.set_dead("agent-1");

    let node = assert_ok!(reconciler.reconcile_node("agent-1").await);
    assert!(!node.online);
    assert!(node.offline_at.is_some());

    // Further failing ticks are no-ops
    let again = assert_ok!(reconciler.reconcile_node("agent-1").await);
    assert!(!again.online);
    assert_eq!(again.offline_at, node.offline_at);
    assert_ok!(reconciler.reconcile_node("agent-1").await);

    let events = drain(&mut rx);
    assert_eq!(event_names(&events), vec!["node-offline"]);
    match &events[0] {
        FleetEvent::NodeOffline(n) => assert_eq!(n.node_key, "agent-1"),
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_online_edge_fires_once_after_recovery() {
    let agent = MockAgent::new();
    agent.set_alive("agent-1", "alpha");
    let ctx = context(agent.clone());
    let reconciler = FleetReconciler::new(ctx.clone());
    let registered = assert_ok!(reconciler.reconcile_node("agent-1").await);

    agent.set_dead("agent-1");
    assert_ok!(reconciler.reconcile_node("agent-1").await);

    let mut rx = ctx.events.subscribe();
    tokio::time::sleep(Duration::from_millis(5)).await;
    agent.set_alive("agent-1", "alpha");

    let back = assert_ok!(reconciler.reconcile_node("agent-1").await);
    assert!(back.online);
    assert!(back.online_at > registered.online_at);

    assert_ok!(reconciler.reconcile_node("agent-1").await);
    assert_ok!(reconciler.reconcile_node("agent-1").await);

    assert_eq!(event_names(&drain(&mut rx)), vec!["node-online"]);
}

#[tokio::test]
async fn test_hung_heartbeat_counts_as_failure() {
    let agent = MockAgent::new();
    let ctx = context(agent.clone());
    seed_node(&ctx.store, "agent-1", "alpha").await;
    agent.hang("agent-1");

    let reconciler = FleetReconciler::new(ctx.clone());
    let node = assert_ok!(reconciler.reconcile_node("agent-1").await);
    assert!(!node.online);
}

// =============================================================================
// Fleet pass
// =============================================================================

#[tokio::test]
async fn test_fleet_pass_isolates_hung_agents() {
    let agent = MockAgent::new();
    let ctx = context(agent.clone());

    seed_node(&ctx.store, "agent-1", "alpha").await;
    seed_node(&ctx.store, "agent-2", "beta").await;
    seed_node(&ctx.store, "agent-3", "gamma").await;

    agent.set_alive("agent-1", "alpha");
    agent.hang("agent-2");
    agent.set_alive("agent-3", "gamma");

    let reconciler = FleetReconciler::new(ctx.clone());
    let started = Instant::now();
    let report = assert_ok!(reconciler.reconcile_fleet().await);

    // One bounded timeout, not one per node
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(report.is_clean());
    assert_eq!(report.nodes.len(), 3);
    assert_eq!(report.online_count(), 2);
    assert_eq!(report.offline_count(), 1);

    let offline = assert_ok!(ctx.store.nodes.find(&NodeQuery::all().online(false)).await);
    assert_eq!(offline.len(), 1);
    assert_eq!(offline[0].node_key, "agent-2");
}

#[tokio::test]
async fn test_supervisor_tick_runs_fleet_pass() {
    let agent = MockAgent::new();
    let ctx = context(agent.clone());
    seed_node(&ctx.store, "agent-1", "alpha").await;
    let mut rx = ctx.events.subscribe();

    let reconciler = Arc::new(FleetReconciler::new(ctx.clone()));
    let supervisor = Supervisor::new().register(Arc::new(ReconcileTask::new(
        reconciler,
        Duration::from_secs(300),
    )));

    assert_ok!(supervisor.run_once("reconcile").await);
    assert_eq!(event_names(&drain(&mut rx)), vec!["node-offline"]);
}

// =============================================================================
// Interface sync on node-online
// =============================================================================

#[tokio::test]
async fn test_network_sync_upserts_by_address() {
    let agent = MockAgent::new();
    agent.set_alive("agent-1", "alpha");
    agent.set_networks(
        "agent-1",
        vec![
            InterfaceReport::ipv4("10.0.0.1"),
            InterfaceReport::ipv4("172.17.0.1").docker(),
        ],
    );
    let ctx = context(agent.clone());
    let mut rx = ctx.events.subscribe();
    let reconciler = FleetReconciler::new(ctx.clone());
    let sync = NetworkSync::new(ctx.clone());

    let node = assert_ok!(reconciler.reconcile_node("agent-1").await);
    for event in drain(&mut rx) {
        sync.handle(&event).await;
    }

    let first = assert_ok!(ctx.store.networks.find(&NetworkQuery::by_node(node.id.as_str())).await);
    assert_eq!(first.len(), 2);
    assert!(!first[0].internal);

    // Same address reported again with new flags, plus one new interface;
    // the docker bridge is no longer reported but stays stored
    agent.set_networks(
        "agent-1",
        vec![
            InterfaceReport::ipv4("10.0.0.1").internal(),
            InterfaceReport::ipv4("10.8.0.1").tunnel(),
        ],
    );
    assert_eq!(assert_ok!(sync.sync_node(&node).await), 2);

    let second = assert_ok!(ctx.store.networks.find(&NetworkQuery::by_node(node.id.as_str())).await);
    assert_eq!(second.len(), 3);
    assert_eq!(second[0].id, first[0].id);
    assert!(second[0].internal);
    assert!(second.iter().any(|n| n.address == "172.17.0.1"));
    assert!(second.iter().any(|n| n.address == "10.8.0.1" && n.tunnel));
}

#[tokio::test]
async fn test_network_sync_ignores_other_events() {
    let agent = MockAgent::new();
    agent.set_networks("agent-1", vec![InterfaceReport::ipv4("10.0.0.1")]);
    let ctx = context(agent);
    let node = seed_node(&ctx.store, "agent-1", "alpha").await;
    let sync = NetworkSync::new(ctx.clone());

    sync.handle(&FleetEvent::NodeOffline(node.clone())).await;

    let stored = assert_ok!(ctx.store.networks.find(&NetworkQuery::by_node(node.id.as_str())).await);
    assert!(stored.is_empty());
}
