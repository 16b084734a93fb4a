//! Lifecycle event bus
//!
//! In-process publish/subscribe for node and mount lifecycle events. Every
//! subscriber gets its own copy of each event; there is no ordering between
//! subscribers, and a slow subscriber only loses its own backlog.

use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::models::{Mount, Node};

/// Lifecycle events emitted by the control plane
#[derive(Debug, Clone, PartialEq)]
pub enum FleetEvent {
    NodeOnline(Node),
    NodeOffline(Node),
    NodeRemoved(Node),
    MountCreated(Mount),
    MountRemoved(Mount),
}

impl FleetEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::NodeOnline(_) => "node-online",
            Self::NodeOffline(_) => "node-offline",
            Self::NodeRemoved(_) => "node-removed",
            Self::MountCreated(_) => "mount-created",
            Self::MountRemoved(_) => "mount-removed",
        }
    }
}

/// A subscriber reacting to lifecycle events
///
/// Handlers are best-effort: they log their own failures and never hand
/// errors back to the publisher.
#[async_trait]
pub trait EventHandler: Send + Sync {
    fn name(&self) -> &'static str;

    async fn handle(&self, event: &FleetEvent);
}

/// Broadcast bus for lifecycle events
///
/// Handlers hold bus clones through their context, so the channel never
/// closes by itself; `close` tells spawned handlers to finish their backlog
/// and exit.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<FleetEvent>,
    closed: Arc<watch::Sender<bool>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        let (closed, _) = watch::channel(false);
        Self {
            sender,
            closed: Arc::new(closed),
        }
    }

    /// Publish an event to all current subscribers
    pub fn publish(&self, event: FleetEvent) {
        trace!(event = event.name(), "Publishing fleet event");
        // No subscribers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FleetEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Run `handler` in its own task for every event published from now on
    ///
    /// An event being handled is always seen through to the end; after
    /// `close` the handler works off what is already queued, then exits.
    pub fn spawn_handler(&self, handler: Arc<dyn EventHandler>) -> JoinHandle<()> {
        let mut receiver = self.subscribe();
        let mut closed = self.closed.subscribe();

        tokio::spawn(async move {
            debug!(handler = handler.name(), "Event handler started");
            loop {
                tokio::select! {
                    biased;
                    received = receiver.recv() => match received {
                        Ok(event) => handler.handle(&event).await,
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!(handler = handler.name(), skipped = n, "Event handler lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    _ = async {
                        let _ = closed.wait_for(|done| *done).await;
                    } => {
                        while let Ok(event) = receiver.try_recv() {
                            handler.handle(&event).await;
                        }
                        break;
                    }
                }
            }
            debug!(handler = handler.name(), "Event handler stopped");
        })
    }

    /// Stop accepting work in spawned handlers
    pub fn close(&self) {
        self.closed.send_replace(true);
    }

    /// Close the bus and wait up to `grace` for `handlers` to finish
    ///
    /// Returns false when the grace period ran out; unfinished handlers are
    /// left running, not aborted.
    pub async fn shutdown(&self, handlers: Vec<JoinHandle<()>>, grace: Duration) -> bool {
        self.close();
        let pending = handlers.len();
        match tokio::time::timeout(grace, join_all(handlers)).await {
            Ok(_) => true,
            Err(_) => {
                warn!(
                    handlers = pending,
                    grace_ms = grace.as_millis() as u64,
                    "Event handlers still busy at shutdown"
                );
                false
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
