//! # Service Graph
//!
//! The standard wiring of the sync engine as a lifecycle graph:
//!
//! ```text
//! gateway ─┬─> router
//! state ───┼─> watcher
//!          └─> heartbeat
//! ```
//!
//! Starting the graph yields a running gateway, the shared cell, the event
//! router installed on the gateway, the push watcher and the heartbeat loop.
//! `stop_all` unwinds it in reverse.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use super::gateway::ConnectionGateway;
use super::heartbeat::HeartbeatBroadcaster;
use super::lifecycle::{Component, LifecycleError, LifecycleOrchestrator};
use super::router::{EventRouter, IndexPolicy};
use super::state_cell::{PresentationState, SharedStateCell};
use super::state_watcher::StateWatcher;

pub const GATEWAY: &str = "gateway";
pub const STATE: &str = "state";
pub const ROUTER: &str = "router";
pub const WATCHER: &str = "watcher";
pub const HEARTBEAT: &str = "heartbeat";

/// Startup parameters for [`sync_graph`].
#[derive(Debug, Clone, Copy)]
pub struct SyncSettings {
    pub initial: PresentationState,
    pub heartbeat_interval: Duration,
    pub policy: IndexPolicy,
}

/// Router handle that remembers which gateway it was installed on.
pub struct InstalledRouter {
    router: Arc<EventRouter>,
    gateway: Arc<ConnectionGateway>,
}

impl InstalledRouter {
    pub fn router(&self) -> &EventRouter {
        &self.router
    }

    fn uninstall(&self) {
        self.gateway.clear_event_handler();
        tracing::info!("Event router uninstalled.");
    }
}

/// Declares the five engine components. Nothing runs until `start_all`.
pub fn sync_graph(settings: SyncSettings) -> Result<LifecycleOrchestrator, LifecycleError> {
    let SyncSettings {
        initial,
        heartbeat_interval,
        policy,
    } = settings;

    let mut graph = LifecycleOrchestrator::new();

    graph
        .register(Component::new(
            GATEWAY,
            &[],
            |_| {
                let gateway = Arc::new(ConnectionGateway::new());
                gateway.start();
                Ok(gateway)
            },
            |gateway: &ConnectionGateway| {
                gateway.stop();
            },
        ))?
        .register(Component::new(
            STATE,
            &[],
            move |_| {
                tracing::info!(index = initial.index, max = initial.max, "Presentation state created.");
                Ok(Arc::new(SharedStateCell::new(initial)))
            },
            |_: &SharedStateCell| {},
        ))?
        .register(Component::new(
            ROUTER,
            &[GATEWAY, STATE],
            move |deps| {
                let gateway = deps.get::<ConnectionGateway>(GATEWAY)?;
                let cell = deps.get::<SharedStateCell>(STATE)?;
                let router = Arc::new(EventRouter::new(cell, policy));
                Arc::clone(&router).install(&gateway);
                tracing::info!(?policy, "Event router installed.");
                Ok(Arc::new(InstalledRouter { router, gateway }))
            },
            InstalledRouter::uninstall,
        ))?
        .register(Component::new(
            WATCHER,
            &[GATEWAY, STATE],
            |deps| {
                let gateway = deps.get::<ConnectionGateway>(GATEWAY)?;
                let cell = deps.get::<SharedStateCell>(STATE)?;
                Ok(Arc::new(StateWatcher::attach(cell, gateway)))
            },
            |watcher: &StateWatcher| {
                watcher.detach();
            },
        ))?
        .register(Component::new(
            HEARTBEAT,
            &[GATEWAY, STATE],
            move |deps| {
                let gateway = deps.get::<ConnectionGateway>(GATEWAY)?;
                let cell = deps.get::<SharedStateCell>(STATE)?;
                let heartbeat = Arc::new(HeartbeatBroadcaster::new(gateway, cell, heartbeat_interval));
                heartbeat.start().context("heartbeat needs a tokio runtime")?;
                Ok(heartbeat)
            },
            |heartbeat: &HeartbeatBroadcaster| {
                heartbeat.stop();
            },
        ))?;

    Ok(graph)
}
