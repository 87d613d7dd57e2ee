//! # Sync Engine Module
//!
//! This module forms the heart of the slide-sync service. It keeps one small
//! piece of shared state (the presentation position) consistent across every
//! connected viewer using two complementary paths:
//!
//! - **Push-on-change**: the `state_watcher` observes the `state_cell` and
//!   broadcasts each new state the moment it is written.
//! - **Periodic resync**: the `heartbeat` broadcasts a full snapshot on a fixed
//!   interval whether or not anything changed, repairing any lost push.
//!
//! ## Core Components:
//!
//! - **`state_cell`**: the authoritative `{index, max}` pair with atomic
//!   read/update and keyed observers.
//! - **`gateway`**: the registry of connected clients, directed send,
//!   broadcast-all and inbound event dispatch.
//! - **`router`**: the table mapping event kinds to state mutations.
//! - **`protocol`**: inbound frames and outbound messages on the wire.
//! - **`state_watcher`** / **`heartbeat`**: the two propagation paths above.
//! - **`lifecycle`**: dependency-ordered start and reverse-ordered stop of the
//!   whole graph; **`services`** declares the standard graph.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

/// Connected client registry, directed send and broadcast.
pub mod gateway;
/// Periodic full-state resync loop.
pub mod heartbeat;
/// Dependency graph start/stop orchestration.
pub mod lifecycle;
/// Wire formats for inbound frames and outbound messages.
pub mod protocol;
/// Event kind to state mutation table.
pub mod router;
/// The standard component graph.
pub mod services;
/// The authoritative shared presentation state.
pub mod state_cell;
/// Push-on-change observer.
pub mod state_watcher;

// --- Public API Re-exports ---
pub use gateway::{ClientConnection, ConnectionGateway};
pub use heartbeat::{HeartbeatBroadcaster, HeartbeatHandle, DEFAULT_HEARTBEAT_INTERVAL};
pub use lifecycle::{Component, Dependencies, LifecycleError, LifecycleOrchestrator};
pub use protocol::{ClientEvent, ClientId, EventKind, InboundFrame, OutboundMessage, Reply};
pub use router::{EventRouter, IndexPolicy, Outcome};
pub use services::{sync_graph, InstalledRouter, SyncSettings};
pub use state_cell::{PresentationState, SharedStateCell};
pub use state_watcher::StateWatcher;
