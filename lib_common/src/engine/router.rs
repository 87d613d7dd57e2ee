//! # Event Router
//!
//! The fixed table that maps inbound event kinds onto state mutations.
//!
//! | kind   | effect                                        |
//! |--------|-----------------------------------------------|
//! | `prev` | `index -= 1`                                  |
//! | `next` | `index += 1`                                  |
//! | `ping` | ignored                                       |
//! | other  | logged; replied with `{unmatchedEvent: kind}` |
//!
//! `index` is left unclamped unless the router is built with
//! [`IndexPolicy::Clamped`].

use std::sync::Arc;

use serde_json::json;

use super::gateway::ConnectionGateway;
use super::protocol::{ClientEvent, EventKind};
use super::state_cell::{PresentationState, SharedStateCell};

/// How `prev` / `next` treat the `[0, max]` range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndexPolicy {
    /// Step freely; the viewer UI enforces bounds.
    #[default]
    Unclamped,
    /// Keep `index` within `[0, max]`.
    Clamped,
}

impl IndexPolicy {
    fn apply(self, state: PresentationState, delta: i64) -> PresentationState {
        match self {
            IndexPolicy::Unclamped => state.step(delta),
            IndexPolicy::Clamped => state.step_clamped(delta),
        }
    }
}

/// What the router did with an event. Mostly useful to tests and logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Stepped(PresentationState),
    Ignored,
    Unmatched { kind: String, replied: bool },
}

/// # Event Router
pub struct EventRouter {
    cell: Arc<SharedStateCell>,
    policy: IndexPolicy,
}

impl EventRouter {
    pub fn new(cell: Arc<SharedStateCell>, policy: IndexPolicy) -> Self {
        Self { cell, policy }
    }

    pub fn policy(&self) -> IndexPolicy {
        self.policy
    }

    /// Handles one event according to the kind table.
    pub fn handle(&self, event: ClientEvent) -> Outcome {
        match event.kind {
            EventKind::Prev => Outcome::Stepped(self.step(-1)),
            EventKind::Next => Outcome::Stepped(self.step(1)),
            EventKind::Ping => Outcome::Ignored,
            EventKind::Other(kind) => {
                tracing::debug!(kind = %kind, uid = %event.client_id, "Unmatched event.");
                let replied = event
                    .reply
                    .map(|reply| reply.send(json!({ "unmatchedEvent": &kind })))
                    .unwrap_or(false);
                Outcome::Unmatched { kind, replied }
            }
        }
    }

    /// Installs this router as the gateway's event dispatcher.
    pub fn install(self: Arc<Self>, gateway: &ConnectionGateway) {
        gateway.on_event(move |event| {
            self.handle(event);
        });
    }

    fn step(&self, delta: i64) -> PresentationState {
        let policy = self.policy;
        self.cell.update(|state| policy.apply(state, delta))
    }
}
