//! # State Watcher
//!
//! Push-on-change: an observer on the shared state cell that broadcasts every
//! new state to all connected clients the moment it is written.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::gateway::ConnectionGateway;
use super::protocol::OutboundMessage;
use super::state_cell::{ObserverKey, SharedStateCell};

/// Key the watcher registers its observer under.
pub const STATE_WATCHER_KEY: ObserverKey = "state-watcher";

pub struct StateWatcher {
    cell: Arc<SharedStateCell>,
    attached: AtomicBool,
}

impl StateWatcher {
    /// Registers the push observer on `cell`, broadcasting through `gateway`.
    pub fn attach(cell: Arc<SharedStateCell>, gateway: Arc<ConnectionGateway>) -> Self {
        cell.watch(STATE_WATCHER_KEY, move |state| {
            let delivered = gateway.broadcast(OutboundMessage::Push { state: *state });
            tracing::debug!(index = state.index, max = state.max, delivered, "State pushed.");
        });
        tracing::info!("State watcher attached.");

        Self {
            cell,
            attached: AtomicBool::new(true),
        }
    }

    /// Removes the observer. Later mutations no longer push. Idempotent.
    pub fn detach(&self) -> bool {
        if !self.attached.swap(false, Ordering::SeqCst) {
            return false;
        }
        self.cell.unwatch(STATE_WATCHER_KEY);
        tracing::info!("State watcher detached.");
        true
    }

    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::state_cell::PresentationState;

    #[test]
    fn each_mutation_pushes_exactly_once_before_update_returns() {
        let cell = Arc::new(SharedStateCell::new(PresentationState::new(0, 4)));
        let gateway = Arc::new(ConnectionGateway::new());
        gateway.start();
        let mut client = gateway.connect("a");
        let _watcher = StateWatcher::attach(Arc::clone(&cell), Arc::clone(&gateway));

        let next = cell.update(|s| s.step(1));

        // Already queued by the time `update` returned.
        assert_eq!(
            *client.receiver.try_recv().unwrap(),
            OutboundMessage::Push { state: next }
        );
        assert!(client.receiver.try_recv().is_err());
    }

    #[test]
    fn detach_stops_pushes_and_is_idempotent() {
        let cell = Arc::new(SharedStateCell::default());
        let gateway = Arc::new(ConnectionGateway::new());
        gateway.start();
        let mut client = gateway.connect("a");
        let watcher = StateWatcher::attach(Arc::clone(&cell), Arc::clone(&gateway));

        assert!(watcher.detach());
        assert!(!watcher.detach());
        assert!(!watcher.is_attached());
        assert_eq!(cell.observer_count(), 0);

        cell.update(|s| s.step(1));
        assert!(client.receiver.try_recv().is_err());
    }

    #[test]
    fn attaching_twice_keeps_a_single_observer() {
        let cell = Arc::new(SharedStateCell::default());
        let gateway = Arc::new(ConnectionGateway::new());
        gateway.start();
        let mut client = gateway.connect("a");
        let _first = StateWatcher::attach(Arc::clone(&cell), Arc::clone(&gateway));
        let _second = StateWatcher::attach(Arc::clone(&cell), Arc::clone(&gateway));

        cell.update(|s| s.step(1));
        assert!(client.receiver.try_recv().is_ok());
        assert!(client.receiver.try_recv().is_err());
    }
}
