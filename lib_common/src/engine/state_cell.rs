//! # Shared State Cell
//!
//! The single authoritative copy of the presentation position. Every other
//! component reads from and writes to one `Arc<SharedStateCell>` that is created
//! by the lifecycle graph and injected where it is needed.
//!
//! ## Guarantees:
//!
//! - **Linearizable updates**: `update` applies its function under an exclusive
//!   lock, so concurrent writers are serialized and no update is lost or applied
//!   twice.
//! - **Synchronous notification**: observers are called with the new state
//!   before `update` returns to its caller, in the same order the mutations were
//!   applied.
//! - **Keyed observers**: observers live in a small ordered list. Registering a
//!   key that already exists replaces that observer in place.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

/// # Presentation State
///
/// The `{index, max}` pair shared by every connected viewer. `max` is fixed at
/// startup from the slide count; `index` moves with `prev` / `next` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct PresentationState {
    /// The slide currently shown.
    pub index: i64,
    /// The last slide index known at startup.
    pub max: i64,
}

impl PresentationState {
    pub fn new(index: i64, max: i64) -> Self {
        Self { index, max }
    }

    /// Returns a copy with `index` moved by `delta`.
    pub fn step(self, delta: i64) -> Self {
        Self {
            index: self.index.saturating_add(delta),
            ..self
        }
    }

    /// Returns a copy with `index` moved by `delta` and kept within `[0, max]`.
    pub fn step_clamped(self, delta: i64) -> Self {
        let upper = self.max.max(0);
        Self {
            index: self.index.saturating_add(delta).clamp(0, upper),
            ..self
        }
    }
}

/// Callback invoked with the post-mutation state.
pub type Observer = Arc<dyn Fn(&PresentationState) + Send + Sync>;

/// Stable key an observer is registered under.
pub type ObserverKey = &'static str;

/// # Shared State Cell
pub struct SharedStateCell {
    state: Mutex<PresentationState>,
    observers: RwLock<Vec<(ObserverKey, Observer)>>,
}

impl SharedStateCell {
    pub fn new(initial: PresentationState) -> Self {
        Self {
            state: Mutex::new(initial),
            observers: RwLock::new(Vec::new()),
        }
    }

    /// Returns an atomic snapshot of the current state.
    pub fn read(&self) -> PresentationState {
        *self.lock_state()
    }

    /// Runs `f` on the current state while holding the state lock. No `update`
    /// (and so no observer notification) can interleave with `f`.
    pub fn with_state<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&PresentationState) -> R,
    {
        let state = self.lock_state();
        f(&state)
    }

    /// # Update
    ///
    /// Atomically replaces the state with `f(current)` and returns the new value.
    ///
    /// Observers run while the state lock is still held, so notifications leave
    /// in exactly the order mutations were applied. An observer must therefore
    /// not call back into this cell.
    pub fn update<F>(&self, f: F) -> PresentationState
    where
        F: FnOnce(PresentationState) -> PresentationState,
    {
        let mut state = self.lock_state();
        let next = f(*state);
        *state = next;

        // Clone the list out so a concurrent `watch` never waits on observer code.
        let observers: Vec<Observer> = self
            .observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();

        for observer in observers {
            observer(&next);
        }

        next
    }

    /// Registers `observer` under `key`, replacing any observer already under it.
    pub fn watch<F>(&self, key: ObserverKey, observer: F)
    where
        F: Fn(&PresentationState) + Send + Sync + 'static,
    {
        let mut observers = self.observers.write().unwrap_or_else(PoisonError::into_inner);
        let observer: Observer = Arc::new(observer);

        match observers.iter_mut().find(|(existing, _)| *existing == key) {
            Some(slot) => slot.1 = observer,
            None => observers.push((key, observer)),
        }
    }

    /// Removes the observer under `key`. Returns `false` if none was registered.
    pub fn unwatch(&self, key: ObserverKey) -> bool {
        let mut observers = self.observers.write().unwrap_or_else(PoisonError::into_inner);
        let before = observers.len();
        observers.retain(|(existing, _)| *existing != key);
        observers.len() != before
    }

    pub fn observer_count(&self) -> usize {
        self.observers.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    // The state is plain `Copy` data, so a poisoned lock still holds a valid value.
    fn lock_state(&self) -> MutexGuard<'_, PresentationState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SharedStateCell {
    fn default() -> Self {
        Self::new(PresentationState::default())
    }
}
