//! # Heartbeat Broadcaster
//!
//! The weak-consistency repair loop. Independently of any mutation, every
//! `interval` it reads the shared state and broadcasts a full `sync` snapshot
//! tagged with a generation counter (`term`). A push that was lost on a dead
//! or flaky connection is therefore repaired within one interval.
//!
//! ## Lifecycle:
//! `Stopped -> Running -> Stopped`, with idempotent `start` and `stop`.
//!
//! - `term` restarts at 0 on every `start`.
//! - The first sync fires one full interval after `start`.
//! - Cancellation and the next tick race in a biased `select!`; cancellation
//!   wins when it was signalled first.
//! - Each broadcast runs under a gate that `stop` (and
//!   [`HeartbeatHandle::cancel`]) also takes, so once either returns no
//!   further `sync` can leave, and a broadcast already under way completes
//!   first.
//! - `start` needs a tokio runtime; outside one it returns an error.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::runtime::{Handle, TryCurrentError};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::gateway::ConnectionGateway;
use super::protocol::OutboundMessage;
use super::state_cell::SharedStateCell;

/// Default resync period.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(1000);

struct RunningLoop {
    handle: HeartbeatHandle,
    _task: JoinHandle<()>,
}

/// # Heartbeat Handle
///
/// Stop capability for one run of the loop, as returned by `start`.
#[derive(Debug, Clone)]
pub struct HeartbeatHandle {
    token: CancellationToken,
    gate: Arc<Mutex<()>>,
}

impl HeartbeatHandle {
    /// Cancels the run this handle belongs to. Waits for a broadcast already
    /// under way; after it returns that run sends nothing more.
    pub fn cancel(&self) {
        let _gate = lock_gate(&self.gate);
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// # Heartbeat Broadcaster
pub struct HeartbeatBroadcaster {
    gateway: Arc<ConnectionGateway>,
    cell: Arc<SharedStateCell>,
    interval: Duration,
    running: Mutex<Option<RunningLoop>>,
    gate: Arc<Mutex<()>>,
}

impl HeartbeatBroadcaster {
    pub fn new(gateway: Arc<ConnectionGateway>, cell: Arc<SharedStateCell>, interval: Duration) -> Self {
        Self {
            gateway,
            cell,
            interval,
            running: Mutex::new(None),
            gate: Arc::new(Mutex::new(())),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        self.lock_running()
            .as_ref()
            .is_some_and(|running| !running.handle.is_cancelled())
    }

    /// # Start
    ///
    /// Spawns the loop on the current tokio runtime unless it is already
    /// running, in which case the live run's handle is returned.
    ///
    /// # Errors
    /// Fails when called outside a tokio runtime.
    pub fn start(&self) -> Result<HeartbeatHandle, TryCurrentError> {
        let mut running = self.lock_running();
        if let Some(existing) = running.as_ref() {
            if !existing.handle.is_cancelled() {
                return Ok(existing.handle.clone());
            }
        }

        let runtime = Handle::try_current()?;
        let handle = HeartbeatHandle {
            token: CancellationToken::new(),
            gate: Arc::clone(&self.gate),
        };
        let task = runtime.spawn(run_loop(
            Arc::clone(&self.gateway),
            Arc::clone(&self.cell),
            self.interval,
            handle.token.clone(),
            Arc::clone(&self.gate),
        ));
        tracing::info!(interval_ms = self.interval.as_millis() as u64, "Heartbeat started.");

        *running = Some(RunningLoop {
            handle: handle.clone(),
            _task: task,
        });
        Ok(handle)
    }

    /// # Stop
    ///
    /// Cancels the loop. Safe to call from any task or thread, any number of
    /// times. Blocks at most for one in-flight broadcast.
    pub fn stop(&self) -> bool {
        let Some(running) = self.lock_running().take() else {
            return false;
        };

        running.handle.cancel();
        tracing::info!("Heartbeat stopped.");
        true
    }

    fn lock_running(&self) -> MutexGuard<'_, Option<RunningLoop>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for HeartbeatBroadcaster {
    fn drop(&mut self) {
        if let Some(running) = self.lock_running().take() {
            running.handle.cancel();
        }
    }
}

async fn run_loop(
    gateway: Arc<ConnectionGateway>,
    cell: Arc<SharedStateCell>,
    period: Duration,
    token: CancellationToken,
    gate: Arc<Mutex<()>>,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut term: u64 = 0;

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        // Never held across an await.
        let _gate = lock_gate(&gate);
        if token.is_cancelled() {
            break;
        }

        let state = cell.read();
        let delivered = gateway.broadcast(OutboundMessage::Sync { state, term });
        tracing::trace!(term, index = state.index, delivered, "Heartbeat sync broadcast.");
        term += 1;
    }

    tracing::debug!(last_term = term, "Heartbeat loop exited.");
}

fn lock_gate(gate: &Mutex<()>) -> MutexGuard<'_, ()> {
    gate.lock().unwrap_or_else(PoisonError::into_inner)
}
