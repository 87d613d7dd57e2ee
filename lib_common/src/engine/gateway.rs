//! # Connection Gateway
//!
//! The registry of connected clients and the only path messages take to reach
//! them. The transport registers each socket here and drains the returned
//! queue; every other component (state watcher, heartbeat, event replies) only
//! ever talks to clients through this type.
//!
//! ## Core Design Principles:
//!
//! 1.  **Zero-Copy Fan-out**: a broadcast wraps the message in one `Arc` and
//!     hands each client a pointer to the same allocation.
//!
//! 2.  **Fire-and-Forget Delivery**: each client owns an unbounded MPSC queue, so
//!     a send never waits on the socket. A stuck client only grows its own queue
//!     and never holds up delivery to the others.
//!
//! 3.  **Loss Is Tolerated**: sending to an identity that has gone away is a
//!     no-op, not an error. The periodic heartbeat resync repairs whatever a
//!     lost message left stale.
//!
//! 4.  **Single Dispatcher**: inbound frames are logged, resolved into a
//!     `ClientEvent` and handed to the one registered event handler.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use tokio::sync::mpsc;

use super::protocol::{
    ClientEvent, ClientId, EventKind, InboundFrame, OutboundMessage, OutboundReceiver,
    OutboundSender, Reply,
};
use super::state_cell::SharedStateCell;

/// Handler invoked for every inbound client event.
pub type EventHandler = Arc<dyn Fn(ClientEvent) + Send + Sync>;

/// # Client Handle
///
/// Internal record of one connected client.
struct ClientHandle {
    /// Distinguishes a reconnect under the same identity from the connection it
    /// replaced.
    seq: u64,
    /// Producer half of the client's outbound queue.
    sender: OutboundSender,
}

/// # Client Connection
///
/// What the transport gets back from `connect`: the registration sequence
/// number (needed to disconnect) and the queue to drain into the socket.
#[derive(Debug)]
pub struct ClientConnection {
    /// Registration sequence number; pass it back to `disconnect`.
    pub seq: u64,
    /// The client's outbound queue. Closed when the client is replaced,
    /// removed, or the gateway stops.
    pub receiver: OutboundReceiver,
}

/// # Connection Gateway
pub struct ConnectionGateway {
    /// Connected clients by identity. Also serializes `running` transitions
    /// against registration.
    clients: Mutex<HashMap<ClientId, ClientHandle>>,
    /// The single inbound event dispatcher, if any.
    handler: RwLock<Option<EventHandler>>,
    /// Source of registration sequence numbers.
    next_seq: AtomicU64,
    running: AtomicBool,
}

impl ConnectionGateway {
    pub fn new() -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
            handler: RwLock::new(None),
            next_seq: AtomicU64::new(1),
            running: AtomicBool::new(false),
        }
    }

    /// Marks the gateway as accepting connections. Idempotent.
    pub fn start(&self) -> bool {
        let started = {
            let _clients = self.lock_clients();
            !self.running.swap(true, Ordering::SeqCst)
        };
        if started {
            tracing::info!("Connection gateway started.");
        }
        started
    }

    /// # Stop
    ///
    /// Drops every client queue (which ends their transport tasks) and the
    /// event handler. From here on `connect` hands out closed queues and sends
    /// are no-ops. Idempotent; returns `false` when already stopped.
    pub fn stop(&self) -> bool {
        let dropped = {
            let mut clients = self.lock_clients();
            if !self.running.swap(false, Ordering::SeqCst) {
                return false;
            }
            let count = clients.len();
            clients.clear();
            count
        };
        *self.handler.write().unwrap_or_else(PoisonError::into_inner) = None;

        tracing::info!(clients = dropped, "Connection gateway stopped.");
        true
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// # Connect
    ///
    /// Registers `id` and returns its outbound queue. A second connection under
    /// the same identity replaces the first; the old queue is dropped.
    ///
    /// On a stopped gateway nothing is registered and the returned queue is
    /// already closed.
    pub fn connect(&self, id: &str) -> ClientConnection {
        self.register(id, None)
    }

    /// Like [`connect`](Self::connect), but `first` is queued before the client
    /// becomes visible to `send_to` and `broadcast`.
    pub fn connect_with(&self, id: &str, first: OutboundMessage) -> ClientConnection {
        self.register(id, Some(first))
    }

    /// # Connect Synced
    ///
    /// Registers `id` with a handshake carrying the current state of `cell`.
    /// Both happen under the cell's state lock, so every later push reaches the
    /// client after its handshake and is never older than it.
    pub fn connect_synced(&self, id: &str, cell: &SharedStateCell) -> ClientConnection {
        cell.with_state(|state| self.connect_with(id, OutboundMessage::Handshake { state: *state }))
    }

    fn register(&self, id: &str, first: Option<OutboundMessage>) -> ClientConnection {
        let (tx, rx) = mpsc::unbounded_channel();
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);

        let mut clients = self.lock_clients();
        if !self.running.load(Ordering::SeqCst) {
            drop(clients);
            tracing::debug!(uid = %id, seq, "Gateway stopped; connection refused.");
            return ClientConnection { seq, receiver: rx };
        }

        if let Some(message) = first {
            // The receiver is still in hand, so this cannot fail.
            let _ = tx.send(Arc::new(message));
        }
        let replaced = clients
            .insert(id.to_string(), ClientHandle { seq, sender: tx })
            .is_some();
        drop(clients);

        if replaced {
            tracing::info!(uid = %id, seq, "Client reconnected; previous connection replaced.");
        } else {
            tracing::info!(uid = %id, seq, "Client connected.");
        }

        ClientConnection { seq, receiver: rx }
    }

    /// Removes `id` if it is still registered under `seq`. Returns `true` if a
    /// client was removed.
    pub fn disconnect(&self, id: &str, seq: u64) -> bool {
        let mut clients = self.lock_clients();
        match clients.get(id) {
            Some(handle) if handle.seq == seq => {
                clients.remove(id);
                tracing::info!(uid = %id, seq, "Client disconnected.");
                true
            }
            Some(_) => {
                tracing::debug!(uid = %id, seq, "Ignoring disconnect of a replaced connection.");
                false
            }
            None => false,
        }
    }

    /// Snapshot of the identities connected right now.
    pub fn connected_ids(&self) -> HashSet<ClientId> {
        self.lock_clients().keys().cloned().collect()
    }

    pub fn client_count(&self) -> usize {
        self.lock_clients().len()
    }

    pub fn is_connected(&self, id: &str) -> bool {
        self.lock_clients().contains_key(id)
    }

    /// # Send To
    ///
    /// Best-effort directed send. Returns `false` when `id` is not connected,
    /// its queue has closed or the gateway is stopped; that is never an error.
    pub fn send_to(&self, id: &str, message: OutboundMessage) -> bool {
        let mut clients = self.lock_clients();
        if !self.running.load(Ordering::SeqCst) {
            return false;
        }
        let Some(handle) = clients.get(id) else {
            tracing::trace!(uid = %id, kind = message.kind(), "Send to unknown client dropped.");
            return false;
        };

        if handle.sender.send(Arc::new(message)).is_ok() {
            return true;
        }

        clients.remove(id);
        tracing::debug!(uid = %id, "Client queue closed. Removing from gateway.");
        false
    }

    /// # Broadcast
    ///
    /// Sends `message` to every client connected at call time and returns how
    /// many queues accepted it. Clients whose queue has closed are pruned. A
    /// stopped gateway delivers nothing.
    pub fn broadcast(&self, message: OutboundMessage) -> usize {
        let kind = message.kind();
        let frame = Arc::new(message);
        let mut delivered = 0;

        let mut clients = self.lock_clients();
        if !self.running.load(Ordering::SeqCst) {
            return 0;
        }
        clients.retain(|id, handle| match handle.sender.send(Arc::clone(&frame)) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(_) => {
                tracing::debug!(uid = %id, "Client queue closed. Removing from gateway.");
                false
            }
        });
        drop(clients);

        tracing::trace!(kind, delivered, "Broadcast complete.");
        delivered
    }

    /// Registers the single inbound event dispatcher, replacing any previous one.
    pub fn on_event<F>(&self, handler: F)
    where
        F: Fn(ClientEvent) + Send + Sync + 'static,
    {
        *self.handler.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(handler));
    }

    /// Drops the registered event dispatcher.
    pub fn clear_event_handler(&self) {
        *self.handler.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// # Dispatch
    ///
    /// Entry point for the transport: logs the frame, attaches a reply
    /// capability when the frame carries a `cbId` and the client is still
    /// connected, then calls the registered handler outside of any lock.
    pub fn dispatch(&self, id: &str, frame: InboundFrame) {
        let kind = EventKind::parse(&frame.kind);
        tracing::info!(kind = %kind, uid = %id, "Client event received.");

        let reply = frame.cb_id.and_then(|cb_id| {
            self.lock_clients()
                .get(id)
                .map(|handle| Reply::new(cb_id, handle.sender.clone()))
        });

        let handler = self
            .handler
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        match handler {
            Some(handler) => handler(ClientEvent {
                kind,
                payload: frame.payload,
                client_id: id.to_string(),
                reply,
            }),
            None => tracing::debug!(kind = %kind, uid = %id, "No event handler registered; event dropped."),
        }
    }

    fn lock_clients(&self) -> MutexGuard<'_, HashMap<ClientId, ClientHandle>> {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ConnectionGateway {
    fn default() -> Self {
        Self::new()
    }
}
