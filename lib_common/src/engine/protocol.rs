//! # Wire Protocol
//!
//! Inbound client frames, the event kinds they map to, and the messages the
//! server sends back out. Everything travels as JSON text frames.
//!
//! Inbound: `{"kind": "next", "payload": ..., "cbId": 7}` where `payload` and
//! `cbId` are optional. A frame with a `cbId` gets a reply capability.
//!
//! Outbound: tagged by `kind`, for example
//! `{"kind":"sync","state":{"index":3,"max":9},"term":4}`.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use super::state_cell::PresentationState;

/// Opaque per-connection identifier supplied by the transport.
pub type ClientId = String;

/// Queue handed to the transport for one client's outbound messages.
pub type OutboundSender = mpsc::UnboundedSender<Arc<OutboundMessage>>;

/// Receiving half drained by the transport's writer task.
pub type OutboundReceiver = mpsc::UnboundedReceiver<Arc<OutboundMessage>>;

/// # Event Kind
///
/// The fixed table of inbound events. Anything not listed lands in `Other` and
/// takes the default branch of the router.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Step back one slide.
    Prev,
    /// Step forward one slide.
    Next,
    /// Client liveness check. Ignored.
    Ping,
    /// Unrecognized kind, kept verbatim for logging and the unmatched reply.
    Other(String),
}

impl EventKind {
    pub fn parse(kind: &str) -> Self {
        match kind {
            "prev" => EventKind::Prev,
            "next" => EventKind::Next,
            "ping" => EventKind::Ping,
            other => EventKind::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            EventKind::Prev => "prev",
            EventKind::Next => "next",
            EventKind::Ping => "ping",
            EventKind::Other(kind) => kind,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw inbound frame as read off the socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundFrame {
    /// Event name, resolved through [`EventKind::parse`].
    pub kind: String,
    /// Free-form event data. Unused by the built-in kinds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    /// Callback id (`cbId` on the wire). Present when the client wants a reply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cb_id: Option<u64>,
}

impl InboundFrame {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            payload: None,
            cb_id: None,
        }
    }

    pub fn with_callback(mut self, cb_id: u64) -> Self {
        self.cb_id = Some(cb_id);
        self
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

/// # Outbound Message
///
/// Everything the server ever sends to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum OutboundMessage {
    /// Initial state for a freshly connected client.
    Handshake { state: PresentationState },
    /// Immediate broadcast after a mutation.
    Push { state: PresentationState },
    /// Periodic resync tagged with the heartbeat generation.
    Sync { state: PresentationState, term: u64 },
    /// Answer to an inbound frame that carried a `cbId`.
    Reply {
        #[serde(rename = "cbId")]
        cb_id: u64,
        payload: Value,
    },
}

impl OutboundMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            OutboundMessage::Handshake { .. } => "handshake",
            OutboundMessage::Push { .. } => "push",
            OutboundMessage::Sync { .. } => "sync",
            OutboundMessage::Reply { .. } => "reply",
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// # Reply
///
/// One-shot answer capability bound to the originating client's queue.
/// Delivery is best effort: a client that has gone away simply never sees it.
#[derive(Debug)]
pub struct Reply {
    cb_id: u64,
    /// Queue of the client that sent the frame.
    sender: OutboundSender,
}

impl Reply {
    pub(crate) fn new(cb_id: u64, sender: OutboundSender) -> Self {
        Self { cb_id, sender }
    }

    pub fn cb_id(&self) -> u64 {
        self.cb_id
    }

    /// Sends `payload` back to the client. Returns `false` if it has disconnected.
    pub fn send(self, payload: Value) -> bool {
        self.sender
            .send(Arc::new(OutboundMessage::Reply {
                cb_id: self.cb_id,
                payload,
            }))
            .is_ok()
    }
}

/// # Client Event
///
/// An inbound frame after the gateway has resolved its kind, its sender and
/// its optional reply capability.
#[derive(Debug)]
pub struct ClientEvent {
    /// Resolved event kind.
    pub kind: EventKind,
    /// The frame's payload, passed through untouched.
    pub payload: Option<Value>,
    /// Identity of the sending client.
    pub client_id: ClientId,
    /// Set when the frame carried a `cbId` and the sender was still connected.
    pub reply: Option<Reply>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_maps_known_kinds_and_keeps_unknown_verbatim() {
        assert_eq!(EventKind::parse("prev"), EventKind::Prev);
        assert_eq!(EventKind::parse("next"), EventKind::Next);
        assert_eq!(EventKind::parse("ping"), EventKind::Ping);
        assert_eq!(EventKind::parse("foo"), EventKind::Other("foo".into()));
        assert_eq!(EventKind::parse("foo").as_str(), "foo");
        assert_eq!(EventKind::Next.to_string(), "next");
    }

    #[test]
    fn inbound_frame_accepts_minimal_and_full_forms() {
        let minimal = InboundFrame::from_json(r#"{"kind":"next"}"#).unwrap();
        assert_eq!(minimal, InboundFrame::new("next"));

        let full = InboundFrame::from_json(r#"{"kind":"foo","payload":{"a":1},"cbId":7}"#).unwrap();
        assert_eq!(full.cb_id, Some(7));
        assert_eq!(full.payload, Some(json!({"a": 1})));

        assert!(InboundFrame::from_json("not json").is_err());
    }

    #[test]
    fn outbound_messages_serialize_with_kind_tag() {
        let state = PresentationState::new(3, 9);

        let push = serde_json::to_value(OutboundMessage::Push { state }).unwrap();
        assert_eq!(push, json!({"kind": "push", "state": {"index": 3, "max": 9}}));

        let sync = serde_json::to_value(OutboundMessage::Sync { state, term: 2 }).unwrap();
        assert_eq!(sync, json!({"kind": "sync", "state": {"index": 3, "max": 9}, "term": 2}));

        let reply = serde_json::to_value(OutboundMessage::Reply {
            cb_id: 5,
            payload: json!({"unmatchedEvent": "foo"}),
        })
        .unwrap();
        assert_eq!(
            reply,
            json!({"kind": "reply", "cbId": 5, "payload": {"unmatchedEvent": "foo"}})
        );
    }

    #[test]
    fn reply_reports_closed_receiver() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        assert!(!Reply::new(1, tx).send(json!(null)));
    }
}
