//! # Transport Module
//!
//! The thin I/O layer around the engine: an axum router exposing the WebSocket
//! endpoint, a health check, a state snapshot route and static file serving. The engine
//! never depends on this module; it only sees `connect`, `disconnect` and
//! `dispatch` calls on the gateway.

/// Axum routes, the per-socket session loop and graceful shutdown.
pub mod ws;

pub use ws::{router, serve, shutdown_signal, AppState};
