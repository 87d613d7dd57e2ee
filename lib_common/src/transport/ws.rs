//! # WebSocket Transport
//!
//! The HTTP surface in front of the connection gateway.
//!
//! ## Routes:
//! - `GET /ws`: upgrades to a WebSocket. The optional `client_id` query
//!   parameter becomes the client identity; a random UUID is used otherwise.
//! - `GET /health`: liveness check, returns `OK`.
//! - `GET /state`: current presentation state as JSON.
//! - anything else: static files from the public directory, when configured.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use uuid::Uuid;

use crate::engine::{
    ClientConnection, ClientId, ConnectionGateway, InboundFrame, PresentationState, SharedStateCell,
};

/// # Application State
///
/// Shared by every route. Both members are the same instances the lifecycle
/// graph started.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<ConnectionGateway>,
    pub cell: Arc<SharedStateCell>,
}

#[derive(Debug, Deserialize)]
struct ConnectParams {
    client_id: Option<String>,
}

/// Builds the router. `public_dir`, when given, is served as the fallback.
pub fn router(state: AppState, public_dir: Option<PathBuf>) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/state", get(state_handler))
        .route("/ws", get(ws_handler));

    let app = match public_dir {
        Some(dir) => app.fallback_service(ServeDir::new(dir)),
        None => app,
    };

    app.layer(cors).with_state(Arc::new(state))
}

/// Serves `app` on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, app: Router, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        tracing::info!("Slide sync server live at http://{}", addr);
    }
    axum::serve(listener, app).with_graceful_shutdown(shutdown).await
}

async fn health_handler() -> &'static str {
    "OK"
}

async fn state_handler(State(state): State<Arc<AppState>>) -> Json<PresentationState> {
    Json(state.cell.read())
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let client_id = params
        .client_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    ws.on_upgrade(move |socket| handle_socket(socket, state, client_id))
}

/// # WebSocket Connection Logic
///
/// 1.  Registers the client and queues the handshake in one step under the
///     state lock, so no push can overtake it or be older than it.
/// 2.  A writer task drains the client's queue into the socket.
/// 3.  The reader loop hands every text frame to `gateway.dispatch`.
/// 4.  When either side ends, the client is deregistered. A stale
///     registration (replaced by a reconnect) is left alone.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>, client_id: ClientId) {
    let ClientConnection { seq, mut receiver } = state.gateway.connect_synced(&client_id, &state.cell);

    let (mut sink, mut stream) = socket.split();

    let writer_id = client_id.clone();
    let mut writer = tokio::spawn(async move {
        while let Some(message) = receiver.recv().await {
            let text = match message.to_json() {
                Ok(text) => text,
                Err(error) => {
                    tracing::warn!(uid = %writer_id, %error, "Failed to encode outbound message.");
                    continue;
                }
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    loop {
        tokio::select! {
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => match InboundFrame::from_json(text.as_str()) {
                    Ok(frame) => state.gateway.dispatch(&client_id, frame),
                    Err(error) => {
                        tracing::warn!(uid = %client_id, %error, "Malformed client frame dropped.");
                    }
                },
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(error)) => {
                    tracing::debug!(uid = %client_id, %error, "WebSocket read error.");
                    break;
                }
            },
            // Queue closed (gateway stopped or connection replaced) or the socket refused a send.
            _ = &mut writer => break,
        }
    }

    writer.abort();
    state.gateway.disconnect(&client_id, seq);
}

/// # Graceful Shutdown Signal Handler
///
/// Resolves on `CTRL+C`, or on `SIGTERM` on UNIX systems.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = signal::ctrl_c().await {
            tracing::error!(%error, "Failed to install Ctrl+C handler.");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(error) => {
                tracing::error!(%error, "Failed to install SIGTERM handler.");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
