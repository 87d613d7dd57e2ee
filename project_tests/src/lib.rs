//! # Test Harness
//!
//! Boots the full slide-sync stack (lifecycle graph + axum surface) on an
//! ephemeral local port and hands out WebSocket clients for the end-to-end
//! tests under `tests/`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use lib_common::engine::services::{GATEWAY, STATE};
use lib_common::engine::{
    sync_graph, ConnectionGateway, IndexPolicy, LifecycleOrchestrator, PresentationState,
    SharedStateCell, SyncSettings,
};
use lib_common::transport::{router, serve, AppState};

pub type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Upper bound for any single wait in a test.
pub const WAIT: Duration = Duration::from_secs(5);

pub struct TestServer {
    pub addr: SocketAddr,
    pub gateway: Arc<ConnectionGateway>,
    pub cell: Arc<SharedStateCell>,
    graph: LifecycleOrchestrator,
    token: CancellationToken,
    task: JoinHandle<std::io::Result<()>>,
}

impl TestServer {
    pub async fn start(initial: PresentationState, heartbeat_interval: Duration) -> Self {
        let mut graph = sync_graph(SyncSettings {
            initial,
            heartbeat_interval,
            policy: IndexPolicy::Unclamped,
        })
        .expect("graph declares");
        graph.start_all().expect("graph starts");

        let gateway = graph.handle::<ConnectionGateway>(GATEWAY).expect("gateway handle");
        let cell = graph.handle::<SharedStateCell>(STATE).expect("state handle");
        let app = router(
            AppState {
                gateway: Arc::clone(&gateway),
                cell: Arc::clone(&cell),
            },
            None,
        );

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let token = CancellationToken::new();
        let task = tokio::spawn(serve(listener, app, token.clone().cancelled_owned()));

        Self {
            addr,
            gateway,
            cell,
            graph,
            token,
            task,
        }
    }

    pub fn http_url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn connect(&self, client_id: &str) -> Client {
        let url = format!("ws://{}/ws?client_id={}", self.addr, client_id);
        let (socket, _) = connect_async(url).await.expect("websocket connects");
        socket
    }

    /// Waits until the gateway reports exactly `count` clients.
    pub async fn wait_for_clients(&self, count: usize) {
        tokio::time::timeout(WAIT, async {
            while self.gateway.client_count() != count {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("client count settles");
    }

    pub async fn shutdown(mut self) {
        self.graph.stop_all();
        self.token.cancel();
        tokio::time::timeout(WAIT, &mut self.task)
            .await
            .expect("server drains")
            .expect("server task joins")
            .expect("server exits cleanly");
    }
}

pub async fn send_json(client: &mut Client, frame: Value) {
    client
        .send(Message::Text(frame.to_string().into()))
        .await
        .expect("frame sent");
}

pub async fn send_raw(client: &mut Client, text: &str) {
    client.send(Message::Text(text.into())).await.expect("frame sent");
}

/// Reads messages until one of the given `kind` arrives, skipping others.
pub async fn next_of_kind(client: &mut Client, kind: &str) -> Value {
    tokio::time::timeout(WAIT, async {
        loop {
            let message = client
                .next()
                .await
                .expect("socket open")
                .expect("socket healthy");
            if let Message::Text(text) = message {
                let value: Value = serde_json::from_str(text.as_str()).expect("server sends JSON");
                if value["kind"] == kind {
                    return value;
                }
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("no `{}` message within {:?}", kind, WAIT))
}
