//! # Slide Sync Server
//!
//! Serves a slide deck and keeps every connected viewer on the same slide.
//!
//! ## Key Features:
//! - **Shared Position**: a single `{index, max}` state, moved by `prev` /
//!   `next` events from any client.
//! - **Push on Change**: every mutation is broadcast to all clients at once.
//! - **Heartbeat Resync**: a full snapshot goes out on a fixed interval so a
//!   client that missed a push catches up.
//! - **Ordered Lifecycle**: components start in dependency order and stop in
//!   reverse on shutdown or startup failure.
//! - **Configurable**: command-line arguments with environment fallbacks and
//!   an optional `.env` file.
//! - **Structured Logging**: `tracing` with `RUST_LOG` support, optional JSON
//!   output and rolling log files.

use std::net::SocketAddr;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use lib_common::assets::{count_slides, initial_state, AssetError};
use lib_common::configs::SyncConfig;
use lib_common::engine::services::{GATEWAY, STATE};
use lib_common::engine::{sync_graph, ConnectionGateway, SharedStateCell, SyncSettings};
use lib_common::loggers::{init_tracing, LoggerOptions};
use lib_common::transport::{router, serve, shutdown_signal, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = SyncConfig::parse();
    config.validate().context("invalid configuration")?;

    let _log_guard = init_tracing(&LoggerOptions {
        default_directive: config.log_level.clone(),
        json: config.log_json,
        log_dir: config.log_dir.clone(),
        ..LoggerOptions::default()
    })
    .context("failed to initialize logging")?;

    info!("Starting slide sync server with config: {:?}", config);

    let count = match count_slides(&config.slides_dir, &config.slides_pattern) {
        Ok(count) => count,
        Err(AssetError::MissingDirectory(dir)) => {
            warn!("Slides directory {} not found. Starting with an empty deck.", dir.display());
            0
        }
        Err(e) => return Err(e).context("failed to enumerate slides"),
    };
    info!(count, "Slides discovered.");

    let mut graph = sync_graph(SyncSettings {
        initial: initial_state(count),
        heartbeat_interval: config.heartbeat_interval(),
        policy: config.index_policy(),
    })?;

    if let Err(e) = graph.start_all() {
        error!("Startup failed: {}. Stopping started components.", e);
        graph.stop_all();
        return Err(e.into());
    }

    let state = AppState {
        gateway: graph.handle::<ConnectionGateway>(GATEWAY)?,
        cell: graph.handle::<SharedStateCell>(STATE)?,
    };
    let app = router(state, Some(config.public_dir.clone()));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    let token = CancellationToken::new();
    let mut server = tokio::spawn(serve(listener, app, token.clone().cancelled_owned()));

    tokio::select! {
        _ = shutdown_signal() => {
            warn!("Shutdown signal received. Closing server gracefully...");
        }
        result = &mut server => {
            error!("Server stopped unexpectedly.");
            graph.stop_all();
            result.context("server task failed")?.context("server error")?;
            return Ok(());
        }
    }

    // Stopping the gateway closes every client queue, which ends open sockets.
    graph.stop_all();
    token.cancel();
    server
        .await
        .context("server task failed")?
        .context("server error")?;

    info!("Server shut down.");
    Ok(())
}
