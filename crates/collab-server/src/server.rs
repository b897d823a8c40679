//! TCP listener and top-level server wiring.
//!
//! This module:
//! - Listens on the configured address/port.
//! - Accepts new TCP connections (line protocol and WebSocket share the port).
//! - Assigns each connection a `ConnId`.
//! - Spawns:
//!   - a per-connection task to handle I/O,
//!   - a single central engine task that owns `SessionEngine`.
//!
//! The actual per-connection logic and engine loop live in `client`
//! and `engine_task` modules respectively.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Context;
use collab_core::ConnId;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, RwLock};
use tracing::{info, warn};

use crate::client::{self, ClientSettings};
use crate::config::Config;
use crate::engine_task;
use crate::types::{ClientRegistry, EngineRx, EngineTx, OutboundRx, OutboundTx};

/// Counter for assigning unique `ConnId`s for the life of the process.
static NEXT_CONN_ID: AtomicU64 = AtomicU64::new(1);

fn next_conn_id() -> ConnId {
    ConnId(NEXT_CONN_ID.fetch_add(1, Ordering::Relaxed))
}

/// Bind the configured address and serve forever.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let addr = config.socket_addr_string();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    serve(listener, config).await
}

/// Serve on an already-bound listener.
///
/// Tests bind `127.0.0.1:0` themselves and pass the listener in.
pub async fn serve(listener: TcpListener, config: Config) -> anyhow::Result<()> {
    let local_addr = listener.local_addr()?;
    info!(
        addr = %local_addr,
        max_clients = config.max_clients,
        broadcast_interval_ms = config.broadcast_interval_ms,
        room_idle_secs = config.room_idle_secs,
        "listening"
    );

    // Shared registry of connections → outbound channels.
    let clients: ClientRegistry = Arc::new(RwLock::new(Default::default()));

    // Channel from connections → engine task.
    let (engine_tx, engine_rx): (EngineTx, EngineRx) = mpsc::unbounded_channel();

    // Spawn the central engine task.
    {
        let clients = clients.clone();
        let engine_config = config.engine_config();
        let idle_ttl = config.room_idle_ttl();
        tokio::spawn(async move {
            engine_task::run_engine_loop(engine_rx, clients, engine_config, idle_ttl).await;
        });
    }

    let settings = ClientSettings {
        max_frame_bytes: config.max_frame_bytes,
    };

    loop {
        let (stream, peer_addr) = listener.accept().await?;
        let current_clients = clients.read().await.len();

        if current_clients >= config.max_clients {
            warn!(
                peer = %peer_addr,
                max_clients = config.max_clients,
                "rejecting connection: max_clients reached"
            );
            // Just drop the stream; client will see the connection closed.
            continue;
        }

        if let Err(e) = stream.set_nodelay(true) {
            warn!(peer = %peer_addr, error = %e, "failed to set TCP_NODELAY");
        }

        let conn = next_conn_id();
        info!(conn = conn.0, peer = %peer_addr, "accepted connection");

        // Create outbound channel for this connection and register it.
        let (out_tx, out_rx): (OutboundTx, OutboundRx) = mpsc::unbounded_channel();
        clients.write().await.insert(conn, out_tx.clone());

        let clients = clients.clone();
        let engine_tx = engine_tx.clone();

        tokio::spawn(async move {
            match client::run_client(conn, stream, engine_tx, out_tx, out_rx, clients, settings).await {
                Ok(()) => info!(conn = conn.0, "connection closed"),
                Err(e) => warn!(conn = conn.0, error = %format!("{:#}", e), "connection closed with error"),
            }
        });
    }
}
