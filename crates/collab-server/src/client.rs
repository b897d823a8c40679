//! Per-connection I/O.
//!
//! Each accepted socket gets one reader (this task) and one writer task.
//! The transport is chosen by peeking at the first bytes:
//! - `GET ` → WebSocket upgrade, one JSON envelope per text frame.
//! - anything else → newline-delimited JSON over the raw TCP stream.
//!
//! Both paths feed the same decoder and the same engine channel. When the
//! reader ends for any reason the connection is removed from the registry
//! and the engine is told, which runs the disconnect cleanup.

use std::time::Duration;

use anyhow::{bail, Context};
use bytes::BytesMut;
use collab_core::{ConnId, OutputMessage};
use collab_protocol::{check_frame_len, decode_input, encode_output};
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::types::{ClientRegistry, EngineRequest, EngineTx, OutboundRx, OutboundTx};

/// Per-connection settings handed down from the server config.
#[derive(Debug, Clone, Copy)]
pub struct ClientSettings {
    pub max_frame_bytes: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transport {
    Lines,
    WebSocket,
    /// The peer stopped partway through a possible `GET ` prefix.
    Stalled,
}

const WS_PREFIX: &[u8; 4] = b"GET ";

/// How long a peer may take to send enough bytes to pick a transport.
const TRANSPORT_DETECT_TIMEOUT: Duration = Duration::from_secs(1);

/// Run the client I/O loop for a single connection.
pub async fn run_client(
    conn: ConnId,
    stream: TcpStream,
    engine_tx: EngineTx,
    out_tx: OutboundTx,
    out_rx: OutboundRx,
    clients: ClientRegistry,
    settings: ClientSettings,
) -> anyhow::Result<()> {
    let detected = tokio::time::timeout(TRANSPORT_DETECT_TIMEOUT, detect_transport(&stream))
        .await
        .unwrap_or_else(|_| Ok(Transport::Stalled));

    let result = match detected {
        Ok(Transport::Stalled) => {
            info!(conn = conn.0, "no transport chosen in time, closing");
            Ok(())
        }
        Ok(Transport::WebSocket) => {
            debug!(conn = conn.0, "transport: websocket");
            run_ws_reader(conn, stream, &engine_tx, out_tx, out_rx, settings).await
        }
        Ok(Transport::Lines) => {
            debug!(conn = conn.0, "transport: json lines");
            run_line_reader(conn, stream, &engine_tx, out_tx, out_rx, settings).await
        }
        Err(e) => Err(anyhow::Error::from(e).context("peek failed")),
    };

    // Remove client from registry, then let the engine reconcile.
    {
        let mut guard = clients.write().await;
        guard.remove(&conn);
    }
    if engine_tx.send(EngineRequest::Disconnected(conn)).is_err() {
        debug!(conn = conn.0, "engine channel closed before disconnect");
    }

    result
}

/// Wait until the first bytes decide the transport.
async fn detect_transport(stream: &TcpStream) -> std::io::Result<Transport> {
    let mut buf = [0u8; 4];
    loop {
        let n = stream.peek(&mut buf).await?;
        if n == 0 {
            // EOF before anything was sent; the line reader sees it and exits.
            return Ok(Transport::Lines);
        }
        if &buf == WS_PREFIX {
            return Ok(Transport::WebSocket);
        }
        if n == buf.len() || !WS_PREFIX.starts_with(&buf[..n]) {
            return Ok(Transport::Lines);
        }
        // A partial "GET" prefix: wait for more bytes to arrive.
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Decode one frame and hand it to the engine.
///
/// Decode failures are answered with a `validation-error` and the
/// connection stays open. Oversized frames and a dead engine end it.
fn forward_frame(
    conn: ConnId,
    frame: &[u8],
    engine_tx: &EngineTx,
    out_tx: &OutboundTx,
    settings: ClientSettings,
) -> anyhow::Result<()> {
    check_frame_len(frame.len(), settings.max_frame_bytes)?;

    let text = match std::str::from_utf8(frame) {
        Ok(t) => t.trim(),
        Err(_) => {
            reply_error(conn, out_tx, "Malformed frame: not UTF-8".to_string());
            return Ok(());
        }
    };
    if text.is_empty() {
        return Ok(());
    }

    match decode_input(text) {
        Ok(msg) => {
            if engine_tx.send(EngineRequest::Message { conn, msg }).is_err() {
                bail!("engine channel closed");
            }
        }
        Err(err) => {
            debug!(conn = conn.0, error = %err, "rejected frame");
            reply_error(conn, out_tx, err.to_string());
        }
    }
    Ok(())
}

fn reply_error(conn: ConnId, out_tx: &OutboundTx, reason: String) {
    if out_tx.send(OutputMessage::validation_error(reason)).is_err() {
        debug!(conn = conn.0, "writer gone, dropping validation-error");
    }
}

// ============================================================================
// Newline-delimited JSON
// ============================================================================

async fn run_line_reader(
    conn: ConnId,
    stream: TcpStream,
    engine_tx: &EngineTx,
    out_tx: OutboundTx,
    out_rx: OutboundRx,
    settings: ClientSettings,
) -> anyhow::Result<()> {
    let (mut read_half, write_half) = stream.into_split();
    tokio::spawn(write_lines(conn, write_half, out_rx));

    let mut buffer = BytesMut::with_capacity(8 * 1024);
    // Bytes of `buffer` already known to hold no newline.
    let mut scanned = 0;

    loop {
        let n = read_half
            .read_buf(&mut buffer)
            .await
            .context("read failed")?;
        if n == 0 {
            info!(conn = conn.0, "client closed connection");
            return Ok(());
        }

        // Process complete lines.
        while let Some(offset) = buffer[scanned..].iter().position(|&b| b == b'\n') {
            let newline_pos = scanned + offset;
            let line = buffer.split_to(newline_pos + 1);
            scanned = 0;
            forward_frame(conn, &line[..newline_pos], engine_tx, &out_tx, settings)?;
        }
        scanned = buffer.len();

        // A partial line that is already too long will never become valid.
        check_frame_len(buffer.len(), settings.max_frame_bytes)?;
    }
}

async fn write_lines(conn: ConnId, mut write_half: OwnedWriteHalf, mut out_rx: OutboundRx) {
    while let Some(msg) = out_rx.recv().await {
        let mut line = match encode_output(&msg) {
            Ok(line) => line,
            Err(e) => {
                warn!(conn = conn.0, error = %e, "failed to encode outbound message");
                continue;
            }
        };
        line.push('\n');

        if let Err(e) = write_half.write_all(line.as_bytes()).await {
            debug!(conn = conn.0, error = %e, "write failed, stopping writer");
            break;
        }
    }
}

// ============================================================================
// WebSocket
// ============================================================================

async fn run_ws_reader(
    conn: ConnId,
    stream: TcpStream,
    engine_tx: &EngineTx,
    out_tx: OutboundTx,
    mut out_rx: OutboundRx,
    settings: ClientSettings,
) -> anyhow::Result<()> {
    let ws_config = WebSocketConfig::default()
        .max_message_size(Some(settings.max_frame_bytes))
        .max_frame_size(Some(settings.max_frame_bytes));
    let ws_stream = tokio_tungstenite::accept_async_with_config(stream, Some(ws_config))
        .await
        .context("websocket handshake failed")?;
    let (mut sink, mut source) = ws_stream.split();

    tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            let text = match encode_output(&msg) {
                Ok(text) => text,
                Err(e) => {
                    warn!(conn = conn.0, error = %e, "failed to encode outbound message");
                    continue;
                }
            };
            if let Err(e) = sink.send(Message::Text(text.into())).await {
                debug!(conn = conn.0, error = %e, "websocket send failed, stopping writer");
                break;
            }
        }
        let _ = sink.close().await;
    });

    while let Some(frame) = source.next().await {
        match frame.context("websocket read failed")? {
            Message::Text(text) => {
                forward_frame(conn, text.as_str().as_bytes(), engine_tx, &out_tx, settings)?;
            }
            Message::Binary(data) => {
                forward_frame(conn, &data, engine_tx, &out_tx, settings)?;
            }
            Message::Close(_) => {
                info!(conn = conn.0, "client closed websocket");
                return Ok(());
            }
            // Ping/pong are answered by tungstenite itself.
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
        }
    }

    info!(conn = conn.0, "websocket stream ended");
    Ok(())
}
