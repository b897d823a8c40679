//! Shared types for the session server.
//!
//! This module defines:
//! - channel aliases between connections and the engine loop
//! - `ClientRegistry`: who is connected and how to reach them
//! - `EngineRequest`: messages flowing from connections to the engine

use std::collections::HashMap;
use std::sync::Arc;

use collab_core::{ConnId, InputMessage, OutputMessage};
use tokio::sync::mpsc;
use tokio::sync::RwLock;

/// Outbound messages from the engine to a given connection.
pub type OutboundTx = mpsc::UnboundedSender<OutputMessage>;
pub type OutboundRx = mpsc::UnboundedReceiver<OutputMessage>;

/// Registry of connected clients and their outbound channels.
///
/// - Key: `ConnId`
/// - Value: `OutboundTx` to send `OutputMessage`s to that connection.
pub type ClientRegistry = Arc<RwLock<HashMap<ConnId, OutboundTx>>>;

/// Message flowing from a connection task into the central engine task.
#[derive(Debug)]
pub enum EngineRequest {
    /// A decoded inbound frame.
    Message { conn: ConnId, msg: InputMessage },

    /// The connection's reader finished; clean up its presence.
    Disconnected(ConnId),
}

/// Channel from connections → engine task.
pub type EngineTx = mpsc::UnboundedSender<EngineRequest>;
pub type EngineRx = mpsc::UnboundedReceiver<EngineRequest>;
