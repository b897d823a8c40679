//! Message types used by the session engine.
//!
//! These are **transport-agnostic** logical messages:
//! - [`InputMessage`]: what the engine consumes.
//! - [`OutputMessage`]: what the engine produces.
//! - [`Delivery`]: an output message plus the connections it goes to.
//!
//! Note: the JSON envelope encoding lives in the `collab-protocol` crate;
//! this module is purely logical. Field-level validation (missing or
//! oversized values) also happens there, so every `InputMessage` that
//! reaches the engine is already well-formed.

use crate::ids::{ConnId, RoomId, Username};

/// A request into the session engine, one variant per inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputMessage {
    /// Join (or switch to) a room.
    JoinRoom(RoomRequest),

    /// Leave a room explicitly.
    LeaveRoom(RoomRequest),

    /// Replace the room's document.
    ContentUpdate(ContentUpdate),

    /// Username started typing.
    TypingStart(RoomRequest),

    /// Username stopped typing.
    TypingStop(RoomRequest),

    /// Username moved their cursor.
    CursorUpdate(CursorUpdate),

    /// Post a chat message to the room.
    ChatPost(ChatPost),

    /// Relay the output of an external code run to the room.
    RunCode(RunCode),

    /// Liveness probe; answered with a pong to the requester.
    Ping,
}

/// `(username, roomId)` pair carried by join / leave / typing events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomRequest {
    pub username: Username,
    pub room_id: RoomId,
}

impl RoomRequest {
    pub fn new(username: impl Into<Username>, room_id: impl Into<RoomId>) -> Self {
        RoomRequest {
            username: username.into(),
            room_id: room_id.into(),
        }
    }
}

/// Full replacement of a room's document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentUpdate {
    pub room_id: RoomId,
    pub content: String,

    /// Opaque client timestamp, passed through untouched for latency probes.
    pub timestamp: Option<i64>,
}

/// Position in the shared editor, 0-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CursorPosition {
    pub line: u32,
    pub column: u32,
}

impl CursorPosition {
    pub fn new(line: u32, column: u32) -> Self {
        CursorPosition { line, column }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorUpdate {
    pub room_id: RoomId,
    pub username: Username,
    pub position: CursorPosition,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatPost {
    pub room_id: RoomId,
    pub username: Username,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunCode {
    pub room_id: RoomId,
    pub content: String,
}

/// One entry of a room's member list as shown to clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub username: Username,
    pub conn_id: ConnId,
}

/// An event emitted by the session engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputMessage {
    /// Someone joined; carries the room's full member list.
    MemberJoined(MembershipChange),

    /// Someone left or disconnected; carries the remaining members.
    MemberLeft(MembershipChange),

    /// Current document, sent only to a connection that just joined.
    DocumentSync { content: String },

    /// Updated document, sent to every member except the editor.
    DocumentBroadcast {
        content: String,
        timestamp: Option<i64>,
    },

    TypingStarted { username: Username },

    TypingStopped { username: Username },

    CursorMoved {
        username: Username,
        position: CursorPosition,
    },

    ChatMessage(ChatMessage),

    /// Relayed output of an external code run.
    CodeExecuted { room_id: RoomId, content: String },

    Pong { time: i64 },

    /// Rejected request; only ever sent to the requester.
    ValidationError { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipChange {
    pub username: Username,
    pub conn_id: ConnId,
    pub members: Vec<Member>,
}

/// Immutable chat message, stamped by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub username: Username,
    pub text: String,
    pub room_id: RoomId,

    /// Milliseconds since the Unix epoch.
    pub time: i64,
    pub conn_id: ConnId,
}

impl OutputMessage {
    pub fn validation_error(reason: impl Into<String>) -> Self {
        OutputMessage::ValidationError {
            reason: reason.into(),
        }
    }
}

/// An output message addressed to a concrete set of connections.
///
/// Recipients are resolved by the engine at the moment the state change
/// is committed, so a room's deliveries follow its mutation order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub to: Vec<ConnId>,
    pub message: OutputMessage,
}

impl Delivery {
    /// Deliver to a single connection.
    pub fn unicast(conn: ConnId, message: OutputMessage) -> Self {
        Delivery {
            to: vec![conn],
            message,
        }
    }

    /// Deliver to every listed connection.
    pub fn to_all(to: Vec<ConnId>, message: OutputMessage) -> Self {
        Delivery { to, message }
    }

    pub fn is_for(&self, conn: ConnId) -> bool {
        self.to.contains(&conn)
    }
}
