//! Low-level wire types and constants.
//!
//! This module defines:
//! - Event names for inbound and outbound messages.
//! - Size limits enforced at the protocol boundary.
//! - Small helpers for checking those limits.
//!
//! The actual encode/decode logic lives in `json_codec`.

/// Inbound events (client → server).
///
/// The name is the `event` field of the JSON envelope.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum WireInputEvent {
    JoinRoom,
    LeaveRoom,
    ContentUpdate,
    TypingStart,
    TypingStop,
    CursorUpdate,
    ChatPost,
    RunCode,
    Ping,
}

impl WireInputEvent {
    pub const ALL: [WireInputEvent; 9] = [
        WireInputEvent::JoinRoom,
        WireInputEvent::LeaveRoom,
        WireInputEvent::ContentUpdate,
        WireInputEvent::TypingStart,
        WireInputEvent::TypingStop,
        WireInputEvent::CursorUpdate,
        WireInputEvent::ChatPost,
        WireInputEvent::RunCode,
        WireInputEvent::Ping,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|e| e.name() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            WireInputEvent::JoinRoom => "join-room",
            WireInputEvent::LeaveRoom => "leave-room",
            WireInputEvent::ContentUpdate => "content-update",
            WireInputEvent::TypingStart => "typing-start",
            WireInputEvent::TypingStop => "typing-stop",
            WireInputEvent::CursorUpdate => "cursor-update",
            WireInputEvent::ChatPost => "chat-post",
            WireInputEvent::RunCode => "run-code",
            WireInputEvent::Ping => "ping",
        }
    }
}

/// Outbound events (server → client).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum WireOutputEvent {
    MemberJoined,
    MemberLeft,
    DocumentSync,
    DocumentBroadcast,
    TypingStarted,
    TypingStopped,
    CursorMoved,
    ChatMessage,
    ExecutedCode,
    Pong,
    ValidationError,
}

impl WireOutputEvent {
    pub const ALL: [WireOutputEvent; 11] = [
        WireOutputEvent::MemberJoined,
        WireOutputEvent::MemberLeft,
        WireOutputEvent::DocumentSync,
        WireOutputEvent::DocumentBroadcast,
        WireOutputEvent::TypingStarted,
        WireOutputEvent::TypingStopped,
        WireOutputEvent::CursorMoved,
        WireOutputEvent::ChatMessage,
        WireOutputEvent::ExecutedCode,
        WireOutputEvent::Pong,
        WireOutputEvent::ValidationError,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|e| e.name() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            WireOutputEvent::MemberJoined => "member-joined",
            WireOutputEvent::MemberLeft => "member-left",
            WireOutputEvent::DocumentSync => "document-sync",
            WireOutputEvent::DocumentBroadcast => "document-broadcast",
            WireOutputEvent::TypingStarted => "typing-started",
            WireOutputEvent::TypingStopped => "typing-stopped",
            WireOutputEvent::CursorMoved => "cursor-moved",
            WireOutputEvent::ChatMessage => "chat-message",
            WireOutputEvent::ExecutedCode => "executed-code",
            WireOutputEvent::Pong => "pong",
            WireOutputEvent::ValidationError => "validation-error",
        }
    }
}

/// Maximum room id length in bytes, after trimming.
pub const MAX_ROOM_ID_LEN: usize = 128;

/// Maximum username length in bytes, after trimming.
pub const MAX_USERNAME_LEN: usize = 64;

/// Maximum chat message length in bytes.
pub const MAX_CHAT_LEN: usize = 4096;

/// Default cap on a single inbound frame (1 MB).
///
/// Frames above the cap are not decoded at all; the server drops the
/// connection instead.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 1_000_000;

pub fn validate_room_id_len(len: usize) -> bool {
    len > 0 && len <= MAX_ROOM_ID_LEN
}

pub fn validate_username_len(len: usize) -> bool {
    len > 0 && len <= MAX_USERNAME_LEN
}

pub fn validate_chat_len(len: usize) -> bool {
    len > 0 && len <= MAX_CHAT_LEN
}
