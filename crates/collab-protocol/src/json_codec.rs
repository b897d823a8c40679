//! JSON envelope encoding/decoding for collab-core messages.
//!
//! Every frame is one JSON object:
//!
//! ```text
//! {"event": "<name>", "data": { ...payload, camelCase fields... }}
//! ```
//!
//! `data` may be omitted for events without a payload (`ping`).
//!
//! Decoding validates at the boundary: required fields must be present,
//! room ids / usernames are trimmed and length-checked, chat text is
//! length-checked. A successfully decoded [`InputMessage`] is therefore
//! always safe to hand to the engine.
//!
//! NOTE: This module handles **one message per frame**. Line splitting
//! (TCP) or text frames (WebSocket) are the server's job.

use collab_core::{
    ChatMessage, ChatPost, ConnId, ContentUpdate, CursorPosition, CursorUpdate, InputMessage, Member,
    MembershipChange, OutputMessage, RoomRequest, RunCode,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::payloads::*;
use crate::wire_types::{
    validate_chat_len, validate_room_id_len, validate_username_len, WireInputEvent, WireOutputEvent,
};

/// Errors that can arise when encoding/decoding a frame.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Not valid JSON, or a field has the wrong JSON type.
    #[error("Malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// `event` names nothing we know.
    #[error("Unknown event: {0}")]
    UnknownEvent(String),

    #[error("Missing field: {0}")]
    MissingField(&'static str),

    /// Present but empty or over its length limit.
    #[error("Invalid field: {0}")]
    InvalidField(&'static str),

    #[error("Frame too large: {len} bytes (max {max})")]
    FrameTooLarge { len: usize, max: usize },
}

#[derive(Deserialize)]
struct InboundEnvelope {
    event: String,
    #[serde(default)]
    data: Option<Value>,
}

#[derive(Serialize)]
struct OutboundEnvelope<'a, T: Serialize> {
    event: &'a str,
    data: T,
}

/// Reject frames over `max` bytes before any parsing happens.
pub fn check_frame_len(len: usize, max: usize) -> Result<(), ProtocolError> {
    if len > max {
        Err(ProtocolError::FrameTooLarge { len, max })
    } else {
        Ok(())
    }
}

// ============================================================================
// INPUT: client → server
// ============================================================================

/// Decode a single inbound frame.
pub fn decode_input(frame: &str) -> Result<InputMessage, ProtocolError> {
    let envelope: InboundEnvelope = serde_json::from_str(frame)?;
    let event = WireInputEvent::from_name(&envelope.event)
        .ok_or_else(|| ProtocolError::UnknownEvent(envelope.event.clone()))?;
    let data = envelope.data;

    match event {
        WireInputEvent::JoinRoom => Ok(InputMessage::JoinRoom(room_request(data)?)),
        WireInputEvent::LeaveRoom => Ok(InputMessage::LeaveRoom(room_request(data)?)),
        WireInputEvent::TypingStart => Ok(InputMessage::TypingStart(room_request(data)?)),
        WireInputEvent::TypingStop => Ok(InputMessage::TypingStop(room_request(data)?)),
        WireInputEvent::ContentUpdate => decode_content_update(data),
        WireInputEvent::CursorUpdate => decode_cursor_update(data),
        WireInputEvent::ChatPost => decode_chat_post(data),
        WireInputEvent::RunCode => decode_run_code(data),
        WireInputEvent::Ping => Ok(InputMessage::Ping),
    }
}

/// Encode a single inbound message (used by clients and tests).
pub fn encode_input(msg: &InputMessage) -> Result<String, ProtocolError> {
    match msg {
        InputMessage::JoinRoom(r) => envelope(WireInputEvent::JoinRoom.name(), room_payload(r)),
        InputMessage::LeaveRoom(r) => envelope(WireInputEvent::LeaveRoom.name(), room_payload(r)),
        InputMessage::TypingStart(r) => envelope(WireInputEvent::TypingStart.name(), room_payload(r)),
        InputMessage::TypingStop(r) => envelope(WireInputEvent::TypingStop.name(), room_payload(r)),
        InputMessage::ContentUpdate(u) => envelope(
            WireInputEvent::ContentUpdate.name(),
            ContentUpdatePayload {
                room_id: Some(u.room_id.clone()),
                content: Some(u.content.clone()),
                timestamp: u.timestamp,
            },
        ),
        InputMessage::CursorUpdate(u) => envelope(
            WireInputEvent::CursorUpdate.name(),
            CursorUpdatePayload {
                room_id: Some(u.room_id.clone()),
                username: Some(u.username.clone()),
                position: Some(position_payload(u.position)),
            },
        ),
        InputMessage::ChatPost(p) => envelope(
            WireInputEvent::ChatPost.name(),
            ChatPostPayload {
                room_id: Some(p.room_id.clone()),
                username: Some(p.username.clone()),
                text: Some(p.text.clone()),
            },
        ),
        InputMessage::RunCode(r) => envelope(
            WireInputEvent::RunCode.name(),
            RunCodePayload {
                room_id: Some(r.room_id.clone()),
                content: Some(r.content.clone()),
            },
        ),
        InputMessage::Ping => envelope(WireInputEvent::Ping.name(), EmptyPayload {}),
    }
}

fn room_request(data: Option<Value>) -> Result<RoomRequest, ProtocolError> {
    let p: RoomPayload = payload(data)?;
    Ok(RoomRequest {
        username: username(p.username)?,
        room_id: room_id(p.room_id)?,
    })
}

fn decode_content_update(data: Option<Value>) -> Result<InputMessage, ProtocolError> {
    let p: ContentUpdatePayload = payload(data)?;
    Ok(InputMessage::ContentUpdate(ContentUpdate {
        room_id: room_id(p.room_id)?,
        content: p.content.ok_or(ProtocolError::MissingField("content"))?,
        timestamp: p.timestamp,
    }))
}

fn decode_cursor_update(data: Option<Value>) -> Result<InputMessage, ProtocolError> {
    let p: CursorUpdatePayload = payload(data)?;
    let position = p.position.ok_or(ProtocolError::MissingField("position"))?;
    Ok(InputMessage::CursorUpdate(CursorUpdate {
        room_id: room_id(p.room_id)?,
        username: username(p.username)?,
        position: CursorPosition::new(position.line, position.column),
    }))
}

fn decode_chat_post(data: Option<Value>) -> Result<InputMessage, ProtocolError> {
    let p: ChatPostPayload = payload(data)?;
    let text = p.text.ok_or(ProtocolError::MissingField("text"))?;
    if text.trim().is_empty() || !validate_chat_len(text.len()) {
        return Err(ProtocolError::InvalidField("text"));
    }
    Ok(InputMessage::ChatPost(ChatPost {
        room_id: room_id(p.room_id)?,
        username: username(p.username)?,
        text,
    }))
}

fn decode_run_code(data: Option<Value>) -> Result<InputMessage, ProtocolError> {
    let p: RunCodePayload = payload(data)?;
    Ok(InputMessage::RunCode(RunCode {
        room_id: room_id(p.room_id)?,
        content: p.content.ok_or(ProtocolError::MissingField("content"))?,
    }))
}

fn room_id(value: Option<String>) -> Result<String, ProtocolError> {
    bounded_name(value, "roomId", validate_room_id_len)
}

fn username(value: Option<String>) -> Result<String, ProtocolError> {
    bounded_name(value, "username", validate_username_len)
}

fn bounded_name(
    value: Option<String>,
    field: &'static str,
    valid_len: fn(usize) -> bool,
) -> Result<String, ProtocolError> {
    let raw = value.ok_or(ProtocolError::MissingField(field))?;
    let trimmed = raw.trim();
    if !valid_len(trimmed.len()) {
        return Err(ProtocolError::InvalidField(field));
    }
    Ok(trimmed.to_string())
}

// ============================================================================
// OUTPUT: server → client
// ============================================================================

/// Encode a single outbound message as one JSON frame (no trailing newline).
pub fn encode_output(msg: &OutputMessage) -> Result<String, ProtocolError> {
    match msg {
        OutputMessage::MemberJoined(c) => {
            envelope(WireOutputEvent::MemberJoined.name(), membership_payload(c))
        }
        OutputMessage::MemberLeft(c) => {
            envelope(WireOutputEvent::MemberLeft.name(), membership_payload(c))
        }
        OutputMessage::DocumentSync { content } => envelope(
            WireOutputEvent::DocumentSync.name(),
            DocumentSyncPayload {
                content: content.clone(),
            },
        ),
        OutputMessage::DocumentBroadcast { content, timestamp } => envelope(
            WireOutputEvent::DocumentBroadcast.name(),
            DocumentBroadcastPayload {
                content: content.clone(),
                timestamp: *timestamp,
            },
        ),
        OutputMessage::TypingStarted { username } => envelope(
            WireOutputEvent::TypingStarted.name(),
            UsernamePayload {
                username: username.clone(),
            },
        ),
        OutputMessage::TypingStopped { username } => envelope(
            WireOutputEvent::TypingStopped.name(),
            UsernamePayload {
                username: username.clone(),
            },
        ),
        OutputMessage::CursorMoved { username, position } => envelope(
            WireOutputEvent::CursorMoved.name(),
            CursorMovedPayload {
                username: username.clone(),
                position: position_payload(*position),
            },
        ),
        OutputMessage::ChatMessage(m) => envelope(
            WireOutputEvent::ChatMessage.name(),
            ChatMessagePayload {
                username: m.username.clone(),
                text: m.text.clone(),
                room_id: m.room_id.clone(),
                time: m.time,
                conn_id: m.conn_id.0,
            },
        ),
        OutputMessage::CodeExecuted { room_id, content } => envelope(
            WireOutputEvent::ExecutedCode.name(),
            ExecutedCodePayload {
                room_id: room_id.clone(),
                content: content.clone(),
            },
        ),
        OutputMessage::Pong { time } => {
            envelope(WireOutputEvent::Pong.name(), PongPayload { time: *time })
        }
        OutputMessage::ValidationError { reason } => envelope(
            WireOutputEvent::ValidationError.name(),
            ValidationErrorPayload {
                reason: reason.clone(),
            },
        ),
    }
}

/// Decode a single outbound frame (used by clients and tests).
pub fn decode_output(frame: &str) -> Result<OutputMessage, ProtocolError> {
    let envelope: InboundEnvelope = serde_json::from_str(frame)?;
    let event = WireOutputEvent::from_name(&envelope.event)
        .ok_or_else(|| ProtocolError::UnknownEvent(envelope.event.clone()))?;
    let data = envelope.data;

    let msg = match event {
        WireOutputEvent::MemberJoined => OutputMessage::MemberJoined(membership(payload(data)?)),
        WireOutputEvent::MemberLeft => OutputMessage::MemberLeft(membership(payload(data)?)),
        WireOutputEvent::DocumentSync => {
            let p: DocumentSyncPayload = payload(data)?;
            OutputMessage::DocumentSync { content: p.content }
        }
        WireOutputEvent::DocumentBroadcast => {
            let p: DocumentBroadcastPayload = payload(data)?;
            OutputMessage::DocumentBroadcast {
                content: p.content,
                timestamp: p.timestamp,
            }
        }
        WireOutputEvent::TypingStarted => {
            let p: UsernamePayload = payload(data)?;
            OutputMessage::TypingStarted { username: p.username }
        }
        WireOutputEvent::TypingStopped => {
            let p: UsernamePayload = payload(data)?;
            OutputMessage::TypingStopped { username: p.username }
        }
        WireOutputEvent::CursorMoved => {
            let p: CursorMovedPayload = payload(data)?;
            OutputMessage::CursorMoved {
                username: p.username,
                position: CursorPosition::new(p.position.line, p.position.column),
            }
        }
        WireOutputEvent::ChatMessage => {
            let p: ChatMessagePayload = payload(data)?;
            OutputMessage::ChatMessage(ChatMessage {
                username: p.username,
                text: p.text,
                room_id: p.room_id,
                time: p.time,
                conn_id: ConnId(p.conn_id),
            })
        }
        WireOutputEvent::ExecutedCode => {
            let p: ExecutedCodePayload = payload(data)?;
            OutputMessage::CodeExecuted {
                room_id: p.room_id,
                content: p.content,
            }
        }
        WireOutputEvent::Pong => {
            let p: PongPayload = payload(data)?;
            OutputMessage::Pong { time: p.time }
        }
        WireOutputEvent::ValidationError => {
            let p: ValidationErrorPayload = payload(data)?;
            OutputMessage::ValidationError { reason: p.reason }
        }
    };

    Ok(msg)
}

// ============================================================================
// Helpers
// ============================================================================

/// Deserialize `data`, treating an absent or `null` payload as `{}`.
fn payload<T: DeserializeOwned>(data: Option<Value>) -> Result<T, ProtocolError> {
    let value = match data {
        None | Some(Value::Null) => Value::Object(Default::default()),
        Some(v) => v,
    };
    Ok(serde_json::from_value(value)?)
}

fn envelope<T: Serialize>(event: &str, data: T) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(&OutboundEnvelope { event, data })?)
}

fn room_payload(r: &RoomRequest) -> RoomPayload {
    RoomPayload {
        username: Some(r.username.clone()),
        room_id: Some(r.room_id.clone()),
    }
}

fn position_payload(p: CursorPosition) -> PositionPayload {
    PositionPayload {
        line: p.line,
        column: p.column,
    }
}

fn membership_payload(c: &MembershipChange) -> MembershipPayload {
    MembershipPayload {
        username: c.username.clone(),
        conn_id: c.conn_id.0,
        members: c
            .members
            .iter()
            .map(|m| MemberPayload {
                username: m.username.clone(),
                conn_id: m.conn_id.0,
            })
            .collect(),
    }
}

fn membership(p: MembershipPayload) -> MembershipChange {
    MembershipChange {
        username: p.username,
        conn_id: ConnId(p.conn_id),
        members: p
            .members
            .into_iter()
            .map(|m| Member {
                username: m.username,
                conn_id: ConnId(m.conn_id),
            })
            .collect(),
    }
}
