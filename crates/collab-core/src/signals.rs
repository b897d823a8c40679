//! Ephemeral per-room signals: typing, cursors, chat, code-run output.
//!
//! None of these touch the document. The named user must be a current
//! member of the room, which keeps typing and cursor entries from
//! outliving their owner.

use chrono::Utc;

use crate::error::SessionError;
use crate::ids::ConnId;
use crate::messages::{
    ChatMessage, ChatPost, CursorUpdate, Delivery, OutputMessage, RoomRequest, RunCode,
};
use crate::registry::RoomRegistry;

pub fn start_typing(registry: &mut RoomRegistry, req: RoomRequest) -> Result<Vec<Delivery>, SessionError> {
    let member_conn = registry.require_member(&req.room_id, &req.username)?;
    let room = registry
        .room_mut(&req.room_id)
        .ok_or(SessionError::NotAMember)?;

    room.start_typing(&req.username);
    Ok(to_others(
        room.conns_except(member_conn),
        OutputMessage::TypingStarted {
            username: req.username,
        },
    ))
}

pub fn stop_typing(registry: &mut RoomRegistry, req: RoomRequest) -> Result<Vec<Delivery>, SessionError> {
    let member_conn = registry.require_member(&req.room_id, &req.username)?;
    let room = registry
        .room_mut(&req.room_id)
        .ok_or(SessionError::NotAMember)?;

    room.stop_typing(&req.username);
    Ok(to_others(
        room.conns_except(member_conn),
        OutputMessage::TypingStopped {
            username: req.username,
        },
    ))
}

pub fn set_cursor(registry: &mut RoomRegistry, upd: CursorUpdate) -> Result<Vec<Delivery>, SessionError> {
    let member_conn = registry.require_member(&upd.room_id, &upd.username)?;
    let room = registry
        .room_mut(&upd.room_id)
        .ok_or(SessionError::NotAMember)?;

    room.set_cursor(&upd.username, upd.position);
    Ok(to_others(
        room.conns_except(member_conn),
        OutputMessage::CursorMoved {
            username: upd.username,
            position: upd.position,
        },
    ))
}

/// Chat goes to every member, the sender included.
pub fn post_message(registry: &RoomRegistry, conn: ConnId, post: ChatPost) -> Result<Vec<Delivery>, SessionError> {
    registry.require_member(&post.room_id, &post.username)?;
    let room = registry.room(&post.room_id).ok_or(SessionError::NotAMember)?;

    let message = ChatMessage {
        username: post.username,
        text: post.text,
        room_id: post.room_id,
        time: Utc::now().timestamp_millis(),
        conn_id: conn,
    };

    Ok(vec![Delivery::to_all(
        room.conns(),
        OutputMessage::ChatMessage(message),
    )])
}

/// Relay a code-run result to the whole room, the requester included.
pub fn relay_run_output(registry: &RoomRegistry, conn: ConnId, run: RunCode) -> Result<Vec<Delivery>, SessionError> {
    registry.require_requester(conn, &run.room_id)?;
    let room = registry.room(&run.room_id).ok_or(SessionError::NotAMember)?;

    Ok(vec![Delivery::to_all(
        room.conns(),
        OutputMessage::CodeExecuted {
            room_id: run.room_id,
            content: run.content,
        },
    )])
}

fn to_others(to: Vec<ConnId>, message: OutputMessage) -> Vec<Delivery> {
    if to.is_empty() {
        Vec::new()
    } else {
        vec![Delivery::to_all(to, message)]
    }
}
