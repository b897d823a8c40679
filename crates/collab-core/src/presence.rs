//! Join / leave / switch-room semantics.
//!
//! Each username moves through `Unjoined -> InRoom(room) -> Unjoined`.
//! A username is in at most one room at a time, and a connection speaks
//! for at most one username at a time. Joining elsewhere performs a full
//! departure from the previous room first, so the old room hears
//! `member-left` before the new room hears `member-joined`.

use std::time::Instant;

use crate::error::SessionError;
use crate::ids::ConnId;
use crate::messages::{Delivery, MembershipChange, OutputMessage, RoomRequest};
use crate::registry::RoomRegistry;

/// Handle `join-room` from `conn`.
pub fn join(
    registry: &mut RoomRegistry,
    conn: ConnId,
    req: RoomRequest,
    now: Instant,
) -> Result<Vec<Delivery>, SessionError> {
    if let Some((room, _)) = registry.presence_of(&req.username) {
        if *room == req.room_id {
            return Err(SessionError::AlreadyInRoom);
        }
    }

    let mut out = Vec::new();

    // The connection was speaking for someone else: that user leaves first.
    if let Some(previous) = registry.username_for(conn).cloned() {
        if previous != req.username {
            if let Some((room, bound)) = registry.presence_of(&previous) {
                if bound == conn {
                    let room = room.clone();
                    out.extend(depart(registry, &previous, &room, now));
                }
            }
        }
    }

    // Switching rooms.
    if let Some((other, _)) = registry.presence_of(&req.username) {
        let other = other.clone();
        out.extend(depart(registry, &req.username, &other, now));
    }

    let members = registry.upsert_member(&req.room_id, &req.username, conn);
    registry.bind(&req.username, &req.room_id, conn);

    tracing::debug!(
        room = req.room_id.as_str(),
        username = req.username.as_str(),
        conn = conn.0,
        members = members.len(),
        "member joined"
    );

    let content = registry
        .document(&req.room_id)
        .unwrap_or(registry.default_document())
        .to_string();
    out.push(Delivery::unicast(conn, OutputMessage::DocumentSync { content }));

    let to = members.iter().map(|m| m.conn_id).collect();
    out.push(Delivery::to_all(
        to,
        OutputMessage::MemberJoined(MembershipChange {
            username: req.username,
            conn_id: conn,
            members,
        }),
    ));

    Ok(out)
}

/// Handle `leave-room`.
///
/// A leave naming a room other than the one the user is in is ignored.
pub fn leave(
    registry: &mut RoomRegistry,
    req: RoomRequest,
    now: Instant,
) -> Result<Vec<Delivery>, SessionError> {
    let current = match registry.presence_of(&req.username) {
        None => return Err(SessionError::UnknownUsername),
        Some((room, _)) => room.clone(),
    };

    if current != req.room_id {
        tracing::debug!(
            username = req.username.as_str(),
            room = req.room_id.as_str(),
            actual = current.as_str(),
            "stale leave ignored"
        );
        return Ok(Vec::new());
    }

    Ok(depart(registry, &req.username, &current, now))
}

/// Remove `username` from `room_id` and tell whoever is left.
///
/// Shared by explicit leave, room switch, and disconnect so all three
/// produce identical cleanup.
pub(crate) fn depart(
    registry: &mut RoomRegistry,
    username: &str,
    room_id: &str,
    now: Instant,
) -> Vec<Delivery> {
    let was_typing = registry
        .room(room_id)
        .map_or(false, |room| room.is_typing(username));

    let conn_id = match registry.unbind(username) {
        Some((_, conn)) => conn,
        None => return Vec::new(),
    };

    let remaining = registry
        .remove_member(room_id, username, now)
        .unwrap_or_default();

    tracing::debug!(
        room = room_id,
        username,
        conn = conn_id.0,
        remaining = remaining.len(),
        "member left"
    );

    if remaining.is_empty() {
        return Vec::new();
    }

    let to: Vec<ConnId> = remaining.iter().map(|m| m.conn_id).collect();
    let mut out = Vec::with_capacity(2);

    if was_typing {
        out.push(Delivery::to_all(
            to.clone(),
            OutputMessage::TypingStopped {
                username: username.to_string(),
            },
        ));
    }

    out.push(Delivery::to_all(
        to,
        OutputMessage::MemberLeft(MembershipChange {
            username: username.to_string(),
            conn_id,
            members: remaining,
        }),
    ));

    out
}
