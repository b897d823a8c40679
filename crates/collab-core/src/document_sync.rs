//! Last-write-wins document updates with throttled fan-out.

use std::time::Instant;

use crate::error::SessionError;
use crate::ids::ConnId;
use crate::messages::{ContentUpdate, Delivery, OutputMessage};
use crate::registry::RoomRegistry;

/// Apply `content-update` from `conn`.
///
/// The write always lands. The broadcast to the other members goes out
/// now if the room's throttle admits it, otherwise it is owed and picked
/// up later by [`flush_pending`].
pub fn update(
    registry: &mut RoomRegistry,
    conn: ConnId,
    upd: ContentUpdate,
    now: Instant,
) -> Result<Vec<Delivery>, SessionError> {
    registry.require_requester(conn, &upd.room_id)?;

    let room = registry
        .room_mut(&upd.room_id)
        .ok_or(SessionError::NotAMember)?;

    if !room.throttle.admit(now, conn) {
        registry.set_document(&upd.room_id, upd.content);
        return Ok(Vec::new());
    }

    let to = room.conns_except(conn);
    registry.set_document(&upd.room_id, upd.content.clone());

    if to.is_empty() {
        return Ok(Vec::new());
    }

    Ok(vec![Delivery::to_all(
        to,
        OutputMessage::DocumentBroadcast {
            content: upd.content,
            timestamp: upd.timestamp,
        },
    )])
}

/// Send the current document for every room whose throttled broadcast is due.
pub fn flush_pending(registry: &mut RoomRegistry, now: Instant) -> Vec<Delivery> {
    let mut out = Vec::new();

    for room in registry.rooms_mut() {
        let Some(origin) = room.throttle.take_due(now) else {
            continue;
        };

        let to = room.conns_except(origin);
        if to.is_empty() {
            continue;
        }

        out.push(Delivery::to_all(
            to,
            OutputMessage::DocumentBroadcast {
                content: room.document().to_string(),
                timestamp: None,
            },
        ));
    }

    out
}
