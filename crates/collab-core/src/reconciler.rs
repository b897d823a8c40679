//! Cleanup for connections that vanish without leaving.

use std::time::Instant;

use crate::ids::ConnId;
use crate::messages::Delivery;
use crate::presence;
use crate::registry::RoomRegistry;

/// Trace `conn` back to its username and room and run the normal leave.
///
/// Nothing happens (and nothing fails) when the connection never joined,
/// already left, or its username has since joined from another connection.
pub fn disconnect(registry: &mut RoomRegistry, conn: ConnId, now: Instant) -> Vec<Delivery> {
    let Some(username) = registry.forget_conn(conn) else {
        return Vec::new();
    };

    let room_id = match registry.presence_of(&username) {
        Some((room, bound)) if bound == conn => room.clone(),
        _ => {
            tracing::debug!(conn = conn.0, username = username.as_str(), "disconnect: presence already moved");
            return Vec::new();
        }
    };

    presence::depart(registry, &username, &room_id, now)
}
