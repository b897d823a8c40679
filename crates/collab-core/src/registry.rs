//! Authoritative room state.
//!
//! The [`RoomRegistry`] owns every [`Room`] plus the process-wide presence
//! bookkeeping:
//! - `username -> (room, conn)` for the single-active-room invariant.
//! - `conn -> username` so a dropped connection can be traced back.
//!
//! All mutation goes through `&mut self`, so member lists and presence
//! maps always change together. The registry never decides *who* should
//! be told about a change; that is left to the presence, document and
//! signal handlers built on top of it.

use std::collections::{BTreeSet, HashMap};
use std::time::{Duration, Instant};

use indexmap::IndexMap;

use crate::error::SessionError;
use crate::ids::{ConnId, RoomId, Username};
use crate::messages::{CursorPosition, Member};
use crate::throttle::BroadcastThrottle;

/// Document every room starts with and falls back to once it empties.
pub const DEFAULT_DOCUMENT: &str = "console.log('hello world')";

/// A single collaboration session.
#[derive(Debug, Clone)]
pub struct Room {
    /// Username -> connection, in join order.
    members: IndexMap<Username, ConnId>,

    document: String,

    cursors: HashMap<Username, CursorPosition>,

    typing: BTreeSet<Username>,

    pub(crate) throttle: BroadcastThrottle,

    /// When membership last dropped to zero. `None` while occupied.
    emptied_at: Option<Instant>,
}

impl Room {
    fn new(document: String, broadcast_interval: Duration) -> Self {
        Room {
            members: IndexMap::new(),
            document,
            cursors: HashMap::new(),
            typing: BTreeSet::new(),
            throttle: BroadcastThrottle::new(broadcast_interval),
            emptied_at: None,
        }
    }

    pub fn document(&self) -> &str {
        &self.document
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn conn_of(&self, username: &str) -> Option<ConnId> {
        self.members.get(username).copied()
    }

    /// Member list in join order.
    pub fn members(&self) -> Vec<Member> {
        self.members
            .iter()
            .map(|(username, conn)| Member {
                username: username.clone(),
                conn_id: *conn,
            })
            .collect()
    }

    /// Every member connection.
    pub fn conns(&self) -> Vec<ConnId> {
        self.members.values().copied().collect()
    }

    /// Every member connection except `skip`.
    pub fn conns_except(&self, skip: ConnId) -> Vec<ConnId> {
        self.members
            .values()
            .copied()
            .filter(|c| *c != skip)
            .collect()
    }

    pub fn cursor(&self, username: &str) -> Option<CursorPosition> {
        self.cursors.get(username).copied()
    }

    pub(crate) fn set_cursor(&mut self, username: &str, position: CursorPosition) {
        self.cursors.insert(username.to_string(), position);
    }

    pub fn is_typing(&self, username: &str) -> bool {
        self.typing.contains(username)
    }

    /// Returns `true` if the user was not already marked as typing.
    pub(crate) fn start_typing(&mut self, username: &str) -> bool {
        self.typing.insert(username.to_string())
    }

    /// Returns `true` if the user was marked as typing.
    pub(crate) fn stop_typing(&mut self, username: &str) -> bool {
        self.typing.remove(username)
    }

    fn idle_for(&self, now: Instant) -> Option<Duration> {
        match self.emptied_at {
            Some(at) if self.is_empty() => Some(now.saturating_duration_since(at)),
            _ => None,
        }
    }
}

/// Room storage plus presence indexes.
#[derive(Debug)]
pub struct RoomRegistry {
    rooms: HashMap<RoomId, Room>,

    /// Username -> (room it is in, connection it joined from).
    presence: HashMap<Username, (RoomId, ConnId)>,

    /// Connection -> username it currently speaks for.
    conn_users: HashMap<ConnId, Username>,

    default_document: String,
    broadcast_interval: Duration,
}

impl Default for RoomRegistry {
    fn default() -> Self {
        RoomRegistry::new(DEFAULT_DOCUMENT, Duration::from_millis(50))
    }
}

impl RoomRegistry {
    pub fn new(default_document: impl Into<String>, broadcast_interval: Duration) -> Self {
        RoomRegistry {
            rooms: HashMap::new(),
            presence: HashMap::new(),
            conn_users: HashMap::new(),
            default_document: default_document.into(),
            broadcast_interval,
        }
    }

    pub fn default_document(&self) -> &str {
        &self.default_document
    }

    // -------------------------------------------------------------------------
    // Rooms
    // -------------------------------------------------------------------------

    /// Get the room, creating it with the default document on first use.
    pub fn ensure_room(&mut self, room_id: &str) -> &mut Room {
        if !self.rooms.contains_key(room_id) {
            tracing::debug!(room = room_id, "room created");
        }
        let default_document = &self.default_document;
        let interval = self.broadcast_interval;
        self.rooms
            .entry(room_id.to_string())
            .or_insert_with(|| Room::new(default_document.clone(), interval))
    }

    pub fn room(&self, room_id: &str) -> Option<&Room> {
        self.rooms.get(room_id)
    }

    pub fn room_mut(&mut self, room_id: &str) -> Option<&mut Room> {
        self.rooms.get_mut(room_id)
    }

    pub(crate) fn rooms_mut(&mut self) -> impl Iterator<Item = &mut Room> + '_ {
        self.rooms.values_mut()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Insert (or re-insert at the tail) a member. Returns the new member list.
    pub fn upsert_member(&mut self, room_id: &str, username: &str, conn: ConnId) -> Vec<Member> {
        let room = self.ensure_room(room_id);
        room.members.shift_remove(username);
        room.members.insert(username.to_string(), conn);
        room.emptied_at = None;
        room.members()
    }

    /// Remove a member, purging their cursor and typing state.
    ///
    /// When the room becomes empty its document is reset to the default and
    /// any owed broadcast is dropped. Returns `None` if the room is unknown.
    pub fn remove_member(&mut self, room_id: &str, username: &str, now: Instant) -> Option<Vec<Member>> {
        let default_document = &self.default_document;
        let room = self.rooms.get_mut(room_id)?;

        room.members.shift_remove(username);
        room.cursors.remove(username);
        room.typing.remove(username);

        if room.is_empty() {
            room.document.clone_from(default_document);
            room.cursors.clear();
            room.typing.clear();
            room.throttle.reset();
            room.emptied_at = Some(now);
            tracing::debug!(room = room_id, "room emptied, document reset");
        }

        Some(room.members())
    }

    pub fn document(&self, room_id: &str) -> Option<&str> {
        self.rooms.get(room_id).map(Room::document)
    }

    /// Replace the document of an existing room. Returns `false` if the room is unknown.
    pub fn set_document(&mut self, room_id: &str, content: String) -> bool {
        match self.rooms.get_mut(room_id) {
            Some(room) => {
                room.document = content;
                true
            }
            None => false,
        }
    }

    /// Drop rooms that have been empty for at least `ttl`.
    pub fn evict_idle(&mut self, now: Instant, ttl: Duration) -> usize {
        let before = self.rooms.len();
        self.rooms.retain(|room_id, room| {
            let keep = room.idle_for(now).map_or(true, |idle| idle < ttl);
            if !keep {
                tracing::debug!(room = room_id.as_str(), "idle room evicted");
            }
            keep
        });
        before - self.rooms.len()
    }

    // -------------------------------------------------------------------------
    // Presence bookkeeping
    // -------------------------------------------------------------------------

    pub fn presence_of(&self, username: &str) -> Option<(&RoomId, ConnId)> {
        self.presence.get(username).map(|(room, conn)| (room, *conn))
    }

    pub fn username_for(&self, conn: ConnId) -> Option<&Username> {
        self.conn_users.get(&conn)
    }

    /// Record that `username` is in `room_id` via `conn`.
    ///
    /// A connection that previously spoke for this username loses that binding.
    pub fn bind(&mut self, username: &str, room_id: &str, conn: ConnId) {
        let previous = self
            .presence
            .insert(username.to_string(), (room_id.to_string(), conn));

        if let Some((_, old_conn)) = previous {
            if old_conn != conn && self.conn_users.get(&old_conn).map(String::as_str) == Some(username) {
                self.conn_users.remove(&old_conn);
            }
        }

        self.conn_users.insert(conn, username.to_string());
    }

    /// Forget where `username` is. Returns the room and connection it had.
    pub fn unbind(&mut self, username: &str) -> Option<(RoomId, ConnId)> {
        let (room_id, conn) = self.presence.remove(username)?;
        if self.conn_users.get(&conn).map(String::as_str) == Some(username) {
            self.conn_users.remove(&conn);
        }
        Some((room_id, conn))
    }

    /// Drop the reverse mapping for a connection that went away.
    pub fn forget_conn(&mut self, conn: ConnId) -> Option<Username> {
        self.conn_users.remove(&conn)
    }

    // -------------------------------------------------------------------------
    // Membership checks
    // -------------------------------------------------------------------------

    /// The connection `username` joined `room_id` from, if they are a member.
    pub fn require_member(&self, room_id: &str, username: &str) -> Result<ConnId, SessionError> {
        self.rooms
            .get(room_id)
            .and_then(|room| room.conn_of(username))
            .ok_or(SessionError::NotAMember)
    }

    /// The username `conn` speaks for, if that user is in `room_id` through `conn`.
    pub fn require_requester(&self, conn: ConnId, room_id: &str) -> Result<Username, SessionError> {
        let username = self.conn_users.get(&conn).ok_or(SessionError::NotAMember)?;
        match self.presence.get(username) {
            Some((room, bound)) if room == room_id && *bound == conn => Ok(username.clone()),
            _ => Err(SessionError::NotAMember),
        }
    }
}
