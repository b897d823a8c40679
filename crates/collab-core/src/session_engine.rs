//! Multi-room session engine orchestrator.
//!
//! - Owns the [`RoomRegistry`] (all rooms, members, documents, presence).
//! - Routes each [`InputMessage`] to the presence, document or signal handler.
//! - Turns handler rejections into a `validation-error` for the requester.
//! - Exposes the timer-driven work (trailing flush, idle eviction) so the
//!   caller decides when it runs.
//!
//! The engine is synchronous and owns no clock: `process_message` reads
//! `Instant::now()`, while the `_at` variants take the time explicitly.

use std::time::{Duration, Instant};

use chrono::Utc;

use crate::document_sync;
use crate::error::SessionError;
use crate::ids::ConnId;
use crate::messages::{CursorPosition, Delivery, InputMessage, Member, OutputMessage};
use crate::presence;
use crate::reconciler;
use crate::registry::{RoomRegistry, DEFAULT_DOCUMENT};
use crate::signals;

/// Tunables for a [`SessionEngine`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Document a room starts with and resets to when it empties.
    pub default_document: String,

    /// Minimum spacing between document broadcasts per room. Zero disables.
    pub broadcast_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            default_document: DEFAULT_DOCUMENT.to_string(),
            broadcast_interval: Duration::from_millis(50),
        }
    }
}

/// Room/session coordination engine.
#[derive(Debug)]
pub struct SessionEngine {
    registry: RoomRegistry,
}

impl Default for SessionEngine {
    fn default() -> Self {
        SessionEngine::new(EngineConfig::default())
    }
}

impl SessionEngine {
    pub fn new(config: EngineConfig) -> Self {
        SessionEngine {
            registry: RoomRegistry::new(config.default_document, config.broadcast_interval),
        }
    }

    /// Process one inbound message from `conn` and return the deliveries it causes.
    pub fn process_message(&mut self, conn: ConnId, msg: InputMessage) -> Vec<Delivery> {
        self.process_message_at(conn, msg, Instant::now())
    }

    /// Same as [`process_message`](Self::process_message) with an explicit clock.
    pub fn process_message_at(&mut self, conn: ConnId, msg: InputMessage, now: Instant) -> Vec<Delivery> {
        let result = match msg {
            InputMessage::JoinRoom(req) => presence::join(&mut self.registry, conn, req, now),
            InputMessage::LeaveRoom(req) => presence::leave(&mut self.registry, req, now),
            InputMessage::ContentUpdate(upd) => document_sync::update(&mut self.registry, conn, upd, now),
            InputMessage::TypingStart(req) => signals::start_typing(&mut self.registry, req),
            InputMessage::TypingStop(req) => signals::stop_typing(&mut self.registry, req),
            InputMessage::CursorUpdate(upd) => signals::set_cursor(&mut self.registry, upd),
            InputMessage::ChatPost(post) => signals::post_message(&self.registry, conn, post),
            InputMessage::RunCode(run) => signals::relay_run_output(&self.registry, conn, run),
            InputMessage::Ping => Ok(vec![Delivery::unicast(
                conn,
                OutputMessage::Pong {
                    time: Utc::now().timestamp_millis(),
                },
            )]),
        };

        result.unwrap_or_else(|err| reject(conn, err))
    }

    /// Clean up after a connection that dropped.
    pub fn disconnect(&mut self, conn: ConnId) -> Vec<Delivery> {
        self.disconnect_at(conn, Instant::now())
    }

    pub fn disconnect_at(&mut self, conn: ConnId, now: Instant) -> Vec<Delivery> {
        reconciler::disconnect(&mut self.registry, conn, now)
    }

    /// Emit the trailing document broadcast for rooms whose throttle has expired.
    pub fn flush_pending(&mut self, now: Instant) -> Vec<Delivery> {
        document_sync::flush_pending(&mut self.registry, now)
    }

    /// Remove rooms that have been empty for at least `ttl`.
    ///
    /// A zero `ttl` evicts nothing; empty rooms are then kept forever.
    pub fn evict_idle_rooms(&mut self, now: Instant, ttl: Duration) -> usize {
        if ttl.is_zero() {
            return 0;
        }
        self.registry.evict_idle(now, ttl)
    }

    // -------------------------------------------------------------------------
    // Read accessors
    // -------------------------------------------------------------------------

    /// Members of `room_id` in join order; empty if the room is unknown.
    pub fn members(&self, room_id: &str) -> Vec<Member> {
        self.registry
            .room(room_id)
            .map(|room| room.members())
            .unwrap_or_default()
    }

    pub fn document(&self, room_id: &str) -> Option<&str> {
        self.registry.document(room_id)
    }

    /// The room `username` is currently in.
    pub fn room_of(&self, username: &str) -> Option<&str> {
        self.registry
            .presence_of(username)
            .map(|(room, _)| room.as_str())
    }

    pub fn cursor(&self, room_id: &str, username: &str) -> Option<CursorPosition> {
        self.registry.room(room_id)?.cursor(username)
    }

    pub fn is_typing(&self, room_id: &str, username: &str) -> bool {
        self.registry
            .room(room_id)
            .map_or(false, |room| room.is_typing(username))
    }

    pub fn room_count(&self) -> usize {
        self.registry.room_count()
    }

    pub fn has_pending_flush(&self, room_id: &str) -> bool {
        self.registry
            .room(room_id)
            .map_or(false, |room| room.throttle.is_pending())
    }
}

fn reject(conn: ConnId, err: SessionError) -> Vec<Delivery> {
    tracing::debug!(conn = conn.0, reason = %err, "request rejected");
    vec![Delivery::unicast(conn, OutputMessage::validation_error(err.to_string()))]
}
