//! Error types for the session engine.
//!
//! The engine API itself is infallible: every rejection is turned into a
//! `validation-error` delivered to the requester only. These variants
//! exist so handlers can use `?` internally and so the reason strings
//! stay in one place.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// Join for the room the username is already in.
    #[error("You are already in this room")]
    AlreadyInRoom,

    /// Leave for a username that is not in any room.
    #[error("Unknown username")]
    UnknownUsername,

    /// Room-scoped request from someone who is not a member of that room.
    #[error("Not a member of this room")]
    NotAMember,
}
