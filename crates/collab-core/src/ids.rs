//! Identifiers shared across the engine.

use std::fmt;

/// Identifier for a connected client.
///
/// This is intentionally opaque; the server guarantees uniqueness
/// over the lifetime of the process. The engine only ever holds it as a
/// non-owning handle to target or exclude deliveries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnId(pub u64);

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Room identifier as supplied by clients. Compared by plain string equality.
pub type RoomId = String;

/// Display name a participant joins with.
pub type Username = String;
