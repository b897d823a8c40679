//! collab-core
//!
//! Pure room/session coordination logic:
//! - messages (input/output types, deliveries)
//! - room registry (members, documents, presence indexes)
//! - presence (join / leave / switch)
//! - document sync with a per-room broadcast throttle
//! - typing, cursor, chat and code-run signals
//! - disconnect reconciliation
//! - multi-room session engine

pub mod ids;
pub mod messages;
pub mod error;
pub mod throttle;
pub mod registry;
pub mod presence;
pub mod document_sync;
pub mod signals;
pub mod reconciler;
pub mod session_engine;

pub use ids::{ConnId, RoomId, Username};

pub use messages::{
    ChatMessage,
    ChatPost,
    ContentUpdate,
    CursorPosition,
    CursorUpdate,
    Delivery,
    InputMessage,
    Member,
    MembershipChange,
    OutputMessage,
    RoomRequest,
    RunCode,
};

pub use error::SessionError;
pub use registry::{Room, RoomRegistry, DEFAULT_DOCUMENT};
pub use throttle::BroadcastThrottle;
pub use session_engine::{EngineConfig, SessionEngine};
