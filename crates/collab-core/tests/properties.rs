// crates/collab-core/tests/properties.rs
//
// Drives the engine with a long, deterministic pseudo-random sequence of
// joins, leaves, edits and disconnects, checking global invariants after
// every step.

use std::collections::HashMap;
use std::time::Duration;

use collab_core::{
    ConnId, ContentUpdate, EngineConfig, InputMessage, OutputMessage, RoomRequest, SessionEngine,
    DEFAULT_DOCUMENT,
};

const ROOMS: [&str; 3] = ["r1", "r2", "r3"];
const USERS: [&str; 4] = ["ann", "ben", "cat", "dan"];

/// Small xorshift generator so the sequence is reproducible without extra crates.
struct Rng(u64);

impl Rng {
    fn next(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }

    fn pick<T: Copy>(&mut self, items: &[T]) -> T {
        items[(self.next() % items.len() as u64) as usize]
    }
}

fn check_invariants(engine: &SessionEngine) {
    let mut seen: HashMap<String, &str> = HashMap::new();

    for room in ROOMS {
        let members = engine.members(room);
        for m in &members {
            // Single active room per username.
            if let Some(prev) = seen.insert(m.username.clone(), room) {
                panic!("{} is in both {} and {}", m.username, prev, room);
            }
            assert_eq!(engine.room_of(&m.username), Some(room));
        }

        // An empty room always holds the default document.
        if members.is_empty() {
            if let Some(doc) = engine.document(room) {
                assert_eq!(doc, DEFAULT_DOCUMENT, "empty room {} kept stale content", room);
            }
        }
    }

    for user in USERS {
        if let Some(room) = engine.room_of(user) {
            assert!(engine.members(room).iter().any(|m| m.username == user));
        }
    }
}

#[test]
fn random_session_traffic_preserves_invariants() {
    let mut engine = SessionEngine::new(EngineConfig {
        broadcast_interval: Duration::ZERO,
        ..EngineConfig::default()
    });
    let mut rng = Rng(0x9e37_79b9_7f4a_7c15);

    // Each user sticks to one connection per "session"; a disconnect gives them a new one.
    let mut conn_of: HashMap<&str, ConnId> = HashMap::new();
    let mut next_conn = 1u64;

    for step in 0..5_000 {
        let user = rng.pick(&USERS);
        let room = rng.pick(&ROOMS);
        let conn = *conn_of.entry(user).or_insert_with(|| {
            next_conn += 1;
            ConnId(next_conn)
        });

        let out = match rng.next() % 4 {
            0 => engine.process_message(conn, InputMessage::JoinRoom(RoomRequest::new(user, room))),
            1 => engine.process_message(conn, InputMessage::LeaveRoom(RoomRequest::new(user, room))),
            2 => {
                let content = format!("step {}", step);
                let out = engine.process_message(
                    conn,
                    InputMessage::ContentUpdate(ContentUpdate {
                        room_id: room.to_string(),
                        content: content.clone(),
                        timestamp: None,
                    }),
                );

                // Accepted writes land immediately and never echo back.
                if engine.room_of(user) == Some(room) {
                    assert_eq!(engine.document(room), Some(content.as_str()));
                }
                for d in &out {
                    if matches!(d.message, OutputMessage::DocumentBroadcast { .. }) {
                        assert!(!d.is_for(conn), "editor received own broadcast");
                    }
                }
                out
            }
            _ => {
                conn_of.remove(user);
                engine.disconnect(conn)
            }
        };

        // Rejections only ever go back to the requester.
        for d in &out {
            if matches!(d.message, OutputMessage::ValidationError { .. }) {
                assert_eq!(d.to, vec![conn]);
            }
        }

        check_invariants(&engine);
    }
}

#[test]
fn explicit_leave_and_disconnect_leave_identical_state() {
    let setup = |engine: &mut SessionEngine| {
        engine.process_message(ConnId(1), InputMessage::JoinRoom(RoomRequest::new("ann", "r1")));
        engine.process_message(ConnId(2), InputMessage::JoinRoom(RoomRequest::new("ben", "r1")));
        engine.process_message(ConnId(1), InputMessage::TypingStart(RoomRequest::new("ann", "r1")));
        engine.process_message(
            ConnId(1),
            InputMessage::ContentUpdate(ContentUpdate {
                room_id: "r1".to_string(),
                content: "let shared = 1;".to_string(),
                timestamp: None,
            }),
        );
    };

    let mut by_leave = SessionEngine::default();
    setup(&mut by_leave);
    let leave_out =
        by_leave.process_message(ConnId(1), InputMessage::LeaveRoom(RoomRequest::new("ann", "r1")));

    let mut by_drop = SessionEngine::default();
    setup(&mut by_drop);
    let drop_out = by_drop.disconnect(ConnId(1));

    assert_eq!(leave_out, drop_out);
    assert_eq!(by_leave.members("r1"), by_drop.members("r1"));
    assert_eq!(by_leave.room_of("ann"), by_drop.room_of("ann"));
    assert_eq!(by_leave.is_typing("r1", "ann"), by_drop.is_typing("r1", "ann"));
    assert_eq!(by_leave.document("r1"), Some("let shared = 1;"));
    assert_eq!(by_leave.document("r1"), by_drop.document("r1"));
}
