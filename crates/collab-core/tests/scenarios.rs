// crates/collab-core/tests/scenarios.rs
use std::time::{Duration, Instant};

use collab_core::{
    ChatPost, ConnId, ContentUpdate, CursorPosition, CursorUpdate, Delivery, EngineConfig,
    InputMessage, OutputMessage, RoomRequest, RunCode, SessionEngine, DEFAULT_DOCUMENT,
};

const A: ConnId = ConnId(1);
const B: ConnId = ConnId(2);
const C: ConnId = ConnId(3);

fn engine() -> SessionEngine {
    SessionEngine::new(EngineConfig {
        broadcast_interval: Duration::ZERO,
        ..EngineConfig::default()
    })
}

fn join(user: &str, room: &str) -> InputMessage {
    InputMessage::JoinRoom(RoomRequest::new(user, room))
}

fn leave(user: &str, room: &str) -> InputMessage {
    InputMessage::LeaveRoom(RoomRequest::new(user, room))
}

fn edit(room: &str, content: &str) -> InputMessage {
    InputMessage::ContentUpdate(ContentUpdate {
        room_id: room.to_string(),
        content: content.to_string(),
        timestamp: None,
    })
}

fn cursor(user: &str, room: &str, line: u32, column: u32) -> InputMessage {
    InputMessage::CursorUpdate(CursorUpdate {
        room_id: room.to_string(),
        username: user.to_string(),
        position: CursorPosition::new(line, column),
    })
}

fn names(engine: &SessionEngine, room: &str) -> Vec<String> {
    engine.members(room).into_iter().map(|m| m.username).collect()
}

/// Messages in `out` addressed to `conn`, in order.
fn received(out: &[Delivery], conn: ConnId) -> Vec<OutputMessage> {
    out.iter()
        .filter(|d| d.is_for(conn))
        .map(|d| d.message.clone())
        .collect()
}

fn reason(msg: &OutputMessage) -> &str {
    match msg {
        OutputMessage::ValidationError { reason } => reason,
        other => panic!("expected validation-error, got {:?}", other),
    }
}

#[test]
fn join_sync_then_second_joiner_sees_latest_document() {
    let mut engine = engine();

    let out = engine.process_message(A, join("alice", "r1"));
    let to_a = received(&out, A);
    assert_eq!(
        to_a[0],
        OutputMessage::DocumentSync {
            content: DEFAULT_DOCUMENT.to_string()
        }
    );
    assert!(matches!(&to_a[1], OutputMessage::MemberJoined(c) if c.username == "alice"));

    engine.process_message(A, edit("r1", "print(1)"));
    assert_eq!(engine.document("r1"), Some("print(1)"));

    let out = engine.process_message(B, join("bob", "r1"));
    let to_b = received(&out, B);
    assert_eq!(
        to_b[0],
        OutputMessage::DocumentSync {
            content: "print(1)".to_string()
        }
    );

    // Both members hear member-joined carrying [alice, bob].
    for conn in [A, B] {
        let joined = received(&out, conn)
            .into_iter()
            .find_map(|m| match m {
                OutputMessage::MemberJoined(c) => Some(c),
                _ => None,
            })
            .expect("member-joined");
        let listed: Vec<_> = joined.members.iter().map(|m| m.username.as_str()).collect();
        assert_eq!(listed, vec!["alice", "bob"]);
        assert_eq!(joined.conn_id, B);
    }

    // The document sync never goes to anyone but the joiner.
    assert!(received(&out, A)
        .iter()
        .all(|m| !matches!(m, OutputMessage::DocumentSync { .. })));
}

#[test]
fn duplicate_join_is_rejected_without_state_change() {
    let mut engine = engine();
    engine.process_message(A, join("alice", "r1"));

    let out = engine.process_message(A, join("alice", "r1"));
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].to, vec![A]);
    assert_eq!(reason(&out[0].message), "You are already in this room");
    assert_eq!(names(&engine, "r1"), vec!["alice"]);
}

#[test]
fn switching_rooms_leaves_old_room_first() {
    let mut engine = engine();
    engine.process_message(A, join("alice", "r1"));
    engine.process_message(C, join("carol", "r1"));
    engine.process_message(B, join("bob", "r2"));

    let out = engine.process_message(A, join("alice", "r2"));

    let left_idx = out
        .iter()
        .position(|d| matches!(&d.message, OutputMessage::MemberLeft(c) if c.username == "alice"))
        .expect("member-left");
    let joined_idx = out
        .iter()
        .position(|d| matches!(&d.message, OutputMessage::MemberJoined(c) if c.username == "alice"))
        .expect("member-joined");
    assert!(left_idx < joined_idx);

    // member-left went to r1 (carol), not to alice or r2.
    assert_eq!(out[left_idx].to, vec![C]);

    assert_eq!(engine.room_of("alice"), Some("r2"));
    assert_eq!(names(&engine, "r1"), vec!["carol"]);
    assert_eq!(names(&engine, "r2"), vec!["bob", "alice"]);
}

#[test]
fn disconnect_then_last_leave_resets_document() {
    let mut engine = engine();
    engine.process_message(A, join("alice", "r1"));
    engine.process_message(B, join("bob", "r1"));
    engine.process_message(A, edit("r1", "let x = 2;"));

    let out = engine.disconnect(A);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].to, vec![B]);
    match &out[0].message {
        OutputMessage::MemberLeft(c) => {
            assert_eq!(c.username, "alice");
            assert_eq!(c.conn_id, A);
            let listed: Vec<_> = c.members.iter().map(|m| m.username.as_str()).collect();
            assert_eq!(listed, vec!["bob"]);
        }
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(engine.document("r1"), Some("let x = 2;"));

    let out = engine.process_message(B, leave("bob", "r1"));
    assert!(out.is_empty(), "nobody left to notify");
    assert!(engine.members("r1").is_empty());
    assert_eq!(engine.document("r1"), Some(DEFAULT_DOCUMENT));
}

#[test]
fn leave_for_unknown_username_is_rejected() {
    let mut engine = engine();
    let out = engine.process_message(A, leave("ghost", "r1"));
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].to, vec![A]);
    assert_eq!(reason(&out[0].message), "Unknown username");
}

#[test]
fn stale_leave_for_other_room_is_a_no_op() {
    let mut engine = engine();
    engine.process_message(A, join("alice", "r2"));

    let out = engine.process_message(A, leave("alice", "r1"));
    assert!(out.is_empty());
    assert_eq!(engine.room_of("alice"), Some("r2"));
}

#[test]
fn content_update_is_not_echoed_to_editor() {
    let mut engine = engine();
    engine.process_message(A, join("alice", "r1"));
    engine.process_message(B, join("bob", "r1"));

    let out = engine.process_message(
        A,
        InputMessage::ContentUpdate(ContentUpdate {
            room_id: "r1".to_string(),
            content: "fn main() {}".to_string(),
            timestamp: Some(1234),
        }),
    );

    assert_eq!(out.len(), 1);
    assert_eq!(out[0].to, vec![B]);
    assert_eq!(
        out[0].message,
        OutputMessage::DocumentBroadcast {
            content: "fn main() {}".to_string(),
            timestamp: Some(1234),
        }
    );
}

#[test]
fn content_update_from_non_member_is_rejected() {
    let mut engine = engine();
    engine.process_message(A, join("alice", "r1"));

    let out = engine.process_message(B, edit("r1", "hijack"));
    assert_eq!(out[0].to, vec![B]);
    assert_eq!(reason(&out[0].message), "Not a member of this room");
    assert_eq!(engine.document("r1"), Some(DEFAULT_DOCUMENT));
}

#[test]
fn typing_and_cursor_go_to_others_only() {
    let mut engine = engine();
    engine.process_message(A, join("alice", "r1"));
    engine.process_message(B, join("bob", "r1"));

    let out = engine.process_message(A, InputMessage::TypingStart(RoomRequest::new("alice", "r1")));
    assert_eq!(out[0].to, vec![B]);
    assert!(engine.is_typing("r1", "alice"));

    let out = engine.process_message(
        A,
        InputMessage::CursorUpdate(CursorUpdate {
            room_id: "r1".to_string(),
            username: "alice".to_string(),
            position: CursorPosition::new(3, 14),
        }),
    );
    assert_eq!(out[0].to, vec![B]);
    assert_eq!(engine.cursor("r1", "alice"), Some(CursorPosition::new(3, 14)));

    let out = engine.process_message(A, InputMessage::TypingStop(RoomRequest::new("alice", "r1")));
    assert_eq!(
        out[0].message,
        OutputMessage::TypingStopped {
            username: "alice".to_string()
        }
    );
    assert!(!engine.is_typing("r1", "alice"));
}

#[test]
fn signals_from_non_members_are_rejected() {
    let mut engine = engine();
    engine.process_message(A, join("alice", "r1"));

    let out = engine.process_message(B, InputMessage::TypingStart(RoomRequest::new("bob", "r1")));
    assert_eq!(reason(&out[0].message), "Not a member of this room");
    assert!(!engine.is_typing("r1", "bob"));
}

#[test]
fn chat_reaches_everyone_including_sender() {
    let mut engine = engine();
    engine.process_message(A, join("alice", "r1"));
    engine.process_message(B, join("bob", "r1"));

    let out = engine.process_message(
        A,
        InputMessage::ChatPost(ChatPost {
            room_id: "r1".to_string(),
            username: "alice".to_string(),
            text: "hi".to_string(),
        }),
    );

    assert_eq!(out.len(), 1);
    assert_eq!(out[0].to, vec![A, B]);
    match &out[0].message {
        OutputMessage::ChatMessage(m) => {
            assert_eq!(m.text, "hi");
            assert_eq!(m.room_id, "r1");
            assert_eq!(m.conn_id, A);
            assert!(m.time > 0);
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn run_code_output_is_relayed_to_whole_room() {
    let mut engine = engine();
    engine.process_message(A, join("alice", "r1"));
    engine.process_message(B, join("bob", "r1"));

    let out = engine.process_message(
        B,
        InputMessage::RunCode(RunCode {
            room_id: "r1".to_string(),
            content: "hello\n".to_string(),
        }),
    );
    assert_eq!(out[0].to, vec![A, B]);
    assert_eq!(
        out[0].message,
        OutputMessage::CodeExecuted {
            room_id: "r1".to_string(),
            content: "hello\n".to_string()
        }
    );
}

#[test]
fn ping_is_answered_to_requester_only() {
    let mut engine = engine();
    let out = engine.process_message(C, InputMessage::Ping);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].to, vec![C]);
    assert!(matches!(out[0].message, OutputMessage::Pong { .. }));
}

#[test]
fn leaving_while_typing_relays_typing_stopped_first() {
    let mut engine = engine();
    engine.process_message(A, join("alice", "r1"));
    engine.process_message(B, join("bob", "r1"));
    engine.process_message(A, InputMessage::TypingStart(RoomRequest::new("alice", "r1")));
    engine.process_message(A, cursor("alice", "r1", 2, 7));
    assert_eq!(engine.cursor("r1", "alice"), Some(CursorPosition::new(2, 7)));

    let out = engine.disconnect(A);
    assert_eq!(out.len(), 2);
    assert_eq!(
        out[0].message,
        OutputMessage::TypingStopped {
            username: "alice".to_string()
        }
    );
    assert!(matches!(out[1].message, OutputMessage::MemberLeft(_)));
    assert!(!engine.is_typing("r1", "alice"));
    assert_eq!(engine.cursor("r1", "alice"), None);
}

#[test]
fn leaving_purges_cursor_while_room_stays_occupied() {
    let mut engine = engine();
    engine.process_message(A, join("alice", "r1"));
    engine.process_message(B, join("bob", "r1"));
    engine.process_message(A, cursor("alice", "r1", 5, 1));
    engine.process_message(B, cursor("bob", "r1", 9, 4));

    let out = engine.process_message(A, leave("alice", "r1"));
    assert_eq!(received(&out, B).len(), 1);
    assert_eq!(engine.cursor("r1", "alice"), None);
    assert_eq!(engine.cursor("r1", "bob"), Some(CursorPosition::new(9, 4)));

    // Rejoining starts without a stale indicator.
    engine.process_message(A, join("alice", "r1"));
    assert_eq!(engine.cursor("r1", "alice"), None);
}

#[test]
fn disconnect_of_unknown_or_replaced_connection_is_silent() {
    let mut engine = engine();
    assert!(engine.disconnect(ConnId(99)).is_empty());

    // alice rejoins elsewhere from a new connection; the old one then drops.
    engine.process_message(A, join("alice", "r1"));
    engine.process_message(B, join("alice", "r2"));
    assert!(engine.disconnect(A).is_empty());
    assert_eq!(engine.room_of("alice"), Some("r2"));
}

#[test]
fn connection_switching_username_leaves_previous_identity() {
    let mut engine = engine();
    engine.process_message(A, join("alice", "r1"));
    engine.process_message(B, join("bob", "r1"));

    engine.process_message(A, join("alicia", "r1"));
    assert_eq!(engine.room_of("alice"), None);
    assert_eq!(names(&engine, "r1"), vec!["bob", "alicia"]);
}

#[test]
fn throttled_burst_ends_with_trailing_flush_of_final_content() {
    let mut engine = SessionEngine::new(EngineConfig {
        broadcast_interval: Duration::from_millis(50),
        ..EngineConfig::default()
    });
    let t0 = Instant::now();
    engine.process_message_at(A, join("alice", "r1"), t0);
    engine.process_message_at(B, join("bob", "r1"), t0);

    let first = engine.process_message_at(A, edit("r1", "a"), t0);
    assert_eq!(first.len(), 1);

    let burst: Vec<_> = ["ab", "abc", "abcd"]
        .iter()
        .enumerate()
        .flat_map(|(i, c)| {
            engine.process_message_at(A, edit("r1", c), t0 + Duration::from_millis(10 * (i as u64 + 1)))
        })
        .collect();
    assert!(burst.is_empty(), "burst should be throttled");
    assert_eq!(engine.document("r1"), Some("abcd"));
    assert!(engine.has_pending_flush("r1"));

    assert!(engine.flush_pending(t0 + Duration::from_millis(40)).is_empty());

    let flushed = engine.flush_pending(t0 + Duration::from_millis(60));
    assert_eq!(flushed.len(), 1);
    assert_eq!(flushed[0].to, vec![B]);
    assert_eq!(
        flushed[0].message,
        OutputMessage::DocumentBroadcast {
            content: "abcd".to_string(),
            timestamp: None
        }
    );
    assert!(!engine.has_pending_flush("r1"));
}

#[test]
fn idle_rooms_are_evicted_after_ttl() {
    let mut engine = engine();
    let t0 = Instant::now();
    let ttl = Duration::from_secs(600);

    engine.process_message_at(A, join("alice", "r1"), t0);
    engine.process_message_at(B, join("bob", "r2"), t0);
    engine.process_message_at(A, leave("alice", "r1"), t0);
    assert_eq!(engine.room_count(), 2);

    assert_eq!(engine.evict_idle_rooms(t0 + Duration::from_secs(599), ttl), 0);
    assert_eq!(engine.evict_idle_rooms(t0 + ttl, ttl), 1);
    assert_eq!(engine.room_count(), 1);
    assert_eq!(engine.document("r1"), None);

    // Zero TTL keeps empty rooms forever.
    engine.process_message_at(B, leave("bob", "r2"), t0);
    assert_eq!(engine.evict_idle_rooms(t0 + Duration::from_secs(10_000), Duration::ZERO), 0);
    assert_eq!(engine.room_count(), 1);
}

#[test]
fn rejoining_an_emptied_room_gets_default_document() {
    let mut engine = engine();
    engine.process_message(A, join("alice", "r1"));
    engine.process_message(A, edit("r1", "scratch"));
    engine.process_message(A, leave("alice", "r1"));

    let out = engine.process_message(A, join("alice", "r1"));
    assert_eq!(
        out[0].message,
        OutputMessage::DocumentSync {
            content: DEFAULT_DOCUMENT.to_string()
        }
    );
}
