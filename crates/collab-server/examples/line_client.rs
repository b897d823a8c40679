use std::env;

use anyhow::{bail, Context, Result};
use collab_core::{
    ChatPost, ContentUpdate, CursorPosition, CursorUpdate, InputMessage, OutputMessage, RoomRequest,
    RunCode,
};
use collab_protocol::{decode_output, encode_input};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

/// Who this terminal currently speaks for.
#[derive(Default)]
struct Session {
    username: Option<String>,
    room: Option<String>,
}

impl Session {
    fn identity(&self) -> Result<(String, String)> {
        match (&self.username, &self.room) {
            (Some(u), Some(r)) => Ok((u.clone(), r.clone())),
            _ => bail!("join a room first: join <username> <room>"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Where to connect: env override or default.
    let addr = env::var("COLLAB_CLIENT_ADDR").unwrap_or_else(|_| "127.0.0.1:3301".to_string());

    println!("Connecting to {}...", addr);
    let stream = TcpStream::connect(&addr)
        .await
        .with_context(|| format!("connect to {}", addr))?;
    println!("Connected.");
    println!("Commands:");
    println!("  join <username> <room>");
    println!("  leave");
    println!("  edit <document text>");
    println!("  say <chat text>");
    println!("  typing | stop");
    println!("  cursor <line> <column>");
    println!("  run <output to relay>");
    println!("  ping");
    println!("Type 'quit' or 'exit' to leave.\n");

    let (read_half, mut write_half) = stream.into_split();

    // Print everything the server pushes, as it arrives.
    tokio::spawn(async move {
        let mut lines = BufReader::new(read_half).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => match decode_output(&line) {
                    Ok(msg) => println!("<< {}", describe(&msg)),
                    Err(e) => println!("<< (undecodable: {}) {}", e, line),
                },
                Ok(None) => {
                    println!("Server closed the connection.");
                    break;
                }
                Err(e) => {
                    eprintln!("Read error: {}", e);
                    break;
                }
            }
        }
    });

    let mut session = Session::default();
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = stdin.next_line().await? {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed.eq_ignore_ascii_case("quit") || trimmed.eq_ignore_ascii_case("exit") {
            println!("Exiting client.");
            break;
        }

        let msg = match parse_command(trimmed, &mut session) {
            Ok(msg) => msg,
            Err(e) => {
                eprintln!("{}", e);
                continue;
            }
        };

        let mut frame = encode_input(&msg)?;
        frame.push('\n');
        write_half.write_all(frame.as_bytes()).await?;
    }

    Ok(())
}

fn parse_command(line: &str, session: &mut Session) -> Result<InputMessage> {
    let (cmd, rest) = line.split_once(' ').unwrap_or((line, ""));
    let rest = rest.trim();

    let msg = match cmd {
        "join" => {
            let mut parts = rest.split_whitespace();
            let (Some(user), Some(room)) = (parts.next(), parts.next()) else {
                bail!("usage: join <username> <room>");
            };
            session.username = Some(user.to_string());
            session.room = Some(room.to_string());
            InputMessage::JoinRoom(RoomRequest::new(user, room))
        }
        "leave" => {
            let (user, room) = session.identity()?;
            session.room = None;
            InputMessage::LeaveRoom(RoomRequest::new(user, room))
        }
        "edit" => {
            let (_, room) = session.identity()?;
            InputMessage::ContentUpdate(ContentUpdate {
                room_id: room,
                content: rest.replace("\\n", "\n"),
                timestamp: Some(now_millis()),
            })
        }
        "say" => {
            let (user, room) = session.identity()?;
            InputMessage::ChatPost(ChatPost {
                room_id: room,
                username: user,
                text: rest.to_string(),
            })
        }
        "typing" => {
            let (user, room) = session.identity()?;
            InputMessage::TypingStart(RoomRequest::new(user, room))
        }
        "stop" => {
            let (user, room) = session.identity()?;
            InputMessage::TypingStop(RoomRequest::new(user, room))
        }
        "cursor" => {
            let (user, room) = session.identity()?;
            let mut parts = rest.split_whitespace().map(str::parse::<u32>);
            let (Some(Ok(line)), Some(Ok(column))) = (parts.next(), parts.next()) else {
                bail!("usage: cursor <line> <column>");
            };
            InputMessage::CursorUpdate(CursorUpdate {
                room_id: room,
                username: user,
                position: CursorPosition::new(line, column),
            })
        }
        "run" => {
            let (_, room) = session.identity()?;
            InputMessage::RunCode(RunCode {
                room_id: room,
                content: rest.replace("\\n", "\n"),
            })
        }
        "ping" => InputMessage::Ping,
        other => bail!("unknown command: {}", other),
    };

    Ok(msg)
}

/// Client-side send time for latency probing.
fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

fn describe(msg: &OutputMessage) -> String {
    match msg {
        OutputMessage::MemberJoined(c) => format!(
            "{} joined; members: {}",
            c.username,
            c.members.iter().map(|m| m.username.as_str()).collect::<Vec<_>>().join(", ")
        ),
        OutputMessage::MemberLeft(c) => format!(
            "{} left; members: {}",
            c.username,
            c.members.iter().map(|m| m.username.as_str()).collect::<Vec<_>>().join(", ")
        ),
        OutputMessage::DocumentSync { content } => format!("document:\n{}", content),
        OutputMessage::DocumentBroadcast { content, .. } => format!("document updated:\n{}", content),
        OutputMessage::TypingStarted { username } => format!("{} is typing...", username),
        OutputMessage::TypingStopped { username } => format!("{} stopped typing", username),
        OutputMessage::CursorMoved { username, position } => {
            format!("{} cursor at {}:{}", username, position.line, position.column)
        }
        OutputMessage::ChatMessage(m) => format!("[{}] {}: {}", m.room_id, m.username, m.text),
        OutputMessage::CodeExecuted { content, .. } => format!("run output:\n{}", content),
        OutputMessage::Pong { time } => format!("pong ({})", time),
        OutputMessage::ValidationError { reason } => format!("error: {}", reason),
    }
}
