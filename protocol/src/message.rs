//! Incoming command classification and outgoing server messages

use crate::framing::encode_frame;
use crate::SessionId;
use std::fmt;

/// Marker for a persisted player-state save
pub const SAVE_PREFIX: &str = "SAVE:";
/// Marker for a position update
pub const POSITION_PREFIX: &str = "POSITION:";

/// What a client message asks the server to do
///
/// Markers are matched case-insensitively anywhere in the message, with
/// `SAVE:` taking priority over `POSITION:`. The payload is the message with
/// the marker's length worth of leading characters removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command<'a> {
    Save { payload: &'a str },
    Position { payload: &'a str },
    Relay { text: &'a str },
}

impl<'a> Command<'a> {
    pub fn parse(message: &'a str) -> Self {
        let upper = message.to_uppercase();

        if upper.contains(SAVE_PREFIX) {
            Command::Save {
                payload: strip_chars(message, SAVE_PREFIX.len()).trim(),
            }
        } else if upper.contains(POSITION_PREFIX) {
            Command::Position {
                payload: strip_chars(message, POSITION_PREFIX.len()).trim(),
            }
        } else {
            Command::Relay { text: message }
        }
    }
}

// Character positions, not bytes, so multibyte text never splits mid-char
fn strip_chars(text: &str, count: usize) -> &str {
    match text.char_indices().nth(count) {
        Some((index, _)) => &text[index..],
        None => "",
    }
}

/// Every message the server sends
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// Sent once to a new session: `<id>:ID:<id>`
    Assigned(SessionId),
    /// Announces a new session to the others: `<id>:ENTER`
    Entered(SessionId),
    /// Announces a departed session: `<id>:EXIT`
    Exited(SessionId),
    /// Relayed position: `<id>:POSITION:<x>,<y>,<z>`
    Position {
        from: SessionId,
        x: i32,
        y: i32,
        z: i32,
    },
    /// Relayed generic text: `<id>:<text>`
    Relay { from: SessionId, text: String },
    SaveOk,
    SaveFail,
    SaveParseError,
    PositionOk,
    PositionParseError,
}

impl ServerMessage {
    /// Renders the message with its trailing frame delimiter
    pub fn frame(&self) -> String {
        encode_frame(&self.to_string())
    }
}

impl fmt::Display for ServerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerMessage::Assigned(id) => write!(f, "{id}:ID:{id}"),
            ServerMessage::Entered(id) => write!(f, "{id}:ENTER"),
            ServerMessage::Exited(id) => write!(f, "{id}:EXIT"),
            ServerMessage::Position { from, x, y, z } => {
                write!(f, "{from}:POSITION:{x},{y},{z}")
            }
            ServerMessage::Relay { from, text } => write!(f, "{from}:{text}"),
            ServerMessage::SaveOk => f.write_str("SERVER:SAVE:OK"),
            ServerMessage::SaveFail => f.write_str("SERVER:SAVE:FAIL"),
            ServerMessage::SaveParseError => f.write_str("SERVER:SAVE:PARSE_ERROR"),
            ServerMessage::PositionOk => f.write_str("SERVER:POSITION:OK"),
            ServerMessage::PositionParseError => f.write_str("SERVER:POSITION:PARSE_ERROR"),
        }
    }
}
