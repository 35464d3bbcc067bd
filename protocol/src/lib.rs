//! # Relay Protocol
//!
//! Wire vocabulary shared by the relay server and its clients. The protocol is
//! line-oriented UTF-8 text: every server-originated message is terminated
//! with `\n`, and clients send commands as plain text lines.
//!
//! ## Module Organization
//!
//! ### Decoder Module (`decoder`)
//! Turns `SAVE:` and `POSITION:` payloads into typed values, trying each
//! supported encoding in a fixed priority order.
//!
//! ### Framing Module (`framing`)
//! Frame encoding for outgoing messages and the newline framer used to split
//! an incoming byte stream into messages.
//!
//! ### Message Module (`message`)
//! Classification of incoming text into commands, and the typed set of
//! messages the server emits.

pub mod decoder;
pub mod framing;
pub mod message;

use serde::{Deserialize, Serialize};

pub use decoder::{decode_position, decode_save};
pub use framing::{encode_frame, FrameTooLong, LineFramer};
pub use message::{Command, ServerMessage};

/// Default TCP port the relay listens on
pub const DEFAULT_PORT: u16 = 5000;

/// Session identifiers are assigned from a process-wide counter starting at 0
pub type SessionId = u64;

/// Player progression carried by a `SAVE:` command
///
/// The serde names are the field names of the structured (JSON) encoding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SavePayload {
    #[serde(rename = "Lv")]
    pub level: i32,
    #[serde(rename = "Exp")]
    pub experience: i32,
    #[serde(rename = "WeaponName")]
    pub weapon_name: Option<String>,
    #[serde(rename = "WeaponUpgrade")]
    pub weapon_upgrade: i32,
}

impl SavePayload {
    /// True if at least one field differs from its default.
    ///
    /// A payload without any data is rejected by the decoder even when the
    /// text itself parsed cleanly.
    pub fn has_data(&self) -> bool {
        self.level != 0
            || self.experience != 0
            || self.weapon_name.is_some()
            || self.weapon_upgrade != 0
    }
}

/// Position carried by a `POSITION:` command
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PositionPayload {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl PositionPayload {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_save_has_no_data() {
        assert!(!SavePayload::default().has_data());
    }

    #[test]
    fn test_save_with_any_field_has_data() {
        let level = SavePayload {
            level: 1,
            ..Default::default()
        };
        let weapon = SavePayload {
            weapon_name: Some(String::new()),
            ..Default::default()
        };
        let upgrade = SavePayload {
            weapon_upgrade: -1,
            ..Default::default()
        };

        assert!(level.has_data());
        assert!(weapon.has_data());
        assert!(upgrade.has_data());
    }

    #[test]
    fn test_position_new() {
        let position = PositionPayload::new(1, -2, 3);
        assert_eq!(position.x, 1);
        assert_eq!(position.y, -2);
        assert_eq!(position.z, 3);
        assert_eq!(PositionPayload::default(), PositionPayload::new(0, 0, 0));
    }
}
