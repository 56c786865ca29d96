//! Message kinds and framing variants of the streaming protocol.
//!
//! Unknown wire ids are reported as errors, never panics. The same wire
//! id means different things under the two framings (`2` is an H.264
//! frame when tagged, a JPEG image when bare), so decoding a type byte
//! always needs the connection's [`Framing`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::EdgeError;

// ── Framing ──────────────────────────────────────────────────────

/// Header layout used on one connection. Never mixed on a single socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Framing {
    /// `[0xED][0x9E][type:1][length:4 LE]`, carries H.264.
    #[default]
    Tagged,
    /// `[type:1][length:4 LE]`, raw image transfer (JPEG).
    Bare,
}

impl Framing {
    /// Header size in bytes for this framing.
    pub const fn header_len(self) -> usize {
        match self {
            Framing::Tagged => 7,
            Framing::Bare => 5,
        }
    }
}

impl fmt::Display for Framing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Framing::Tagged => write!(f, "tagged"),
            Framing::Bare => write!(f, "bare"),
        }
    }
}

// ── MessageType ──────────────────────────────────────────────────

/// Kind of payload carried by one protocol message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// 8-byte payload: width and height as little-endian `i32`.
    Dimensions,
    /// One Annex-B H.264 access unit (tagged framing only).
    Frame,
    /// Annex-B SPS/PPS parameter sets (tagged framing only).
    Config,
    /// One JPEG-encoded picture (bare framing only).
    Image,
}

impl MessageType {
    /// Wire id written into the header's type byte.
    pub const fn wire_id(self) -> u8 {
        match self {
            MessageType::Dimensions => 1,
            MessageType::Frame | MessageType::Image => 2,
            MessageType::Config => 3,
        }
    }

    /// Resolve a wire id under the given framing.
    pub fn from_wire(id: u8, framing: Framing) -> Result<Self, EdgeError> {
        match (framing, id) {
            (_, 1) => Ok(MessageType::Dimensions),
            (Framing::Tagged, 2) => Ok(MessageType::Frame),
            (Framing::Tagged, 3) => Ok(MessageType::Config),
            (Framing::Bare, 2) => Ok(MessageType::Image),
            _ => Err(EdgeError::UnknownVariant {
                type_name: "MessageType",
                value: id as u64,
            }),
        }
    }

    /// Whether this kind may be sent under `framing`.
    pub const fn allowed_in(self, framing: Framing) -> bool {
        match (self, framing) {
            (MessageType::Dimensions, _) => true,
            (MessageType::Frame | MessageType::Config, Framing::Tagged) => true,
            (MessageType::Image, Framing::Bare) => true,
            _ => false,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageType::Dimensions => write!(f, "dimensions"),
            MessageType::Frame => write!(f, "h264-frame"),
            MessageType::Config => write!(f, "h264-config"),
            MessageType::Image => write!(f, "image"),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_ids_resolve_per_framing() {
        assert_eq!(
            MessageType::from_wire(2, Framing::Tagged).unwrap(),
            MessageType::Frame
        );
        assert_eq!(
            MessageType::from_wire(2, Framing::Bare).unwrap(),
            MessageType::Image
        );
        assert_eq!(
            MessageType::from_wire(3, Framing::Tagged).unwrap(),
            MessageType::Config
        );
    }

    #[test]
    fn config_is_unknown_without_magic() {
        let err = MessageType::from_wire(3, Framing::Bare).unwrap_err();
        assert!(matches!(
            err,
            EdgeError::UnknownVariant { value: 3, .. }
        ));
    }

    #[test]
    fn zero_and_high_ids_are_rejected() {
        assert!(MessageType::from_wire(0, Framing::Tagged).is_err());
        assert!(MessageType::from_wire(0xFF, Framing::Bare).is_err());
    }

    #[test]
    fn kinds_are_bound_to_their_framing() {
        assert!(MessageType::Dimensions.allowed_in(Framing::Bare));
        assert!(MessageType::Config.allowed_in(Framing::Tagged));
        assert!(!MessageType::Config.allowed_in(Framing::Bare));
        assert!(!MessageType::Image.allowed_in(Framing::Tagged));
    }
}
