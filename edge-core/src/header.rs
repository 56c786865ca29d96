//! Fixed binary header that precedes every protocol message.
//!
//! ```text
//! tagged: [0xED][0x9E][type:1][length:4 LE]   (7 bytes)
//! bare:              [type:1][length:4 LE]   (5 bytes)
//! ```
//!
//! The header is the only message boundary on the wire; TCP adds none.

use crate::error::EdgeError;
use crate::message::{Framing, MessageType};

/// First magic byte of a tagged header.
pub const MAGIC_0: u8 = 0xED;
/// Second magic byte of a tagged header.
pub const MAGIC_1: u8 = 0x9E;
/// Largest header on the wire (tagged framing).
pub const MAX_HEADER_LEN: usize = 7;

/// Parsed message header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    framing: Framing,
    kind: MessageType,
    payload_length: u32,
}

impl MessageHeader {
    /// Build a header, refusing kinds that the framing cannot carry.
    pub fn new(framing: Framing, kind: MessageType, payload_length: u32) -> Result<Self, EdgeError> {
        if !kind.allowed_in(framing) {
            return Err(EdgeError::ProtocolViolation(
                "message kind not carried by this framing",
            ));
        }
        Ok(Self {
            framing,
            kind,
            payload_length,
        })
    }

    /// Header of a dimensions message, valid under every framing.
    pub const fn dimensions(framing: Framing) -> Self {
        Self {
            framing,
            kind: MessageType::Dimensions,
            payload_length: 8,
        }
    }

    /// Serialize into `out`, returning the number of bytes used.
    pub fn write_to(&self, out: &mut [u8; MAX_HEADER_LEN]) -> usize {
        let mut at = 0;
        if self.framing == Framing::Tagged {
            out[0] = MAGIC_0;
            out[1] = MAGIC_1;
            at = 2;
        }
        out[at] = self.kind.wire_id();
        out[at + 1..at + 5].copy_from_slice(&self.payload_length.to_le_bytes());
        at + 5
    }

    /// Serialize to an owned byte vector.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = [0u8; MAX_HEADER_LEN];
        let len = self.write_to(&mut buf);
        buf[..len].to_vec()
    }

    /// Parse a header from the start of `bytes`.
    ///
    /// `bytes` must hold at least [`Framing::header_len`] bytes.
    pub fn parse(bytes: &[u8], framing: Framing) -> Result<Self, EdgeError> {
        let need = framing.header_len();
        if bytes.len() < need {
            return Err(EdgeError::InvalidPayloadLength {
                kind: "header",
                expected: need,
                actual: bytes.len(),
            });
        }

        let at = match framing {
            Framing::Tagged => {
                if bytes[0] != MAGIC_0 || bytes[1] != MAGIC_1 {
                    return Err(EdgeError::InvalidMagic);
                }
                2
            }
            Framing::Bare => 0,
        };

        let kind = MessageType::from_wire(bytes[at], framing)?;
        let mut len = [0u8; 4];
        len.copy_from_slice(&bytes[at + 1..at + 5]);

        Ok(Self {
            framing,
            kind,
            payload_length: u32::from_le_bytes(len),
        })
    }

    pub fn framing(&self) -> Framing {
        self.framing
    }

    pub fn kind(&self) -> MessageType {
        self.kind
    }

    pub fn payload_length(&self) -> u32 {
        self.payload_length
    }

    /// Header length plus payload length.
    pub fn message_len(&self) -> usize {
        self.framing.header_len() + self.payload_length as usize
    }
}
