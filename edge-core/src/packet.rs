use std::fmt::Debug;

use bytes::Bytes;

use crate::error::EdgeError;
use crate::header::MessageHeader;
use crate::message::{Framing, MessageType};

/// Largest payload either side accepts (10 MiB).
pub const MAX_PAYLOAD_SIZE: usize = 10 * 1024 * 1024;

/// Payload size of a dimensions message.
pub const DIMENSIONS_PAYLOAD_LEN: usize = 8;

/// One protocol message: header plus payload.
#[derive(Clone, PartialEq, Eq)]
pub struct Message {
    header: MessageHeader,
    payload: Bytes,
}

impl Message {
    /// Generic constructor used by the typed helpers and the decoder.
    pub fn new(framing: Framing, kind: MessageType, payload: Bytes) -> Result<Self, EdgeError> {
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(EdgeError::PayloadTooLarge {
                size: payload.len(),
                max: MAX_PAYLOAD_SIZE,
            });
        }
        if kind == MessageType::Dimensions && payload.len() != DIMENSIONS_PAYLOAD_LEN {
            return Err(EdgeError::InvalidPayloadLength {
                kind: "dimensions",
                expected: DIMENSIONS_PAYLOAD_LEN,
                actual: payload.len(),
            });
        }
        let header = MessageHeader::new(framing, kind, payload.len() as u32)?;
        Ok(Self { header, payload })
    }

    /// Frame size handshake, `width` then `height` as little-endian `i32`.
    pub fn dimensions(framing: Framing, width: i32, height: i32) -> Self {
        let mut payload = [0u8; DIMENSIONS_PAYLOAD_LEN];
        payload[0..4].copy_from_slice(&width.to_le_bytes());
        payload[4..8].copy_from_slice(&height.to_le_bytes());
        Self {
            header: MessageHeader::dimensions(framing),
            payload: Bytes::copy_from_slice(&payload),
        }
    }

    /// Codec parameter sets (SPS/PPS).
    pub fn config(payload: Bytes) -> Result<Self, EdgeError> {
        Self::new(Framing::Tagged, MessageType::Config, payload)
    }

    /// One compressed access unit.
    pub fn frame(payload: Bytes) -> Result<Self, EdgeError> {
        Self::new(Framing::Tagged, MessageType::Frame, payload)
    }

    /// One JPEG picture for the raw-image mode.
    pub fn image(payload: Bytes) -> Result<Self, EdgeError> {
        Self::new(Framing::Bare, MessageType::Image, payload)
    }

    pub fn header(&self) -> &MessageHeader {
        &self.header
    }

    pub fn kind(&self) -> MessageType {
        self.header.kind()
    }

    pub fn framing(&self) -> Framing {
        self.header.framing()
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    /// Decode the `(width, height)` pair of a dimensions message.
    pub fn as_dimensions(&self) -> Option<(i32, i32)> {
        if self.kind() != MessageType::Dimensions || self.payload.len() != DIMENSIONS_PAYLOAD_LEN {
            return None;
        }
        let mut w = [0u8; 4];
        let mut h = [0u8; 4];
        w.copy_from_slice(&self.payload[0..4]);
        h.copy_from_slice(&self.payload[4..8]);
        Some((i32::from_le_bytes(w), i32::from_le_bytes(h)))
    }

    /// Header followed by payload in one contiguous buffer.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = self.header.to_bytes();
        out.extend_from_slice(&self.payload);
        out
    }
}

impl Debug for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Message")
            .field("header", &self.header)
            .field("payload_len", &self.payload.len())
            .finish()
    }
}
