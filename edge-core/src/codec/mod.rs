//! `tokio_util` codec for the streaming protocol.
//!
//! The encoder side is used by tests and tools that want a `Framed`
//! sink; the sender's hot path writes header and payload directly (see
//! [`crate::network::StreamClient`]). The decoder is what the receiver
//! runs. With tagged framing it recovers from a corrupted stream by
//! scanning forward to the next `0xED 0x9E` pair.

use bytes::{Buf, BufMut, BytesMut};
use tracing::{info, warn};

use crate::error::EdgeError;
use crate::header::{MAGIC_0, MAGIC_1, MAX_HEADER_LEN, MessageHeader};
use crate::message::{Framing, MessageType};
use crate::packet::{DIMENSIONS_PAYLOAD_LEN, MAX_PAYLOAD_SIZE, Message};

/// Length-framed codec for one connection's framing.
#[derive(Debug, Default)]
pub struct StreamCodec {
    framing: Framing,
    /// Bytes discarded since the last good header.
    skipped: usize,
}

impl StreamCodec {
    pub fn new(framing: Framing) -> Self {
        Self { framing, skipped: 0 }
    }

    pub fn framing(&self) -> Framing {
        self.framing
    }

    /// Drop bytes until `src` starts with the magic pair.
    ///
    /// Returns `Ok(false)` when more input is needed. A trailing
    /// `MAGIC_0` is kept since its partner may still be in flight.
    fn seek_magic(&mut self, src: &mut BytesMut) -> Result<bool, EdgeError> {
        let found = src
            .windows(2)
            .position(|w| w[0] == MAGIC_0 && w[1] == MAGIC_1);
        let skip = match found {
            Some(at) => at,
            None if src.last() == Some(&MAGIC_0) => src.len() - 1,
            None => src.len(),
        };

        if skip > 0 {
            if self.skipped == 0 {
                warn!("invalid magic, scanning for next message boundary");
            }
            src.advance(skip);
            self.skipped += skip;
            if self.skipped > MAX_PAYLOAD_SIZE {
                return Err(EdgeError::Desync(self.skipped));
            }
        }

        if found.is_none() {
            return Ok(false);
        }
        if self.skipped > 0 {
            info!(skipped = self.skipped, "stream resynchronised");
            self.skipped = 0;
        }
        Ok(true)
    }
}

impl tokio_util::codec::Decoder for StreamCodec {
    type Item = Message;
    type Error = EdgeError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.framing == Framing::Tagged && !self.seek_magic(src)? {
            return Ok(None);
        }

        let header_len = self.framing.header_len();
        if src.len() < header_len {
            return Ok(None);
        }

        let header = MessageHeader::parse(&src[..header_len], self.framing)?;
        let payload_len = header.payload_length() as usize;

        if payload_len > MAX_PAYLOAD_SIZE {
            return Err(EdgeError::PayloadTooLarge {
                size: payload_len,
                max: MAX_PAYLOAD_SIZE,
            });
        }
        if header.kind() == MessageType::Dimensions && payload_len != DIMENSIONS_PAYLOAD_LEN {
            return Err(EdgeError::InvalidPayloadLength {
                kind: "dimensions",
                expected: DIMENSIONS_PAYLOAD_LEN,
                actual: payload_len,
            });
        }

        let total = header.message_len();
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        src.advance(header_len);
        let payload = src.split_to(payload_len).freeze();
        Message::new(self.framing, header.kind(), payload).map(Some)
    }
}

impl tokio_util::codec::Encoder<Message> for StreamCodec {
    type Error = EdgeError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if item.framing() != self.framing {
            return Err(EdgeError::ProtocolViolation(
                "message framing does not match the connection",
            ));
        }
        let mut header = [0u8; MAX_HEADER_LEN];
        let header_len = item.header().write_to(&mut header);
        dst.reserve(header_len + item.payload().len());
        dst.put_slice(&header[..header_len]);
        dst.put_slice(item.payload());
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────
