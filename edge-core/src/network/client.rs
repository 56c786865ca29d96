//! Single-connection stream client.
//!
//! Every message is written as its header followed by its payload, each
//! with `write_all` so short writes are retried until done. The first
//! write error closes the socket; the client never reconnects on its
//! own and every later send fails with [`EdgeError::NotConnected`]
//! without touching the network.

use std::fmt;
use std::io;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::error::EdgeError;
use crate::header::{MAX_HEADER_LEN, MessageHeader};
use crate::message::{Framing, MessageType};
use crate::packet::{DIMENSIONS_PAYLOAD_LEN, MAX_PAYLOAD_SIZE, Message};

// ── Endpoint ─────────────────────────────────────────────────────

/// Host and port of the receiving side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

// ── ConnectionState ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

// ── StreamClient ─────────────────────────────────────────────────

/// Writer half of one streaming connection.
///
/// Generic over the writer so tests can substitute an in-memory mock;
/// production code uses the `TcpStream` default.
pub struct StreamClient<W = TcpStream> {
    writer: Option<W>,
    framing: Framing,
    endpoint: Option<Endpoint>,
}

impl StreamClient<TcpStream> {
    /// Resolve `host` and connect to the first address that accepts.
    ///
    /// `TCP_NODELAY` is enabled so small access units leave immediately.
    pub async fn connect(host: &str, port: u16, framing: Framing) -> Result<Self, EdgeError> {
        let endpoint = Endpoint::new(host, port);
        let addrs: Vec<_> = tokio::net::lookup_host((host, port))
            .await
            .map_err(|e| EdgeError::Resolve(format!("{endpoint}: {e}")))?
            .collect();
        if addrs.is_empty() {
            return Err(EdgeError::Resolve(endpoint.to_string()));
        }

        let mut last_err = None;
        for addr in addrs {
            match TcpStream::connect(addr).await {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    info!(%endpoint, %addr, %framing, "stream connected");
                    let mut client = Self::with_writer(stream, framing);
                    client.endpoint = Some(endpoint);
                    return Ok(client);
                }
                Err(e) => {
                    debug!(%addr, error = %e, "connect attempt failed");
                    last_err = Some(e);
                }
            }
        }

        Err(last_err
            .map(EdgeError::Connection)
            .unwrap_or_else(|| EdgeError::Resolve(endpoint.to_string())))
    }
}

impl<W> StreamClient<W>
where
    W: AsyncWrite + Unpin,
{
    /// Wrap an already-open writer.
    pub fn with_writer(writer: W, framing: Framing) -> Self {
        Self {
            writer: Some(writer),
            framing,
            endpoint: None,
        }
    }

    pub fn framing(&self) -> Framing {
        self.framing
    }

    pub fn endpoint(&self) -> Option<&Endpoint> {
        self.endpoint.as_ref()
    }

    pub fn state(&self) -> ConnectionState {
        if self.writer.is_some() {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    pub fn is_connected(&self) -> bool {
        self.writer.is_some()
    }

    /// Drop the socket. Idempotent.
    pub fn close(&mut self) {
        if self.writer.take().is_some() {
            info!(endpoint = ?self.endpoint, "stream closed");
        }
    }

    /// Send the `(width, height)` handshake.
    pub async fn send_dimensions(&mut self, width: i32, height: i32) -> Result<usize, EdgeError> {
        let mut payload = [0u8; DIMENSIONS_PAYLOAD_LEN];
        payload[0..4].copy_from_slice(&width.to_le_bytes());
        payload[4..8].copy_from_slice(&height.to_le_bytes());
        self.send(MessageType::Dimensions, &payload).await
    }

    /// Send codec parameter sets.
    pub async fn send_config(&mut self, data: &[u8]) -> Result<usize, EdgeError> {
        self.send(MessageType::Config, data).await
    }

    /// Send one compressed access unit.
    pub async fn send_frame(&mut self, data: &[u8]) -> Result<usize, EdgeError> {
        self.send(MessageType::Frame, data).await
    }

    /// Send one JPEG picture (bare framing).
    pub async fn send_image(&mut self, data: &[u8]) -> Result<usize, EdgeError> {
        self.send(MessageType::Image, data).await
    }

    /// Send a prebuilt message. Its framing must match the connection.
    pub async fn send_message(&mut self, msg: &Message) -> Result<usize, EdgeError> {
        if msg.framing() != self.framing {
            return Err(EdgeError::ProtocolViolation(
                "message framing does not match the connection",
            ));
        }
        self.send(msg.kind(), msg.payload()).await
    }

    /// Write one message and return the number of bytes put on the wire.
    async fn send(&mut self, kind: MessageType, payload: &[u8]) -> Result<usize, EdgeError> {
        let Some(writer) = self.writer.as_mut() else {
            return Err(EdgeError::NotConnected);
        };
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(EdgeError::PayloadTooLarge {
                size: payload.len(),
                max: MAX_PAYLOAD_SIZE,
            });
        }

        let header = MessageHeader::new(self.framing, kind, payload.len() as u32)?;
        let mut head = [0u8; MAX_HEADER_LEN];
        let head_len = header.write_to(&mut head);

        let written: io::Result<()> = async {
            writer.write_all(&head[..head_len]).await?;
            writer.write_all(payload).await?;
            Ok(())
        }
        .await;

        match written {
            Ok(()) => Ok(head_len + payload.len()),
            Err(e) => {
                warn!(%kind, error = %e, "send failed, closing stream");
                self.writer = None;
                Err(EdgeError::Connection(e))
            }
        }
    }
}

impl<W> fmt::Debug for StreamClient<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamClient")
            .field("connected", &self.writer.is_some())
            .field("framing", &self.framing)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

// ── Tests ────────────────────────────────────────────────────────
