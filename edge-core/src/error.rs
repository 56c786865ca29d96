//! Domain-specific error types for the edge streaming core.
//!
//! All fallible operations return `Result<T, EdgeError>`.
//! Transient conditions (no frame ready, no free encoder slot) are not
//! errors at all; they are absorbed where they happen.

use thiserror::Error;

/// The canonical error type for the edge streaming core.
#[derive(Debug, Error)]
pub enum EdgeError {
    // ── Protocol Errors ──────────────────────────────────────────
    /// Received bytes that do not start with the `0xED 0x9E` magic pair.
    #[error("invalid magic bytes: expected 0xED 0x9E")]
    InvalidMagic,

    /// A numeric value did not map to any known enum variant.
    #[error("unknown {type_name} discriminant: {value:#x}")]
    UnknownVariant { type_name: &'static str, value: u64 },

    /// A message violated protocol rules.
    #[error("protocol violation: {0}")]
    ProtocolViolation(&'static str),

    /// The payload exceeds the protocol maximum.
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// A fixed-size payload arrived with the wrong length.
    #[error("invalid {kind} payload length: expected {expected}, got {actual}")]
    InvalidPayloadLength {
        kind: &'static str,
        expected: usize,
        actual: usize,
    },

    /// The decoder skipped too many bytes looking for a message boundary.
    #[error("lost stream synchronisation after skipping {0} bytes")]
    Desync(usize),

    // ── Connection Errors ────────────────────────────────────────
    /// The TCP/IO layer reported an error.
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    /// The stream client has no open socket.
    #[error("not connected")]
    NotConnected,

    /// Host name resolution produced no usable address.
    #[error("could not resolve {0}")]
    Resolve(String),

    // ── Encoder Errors ───────────────────────────────────────────
    /// The hardware encoder session could not be brought up.
    #[error("encoder {stage} failed: {reason}")]
    EncoderInit { stage: &'static str, reason: String },

    /// A codec device call failed after the session was running.
    #[error("codec device error: {0}")]
    Device(String),

    /// JPEG compression of a frame failed.
    #[error("jpeg encoding failed: {0}")]
    Jpeg(String),

    // ── Pipeline Errors ──────────────────────────────────────────
    /// The display surface could not be locked (usually destroyed).
    #[error("display surface lost: {0}")]
    SurfaceLost(String),

    /// No capture source has been wired up yet.
    #[error("capture source unavailable")]
    CaptureUnavailable,

    /// The operation requires the frame loop to be stopped and joined.
    #[error("frame loop is running")]
    PipelineRunning,

    /// The frame loop worker panicked or was aborted.
    #[error("frame loop worker failed: {0}")]
    Worker(String),

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

// ── Convenient From implementations ──────────────────────────────

impl From<String> for EdgeError {
    fn from(s: String) -> Self {
        EdgeError::Other(s)
    }
}

impl From<&str> for EdgeError {
    fn from(s: &str) -> Self {
        EdgeError::Other(s.to_string())
    }
}

impl From<jpeg_encoder::EncodingError> for EdgeError {
    fn from(e: jpeg_encoder::EncodingError) -> Self {
        EdgeError::Jpeg(e.to_string())
    }
}

impl From<tokio::task::JoinError> for EdgeError {
    fn from(e: tokio::task::JoinError) -> Self {
        EdgeError::Worker(e.to_string())
    }
}
