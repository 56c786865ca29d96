//! # edge-core
//!
//! Camera capture, preview and H.264 streaming core.
//!
//! This crate contains:
//! - **Protocol types**: `MessageHeader`, `Message`, `MessageType`, `Framing`
//! - **Codec**: `StreamCodec` for framed TCP I/O via `tokio_util`
//! - **Network**: `StreamClient`, the single-connection sender
//! - **Pipeline**: `PipelineController` and its capture, display and
//!   encoder stages
//! - **Error**: `EdgeError`, a `thiserror`-based error hierarchy

pub mod codec;
pub mod error;
pub mod flags;
pub mod header;
pub mod message;
pub mod network;
pub mod packet;
pub mod pipeline;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use codec::StreamCodec;
pub use error::EdgeError;
pub use flags::BufferFlags;
pub use header::{MAGIC_0, MAGIC_1, MAX_HEADER_LEN, MessageHeader};
pub use message::{Framing, MessageType};
pub use network::{ConnectionState, Endpoint, StreamClient};
pub use packet::{DIMENSIONS_PAYLOAD_LEN, MAX_PAYLOAD_SIZE, Message};

pub use pipeline::{
    CameraFacing, FrameImage, LoopExit, PipelineConfig, PipelineController, PipelineStats,
    Resolution, StreamMode, VideoEncoder,
};
