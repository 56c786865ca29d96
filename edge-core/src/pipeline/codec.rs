//! Hardware codec seam.
//!
//! Modelled on the buffer-queue style of platform video codecs: the
//! caller dequeues an input slot, fills it, queues it with a timestamp,
//! then polls finished output buffers and hands each one back.

use std::time::Duration;

use crate::error::EdgeError;
use crate::flags::BufferFlags;

/// MIME type of an H.264 encoder.
pub const MIME_AVC: &str = "video/avc";

/// Platform id of the semi-planar 4:2:0 (NV12) input layout.
pub const COLOR_FORMAT_NV12: i32 = 21;

/// Session parameters handed to [`CodecDevice::configure`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecFormat {
    pub mime: &'static str,
    pub width: u32,
    pub height: u32,
    pub bitrate: u32,
    pub frame_rate: u32,
    /// Seconds between IDR frames.
    pub i_frame_interval: u32,
    pub color_format: i32,
}

/// Metadata of one finished output buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputBufferInfo {
    pub index: usize,
    pub offset: usize,
    pub size: usize,
    pub pts_us: i64,
    pub flags: BufferFlags,
}

pub trait CodecDevice: Send {
    fn configure(&mut self, format: &CodecFormat) -> Result<(), EdgeError>;

    fn start(&mut self) -> Result<(), EdgeError>;

    /// Wait up to `timeout` for a free input slot.
    fn dequeue_input(&mut self, timeout: Duration) -> Option<usize>;

    fn input_buffer(&mut self, index: usize) -> Option<&mut [u8]>;

    fn queue_input(
        &mut self,
        index: usize,
        len: usize,
        pts_us: i64,
        flags: BufferFlags,
    ) -> Result<(), EdgeError>;

    /// Next finished output buffer, without waiting.
    fn dequeue_output(&mut self) -> Option<OutputBufferInfo>;

    fn output_buffer(&self, index: usize) -> Option<&[u8]>;

    fn release_output(&mut self, index: usize);

    fn stop(&mut self);
}

/// Creates codec devices by MIME type.
pub trait CodecFactory: Send + Sync {
    fn create_encoder(&self, mime: &str) -> Result<Box<dyn CodecDevice>, EdgeError>;
}
