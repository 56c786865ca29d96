//! JPEG compression for the bare-framed image mode.

use bytes::Bytes;
use jpeg_encoder::{ColorType, Encoder};

use crate::error::EdgeError;
use crate::pipeline::types::{FrameImage, PixelFormat};

pub const DEFAULT_QUALITY: u8 = 80;

#[derive(Debug, Clone, Copy)]
pub struct JpegEncoder {
    quality: u8,
}

impl JpegEncoder {
    /// `quality` is clamped to 1..=100.
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    pub fn encode(&self, frame: &FrameImage) -> Result<Bytes, EdgeError> {
        let (Ok(width), Ok(height)) = (u16::try_from(frame.width()), u16::try_from(frame.height()))
        else {
            return Err(EdgeError::Jpeg(format!(
                "{}x{} exceeds the JPEG size limit",
                frame.width(),
                frame.height()
            )));
        };
        let color = match frame.format() {
            // The padding byte is ignored like an alpha channel.
            PixelFormat::Rgba8888 | PixelFormat::Rgbx8888 => ColorType::Rgba,
            PixelFormat::Bgra8888 => ColorType::Bgra,
        };

        let mut out = Vec::with_capacity(frame.data().len() / 8);
        Encoder::new(&mut out, self.quality).encode(frame.data(), width, height, color)?;
        Ok(Bytes::from(out))
    }
}

impl Default for JpegEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_QUALITY)
    }
}
