//! Shared frame and geometry types used between pipeline stages.
//!
//! These are in-process representations only; nothing here goes on the
//! wire as-is (see [`crate::packet::Message`] for that).

use std::fmt;

use serde::{Deserialize, Serialize};

// ── PixelFormat ──────────────────────────────────────────────────

/// Pixel layout of a display buffer or copied frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// Red, Green, Blue, Alpha.
    Rgba8888,
    /// Red, Green, Blue, unused byte.
    Rgbx8888,
    /// Blue, Green, Red, Alpha.
    Bgra8888,
}

impl PixelFormat {
    pub const fn bytes_per_pixel(self) -> usize {
        4
    }

    /// Byte offsets of the red, green and blue channels inside a pixel.
    pub const fn rgb_offsets(self) -> (usize, usize, usize) {
        match self {
            PixelFormat::Rgba8888 | PixelFormat::Rgbx8888 => (0, 1, 2),
            PixelFormat::Bgra8888 => (2, 1, 0),
        }
    }
}

// ── Resolution ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Encode size for this capture size.
    ///
    /// Widths above `max_width` are scaled down to `max_width` keeping the
    /// aspect ratio; both sides are then rounded down to even values as
    /// required by 4:2:0 chroma subsampling.
    pub fn capped_even(self, max_width: u32) -> Self {
        let (w, h) = if self.width > max_width && max_width > 0 {
            let h = self.height as u64 * max_width as u64 / self.width as u64;
            (max_width, h as u32)
        } else {
            (self.width, self.height)
        };
        Self::new(w & !1, h & !1)
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

// ── CameraFacing ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraFacing {
    #[default]
    Back,
    Front,
}

impl CameraFacing {
    pub const fn toggled(self) -> Self {
        match self {
            CameraFacing::Back => CameraFacing::Front,
            CameraFacing::Front => CameraFacing::Back,
        }
    }
}

// ── FrameImage ───────────────────────────────────────────────────

/// Tightly packed deep copy of a display buffer.
///
/// Taken while the surface is still locked so it stays valid after the
/// surface has been posted.
#[derive(Clone, PartialEq, Eq)]
pub struct FrameImage {
    width: u32,
    height: u32,
    format: PixelFormat,
    data: Vec<u8>,
}

impl FrameImage {
    /// Copy `height` rows of `stride` bytes out of `src`, dropping any row
    /// padding. Rows missing from a short `src` are left zeroed.
    pub fn copy_from(width: u32, height: u32, stride: usize, format: PixelFormat, src: &[u8]) -> Self {
        let row_len = width as usize * format.bytes_per_pixel();
        let mut data = vec![0u8; row_len * height as usize];
        for (y, dst) in data.chunks_exact_mut(row_len.max(1)).enumerate() {
            let start = y * stride;
            if let Some(row) = src.get(start..start + row_len) {
                dst.copy_from_slice(row);
            }
        }
        Self {
            width,
            height,
            format,
            data,
        }
    }

    /// Wrap already packed pixel data.
    pub fn from_packed(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> Option<Self> {
        let expected = width as usize * height as usize * format.bytes_per_pixel();
        (data.len() == expected).then_some(Self {
            width,
            height,
            format,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn stride(&self) -> usize {
        self.width as usize * self.format.bytes_per_pixel()
    }

    /// `(r, g, b)` at `(x, y)`.
    ///
    /// # Panics
    ///
    /// Panics if `(x, y)` is out of bounds.
    pub fn rgb(&self, x: u32, y: u32) -> (u8, u8, u8) {
        let bpp = self.format.bytes_per_pixel();
        let at = y as usize * self.stride() + x as usize * bpp;
        let (r, g, b) = self.format.rgb_offsets();
        (self.data[at + r], self.data[at + g], self.data[at + b])
    }
}

impl fmt::Debug for FrameImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("bytes", &self.data.len())
            .finish()
    }
}

// ── Tests ────────────────────────────────────────────────────────
