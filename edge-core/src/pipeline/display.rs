//! Display surface seam and its lock guard.
//!
//! A surface is locked, written, then unlocked and posted. The pixel
//! memory is only valid while locked, so anything the streaming stage
//! needs is deep-copied through [`LockedSurface::copy_frame`] before
//! the guard is presented.

use crate::error::EdgeError;
use crate::pipeline::types::{FrameImage, PixelFormat, Resolution};

/// Geometry of a locked buffer. `stride` is in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceGeometry {
    pub width: u32,
    pub height: u32,
    pub stride: usize,
    pub format: PixelFormat,
}

impl SurfaceGeometry {
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }
}

/// Platform window or texture the preview is drawn into.
pub trait DisplaySurface: Send {
    /// Whether a buffer can be locked right now.
    fn is_ready(&self) -> bool;

    /// Current surface size.
    fn size(&self) -> Resolution;

    /// Lock the next buffer for writing.
    fn lock(&mut self) -> Result<SurfaceGeometry, EdgeError>;

    /// Pixel memory of the locked buffer.
    fn pixels(&self) -> &[u8];

    /// Mutable pixel memory of the locked buffer.
    fn pixels_mut(&mut self) -> &mut [u8];

    /// Unlock and hand the buffer to the compositor.
    fn unlock_and_post(&mut self);
}

/// Writable view of a locked buffer.
pub struct DisplayBuffer<'a> {
    pub geometry: SurfaceGeometry,
    pub pixels: &'a mut [u8],
}

/// A locked surface. Posts the buffer on drop if not presented first.
pub struct LockedSurface<'a> {
    surface: &'a mut dyn DisplaySurface,
    geometry: SurfaceGeometry,
    posted: bool,
}

impl<'a> LockedSurface<'a> {
    pub fn lock(surface: &'a mut dyn DisplaySurface) -> Result<Self, EdgeError> {
        let geometry = surface.lock()?;
        Ok(Self {
            surface,
            geometry,
            posted: false,
        })
    }

    pub fn geometry(&self) -> SurfaceGeometry {
        self.geometry
    }

    pub fn buffer(&mut self) -> DisplayBuffer<'_> {
        DisplayBuffer {
            geometry: self.geometry,
            pixels: self.surface.pixels_mut(),
        }
    }

    /// Deep copy of the locked pixels.
    pub fn copy_frame(&self) -> FrameImage {
        let g = self.geometry;
        FrameImage::copy_from(g.width, g.height, g.stride, g.format, self.surface.pixels())
    }

    /// Unlock and post now.
    pub fn present(mut self) {
        self.post();
    }

    fn post(&mut self) {
        if !self.posted {
            self.posted = true;
            self.surface.unlock_and_post();
        }
    }
}

impl Drop for LockedSurface<'_> {
    fn drop(&mut self) {
        self.post();
    }
}
