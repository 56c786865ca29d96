//! Camera-side seams: the capture device, its frame source, and the
//! provider that opens both for a given facing.
//!
//! The source hands out at most one frame at a time. [`FrameLease`]
//! returns it on every exit path, including early returns and panics
//! unwinding through the loop.

use std::fmt;

use crate::error::EdgeError;
use crate::pipeline::display::DisplayBuffer;
use crate::pipeline::types::{CameraFacing, Resolution};

/// Opaque handle to a frame owned by the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHandle {
    pub id: u64,
    /// Capture time on the device's monotonic clock, in microseconds.
    pub timestamp_us: i64,
}

/// Open camera session. Closing happens on drop.
pub trait CaptureDevice: Send {
    fn facing(&self) -> CameraFacing;
}

/// Producer of raw frames, e.g. an image reader fed by the camera.
pub trait FrameSource: Send {
    fn is_ready(&self) -> bool;

    /// Latest frame, or `None` if nothing new arrived.
    fn acquire_latest(&mut self) -> Option<FrameHandle>;

    /// Give a frame back. Called exactly once per acquired frame.
    fn release(&mut self, frame: FrameHandle);

    /// Convert and rotate `frame` into the locked display buffer.
    fn render(&mut self, frame: &FrameHandle, target: &mut DisplayBuffer<'_>) -> Result<(), EdgeError>;

    /// Rotation in degrees to apply when rendering.
    fn set_present_rotation(&mut self, degrees: i32);
}

/// Everything opened for one camera.
///
/// Field order is teardown order: device before source.
pub struct CaptureRig {
    pub device: Box<dyn CaptureDevice>,
    pub source: Box<dyn FrameSource>,
    /// Negotiated capture size.
    pub resolution: Resolution,
    /// Sensor orientation in degrees.
    pub orientation: i32,
}

impl fmt::Debug for CaptureRig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureRig")
            .field("facing", &self.device.facing())
            .field("resolution", &self.resolution)
            .field("orientation", &self.orientation)
            .finish()
    }
}

/// Opens cameras. `display` is the preview size used to pick the
/// closest capture resolution.
pub trait CameraProvider: Send {
    fn open(&mut self, facing: CameraFacing, display: Resolution) -> Result<CaptureRig, EdgeError>;
}

// ── FrameLease ───────────────────────────────────────────────────

/// One acquired frame. Released to its source on drop.
pub struct FrameLease<'a> {
    source: &'a mut dyn FrameSource,
    frame: Option<FrameHandle>,
}

impl<'a> FrameLease<'a> {
    /// Acquire the latest frame, if any.
    pub fn acquire(source: &'a mut dyn FrameSource) -> Option<Self> {
        let frame = source.acquire_latest()?;
        Some(Self {
            source,
            frame: Some(frame),
        })
    }

    pub fn timestamp_us(&self) -> i64 {
        self.frame.map(|f| f.timestamp_us).unwrap_or_default()
    }

    pub fn render(&mut self, target: &mut DisplayBuffer<'_>) -> Result<(), EdgeError> {
        match self.frame {
            Some(frame) => self.source.render(&frame, target),
            None => Err(EdgeError::CaptureUnavailable),
        }
    }

    /// Release now rather than at scope end.
    pub fn release(mut self) {
        self.give_back();
    }

    fn give_back(&mut self) {
        if let Some(frame) = self.frame.take() {
            self.source.release(frame);
        }
    }
}

impl Drop for FrameLease<'_> {
    fn drop(&mut self) {
        self.give_back();
    }
}
