//! # Frame pipeline
//!
//! Camera frames flow through one controller-owned loop:
//!
//! ```text
//! CameraProvider ──open──► CaptureRig { device, source }
//!                                        │ acquire / release
//!                                        ▼
//!                       FrameLease ──render──► LockedSurface ──present──► display
//!                                                   │ deep copy (when streaming)
//!                                                   ▼
//!                            VideoEncoder (H.264) │ JpegEncoder
//!                                                   ▼
//!                                            StreamClient ──TCP──► receiver
//! ```
//!
//! ## Sub-modules
//!
//! | Module       | Purpose                                               |
//! |--------------|-------------------------------------------------------|
//! | `types`      | Pixel formats, resolutions, camera facing, frame copy |
//! | `capture`    | Camera / frame-source seams and the frame lease        |
//! | `display`    | Display surface seam and its lock guard               |
//! | `codec`      | Hardware codec device seam                            |
//! | `convert`    | RGBA → I420 → NV12 conversion and resize              |
//! | `encoder`    | H.264 encoder adapter with drop-on-full input         |
//! | `jpeg`       | JPEG compression for the bare-framed mode             |
//! | `throughput` | Rolling outbound byte-rate meter                      |
//! | `stats`      | Shared atomic counters                                |
//! | `controller` | The pipeline controller and its frame loop            |

pub mod capture;
pub mod codec;
pub mod controller;
pub mod convert;
pub mod display;
pub mod encoder;
pub mod jpeg;
pub mod stats;
pub mod throughput;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

// ── Re-exports ───────────────────────────────────────────────────

pub use capture::{CameraProvider, CaptureDevice, CaptureRig, FrameHandle, FrameLease, FrameSource};
pub use codec::{CodecDevice, CodecFactory, CodecFormat, OutputBufferInfo};
pub use controller::{LoopExit, PipelineConfig, PipelineController, StreamMode};
pub use display::{DisplayBuffer, DisplaySurface, LockedSurface, SurfaceGeometry};
pub use encoder::{AccessUnit, EncoderSettings, VideoEncoder};
pub use jpeg::JpegEncoder;
pub use stats::{PipelineStats, StatsSnapshot};
pub use throughput::ThroughputMeter;
pub use types::{CameraFacing, FrameImage, PixelFormat, Resolution};
