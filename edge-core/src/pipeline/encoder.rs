//! H.264 encoder adapter over a [`CodecDevice`].
//!
//! Each [`encode`](VideoEncoder::encode) call converts one frame to NV12,
//! tries to queue it, then drains every finished output buffer. When
//! the device has no free input slot within the configured wait the
//! frame is dropped; that is normal load shedding, not an error.

use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, error, info, warn};

use crate::error::EdgeError;
use crate::flags::BufferFlags;
use crate::pipeline::codec::{
    COLOR_FORMAT_NV12, CodecDevice, CodecFactory, CodecFormat, MIME_AVC, OutputBufferInfo,
};
use crate::pipeline::convert::FrameConverter;
use crate::pipeline::types::{FrameImage, Resolution};

/// Log one line per this many dropped frames.
const DROP_LOG_INTERVAL: u64 = 30;

// ── EncoderSettings ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderSettings {
    pub resolution: Resolution,
    pub bitrate: u32,
    pub frame_rate: u32,
    /// Longest wait for a free input slot.
    pub input_timeout: Duration,
}

impl EncoderSettings {
    pub fn new(resolution: Resolution, bitrate: u32, frame_rate: u32) -> Self {
        Self {
            resolution,
            bitrate,
            frame_rate,
            input_timeout: Duration::from_millis(10),
        }
    }

    fn codec_format(&self) -> CodecFormat {
        CodecFormat {
            mime: MIME_AVC,
            width: self.resolution.width,
            height: self.resolution.height,
            bitrate: self.bitrate,
            frame_rate: self.frame_rate,
            i_frame_interval: 1,
            color_format: COLOR_FORMAT_NV12,
        }
    }
}

// ── AccessUnit ───────────────────────────────────────────────────

/// One chunk of encoder output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessUnit {
    /// Annex-B bytes.
    pub data: Bytes,
    /// Parameter sets rather than a picture.
    pub is_config: bool,
    pub pts_us: i64,
}

// ── PtsClock ─────────────────────────────────────────────────────

/// Maps capture timestamps onto a session timeline starting at zero.
///
/// The first stamped frame fixes the baseline. Output never goes below
/// zero and never decreases, even if capture timestamps jump backwards.
#[derive(Debug, Default)]
struct PtsClock {
    base: Option<i64>,
    last: i64,
}

impl PtsClock {
    fn stamp(&mut self, captured_at_us: i64) -> i64 {
        let base = *self.base.get_or_insert(captured_at_us);
        let pts = captured_at_us.saturating_sub(base).max(self.last);
        self.last = pts;
        pts
    }

    fn last(&self) -> i64 {
        self.last
    }
}

// ── DropCounter ──────────────────────────────────────────────────

#[derive(Debug, Default)]
struct DropCounter {
    dropped: u64,
}

impl DropCounter {
    fn record(&mut self, reason: &str) {
        self.dropped += 1;
        if self.dropped % DROP_LOG_INTERVAL == 1 {
            warn!(dropped = self.dropped, reason, "encoder dropped frame");
        } else {
            debug!(dropped = self.dropped, reason, "encoder dropped frame");
        }
    }
}

// ── VideoEncoder ─────────────────────────────────────────────────

/// Encoder session. Not restartable once stopped.
pub struct VideoEncoder {
    device: Option<Box<dyn CodecDevice>>,
    converter: Option<FrameConverter>,
    settings: Option<EncoderSettings>,
    clock: PtsClock,
    drops: DropCounter,
    queued: u64,
    stopped: bool,
}

impl VideoEncoder {
    /// An encoder with no session; `encode` is a no-op until initialised.
    pub fn new() -> Self {
        Self {
            device: None,
            converter: None,
            settings: None,
            clock: PtsClock::default(),
            drops: DropCounter::default(),
            queued: 0,
            stopped: false,
        }
    }

    /// Create, configure and start a device for `settings`.
    ///
    /// On failure the encoder stays inert and the failing stage is named
    /// in the error.
    pub fn initialize(
        &mut self,
        factory: &dyn CodecFactory,
        settings: EncoderSettings,
    ) -> Result<(), EdgeError> {
        let fail = |stage, reason: String| {
            error!(stage, %reason, "encoder initialisation failed");
            EdgeError::EncoderInit { stage, reason }
        };

        if self.stopped {
            return Err(fail("initialize", "session already stopped".into()));
        }
        if self.device.is_some() {
            return Err(fail("initialize", "session already running".into()));
        }
        let res = settings.resolution;
        if res.is_empty() || res.width % 2 != 0 || res.height % 2 != 0 {
            return Err(fail("configure", format!("invalid size {res}")));
        }

        let mut device = factory
            .create_encoder(MIME_AVC)
            .map_err(|e| fail("create", e.to_string()))?;
        device
            .configure(&settings.codec_format())
            .map_err(|e| fail("configure", e.to_string()))?;
        device
            .start()
            .map_err(|e| fail("start", e.to_string()))?;

        info!(
            resolution = %res,
            bitrate = settings.bitrate,
            fps = settings.frame_rate,
            "encoder started"
        );
        self.device = Some(device);
        self.converter = Some(FrameConverter::new(res));
        self.settings = Some(settings);
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.device.is_some()
    }

    pub fn settings(&self) -> Option<&EncoderSettings> {
        self.settings.as_ref()
    }

    /// Frames dropped so far (no input slot, or slot too small).
    pub fn frames_dropped(&self) -> u64 {
        self.drops.dropped
    }

    /// Frames handed to the device so far.
    pub fn frames_queued(&self) -> u64 {
        self.queued
    }

    /// Feed one frame and collect whatever output is ready.
    pub fn encode(&mut self, frame: &FrameImage, captured_at_us: i64) -> Vec<AccessUnit> {
        let Self {
            device: Some(device),
            converter: Some(converter),
            settings: Some(settings),
            clock,
            drops,
            queued,
            ..
        } = self
        else {
            return Vec::new();
        };

        let nv12 = converter.convert(frame);
        match device.dequeue_input(settings.input_timeout) {
            None => drops.record("no free input buffer"),
            Some(index) => {
                let filled = match device.input_buffer(index) {
                    Some(slot) if slot.len() >= nv12.len() => {
                        slot[..nv12.len()].copy_from_slice(nv12);
                        Some(nv12.len())
                    }
                    _ => None,
                };
                match filled {
                    Some(len) => {
                        let pts = clock.stamp(captured_at_us);
                        match device.queue_input(index, len, pts, BufferFlags::empty()) {
                            Ok(()) => *queued += 1,
                            Err(e) => {
                                warn!(error = %e, "queue input failed");
                                drops.record("queue input failed");
                            }
                        }
                    }
                    None => {
                        // Hand the slot back empty so the device does not stall.
                        if let Err(e) =
                            device.queue_input(index, 0, clock.last(), BufferFlags::empty())
                        {
                            warn!(error = %e, "returning empty input failed");
                        }
                        drops.record("input buffer too small");
                    }
                }
            }
        }

        drain(device.as_mut())
    }

    /// Stop and release the device. Idempotent.
    pub fn stop(&mut self) {
        self.stopped = true;
        self.converter = None;
        if let Some(mut device) = self.device.take() {
            device.stop();
            info!(
                queued = self.queued,
                dropped = self.drops.dropped,
                "encoder stopped"
            );
        }
    }
}

/// Collect every ready output buffer, releasing each one.
fn drain(device: &mut dyn CodecDevice) -> Vec<AccessUnit> {
    let mut units = Vec::new();
    while let Some(info) = device.dequeue_output() {
        if let Some(unit) = read_output(device, &info) {
            units.push(unit);
        }
        device.release_output(info.index);
    }
    units
}

fn read_output(device: &dyn CodecDevice, info: &OutputBufferInfo) -> Option<AccessUnit> {
    if info.size == 0 {
        return None;
    }
    let buf = device.output_buffer(info.index)?;
    let range = info
        .offset
        .checked_add(info.size)
        .map(|end| info.offset..end);
    let Some(bytes) = range.and_then(|r| buf.get(r)) else {
        warn!(index = info.index, "output buffer range out of bounds");
        return None;
    };
    Some(AccessUnit {
        data: Bytes::copy_from_slice(bytes),
        is_config: info.flags.is_config(),
        pts_us: info.pts_us,
    })
}

impl Default for VideoEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for VideoEncoder {
    fn drop(&mut self) {
        self.stop();
    }
}

// ── Tests ────────────────────────────────────────────────────────
