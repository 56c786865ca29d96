//! Frame pipeline controller.
//!
//! Owns the camera rig, the display surface and the optional streaming
//! stage, and runs the per-frame loop on a Tokio task:
//!
//! 1. Wait (yielding) until source and surface are ready.
//! 2. Acquire the latest frame; yield and retry if there is none.
//! 3. Re-check the stop token now that a frame is held.
//! 4. Lock the surface. Failure ends the loop with [`LoopExit::SurfaceLost`].
//! 5. Render the frame into the locked buffer.
//! 6. If a connected stream exists, deep-copy the buffer.
//! 7. Unlock and post. Presentation never waits on the network.
//! 8. Encode the copy and send each unit; the first failed send closes
//!    the connection and drops the rest of this frame's units.
//! 9. Release the frame.
//!
//! The control side only talks to the loop through a
//! [`CancellationToken`] and the task's join handle. Collaborators are
//! swapped only while the loop is joined; every reconfiguring call made
//! while it runs fails with [`EdgeError::PipelineRunning`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::io::AsyncWrite;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::EdgeError;
use crate::message::Framing;
use crate::network::StreamClient;
use crate::pipeline::capture::{CameraProvider, CaptureRig, FrameLease};
use crate::pipeline::codec::CodecFactory;
use crate::pipeline::convert::resize_nearest;
use crate::pipeline::display::{DisplaySurface, LockedSurface};
use crate::pipeline::encoder::{EncoderSettings, VideoEncoder};
use crate::pipeline::jpeg::{DEFAULT_QUALITY, JpegEncoder};
use crate::pipeline::stats::PipelineStats;
use crate::pipeline::throughput::ThroughputMeter;
use crate::pipeline::types::{CameraFacing, FrameImage, Resolution};

// ── PipelineConfig ───────────────────────────────────────────────

/// What the streaming stage puts on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamMode {
    /// H.264 access units over tagged framing.
    #[default]
    H264,
    /// JPEG pictures over bare framing.
    Jpeg,
}

impl StreamMode {
    pub const fn framing(self) -> Framing {
        match self {
            StreamMode::H264 => Framing::Tagged,
            StreamMode::Jpeg => Framing::Bare,
        }
    }
}

/// Configuration for [`PipelineController`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Receiver host used by `configure_streaming` callers.
    pub host: String,
    pub port: u16,
    /// Target encoder bitrate in bits/second.
    pub bitrate: u32,
    pub frame_rate: u32,
    /// Captures wider than this are scaled down before encoding.
    pub max_encode_width: u32,
    /// Longest wait for a free encoder input slot.
    pub input_timeout_ms: u64,
    pub mode: StreamMode,
    pub jpeg_quality: u8,
    /// Camera opened by the first `set_up_camera`.
    pub facing: CameraFacing,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 9999,
            bitrate: 2_000_000,
            frame_rate: 30,
            max_encode_width: 640,
            input_timeout_ms: 10,
            mode: StreamMode::H264,
            jpeg_quality: DEFAULT_QUALITY,
            facing: CameraFacing::Back,
        }
    }
}

/// Why the frame loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// The stop token was cancelled.
    Stopped,
    /// The display surface could not be locked.
    SurfaceLost,
}

// ── Streaming stage ──────────────────────────────────────────────

enum Compressor {
    H264(VideoEncoder),
    Jpeg(JpegEncoder),
}

/// Encoder plus connection. Field order is teardown order.
struct StreamSink<W> {
    compressor: Compressor,
    client: StreamClient<W>,
    resolution: Resolution,
    meter: ThroughputMeter,
    /// Encoder drops already added to the shared stats.
    drops_reported: u64,
}

impl<W> StreamSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    fn is_connected(&self) -> bool {
        self.client.is_connected()
    }

    /// Compress one frame and send the result.
    async fn push(&mut self, frame: &FrameImage, captured_at_us: i64, stats: &PipelineStats) {
        match &mut self.compressor {
            Compressor::H264(encoder) => {
                let units = encoder.encode(frame, captured_at_us);
                let dropped = encoder.frames_dropped();
                stats.frames_dropped(dropped.saturating_sub(self.drops_reported));
                self.drops_reported = dropped;
                if units.iter().any(|u| !u.is_config) {
                    stats.frame_encoded();
                }
                for unit in units {
                    let sent = if unit.is_config {
                        self.client.send_config(&unit.data).await
                    } else {
                        self.client.send_frame(&unit.data).await
                    };
                    if !account(sent, &mut self.meter, stats) {
                        break;
                    }
                }
            }
            Compressor::Jpeg(jpeg) => {
                let scaled = resize_nearest(frame, self.resolution);
                match jpeg.encode(scaled.as_ref().unwrap_or(frame)) {
                    Ok(image) => {
                        stats.frame_encoded();
                        let sent = self.client.send_image(&image).await;
                        account(sent, &mut self.meter, stats);
                    }
                    Err(e) => warn!(error = %e, "jpeg encode failed, frame skipped"),
                }
            }
        }

        if let Some(bps) = self.meter.due_report(Instant::now()) {
            debug!(bytes_per_sec = bps, "stream throughput");
        }
    }
}

/// Record a send outcome. Returns whether sending may continue.
fn account(
    sent: Result<usize, EdgeError>,
    meter: &mut ThroughputMeter,
    stats: &PipelineStats,
) -> bool {
    match sent {
        Ok(bytes) => {
            stats.message_sent(bytes);
            meter.record(bytes as u64);
            true
        }
        Err(e) => {
            stats.send_failed();
            warn!(error = %e, "stream send failed, streaming stopped until reconfigured");
            false
        }
    }
}

// ── PipelineState ────────────────────────────────────────────────

/// Everything the frame loop owns while it runs.
struct PipelineState<W> {
    rig: Option<CaptureRig>,
    display: Option<Box<dyn DisplaySurface>>,
    stream: Option<StreamSink<W>>,
}

impl<W> PipelineState<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn run(&mut self, token: &CancellationToken, stats: &PipelineStats) -> LoopExit {
        let PipelineState {
            rig: Some(rig),
            display: Some(display),
            stream,
        } = self
        else {
            return LoopExit::Stopped;
        };
        info!(resolution = %rig.resolution, "frame loop started");

        loop {
            if token.is_cancelled() {
                return LoopExit::Stopped;
            }
            if !rig.source.is_ready() || !display.is_ready() {
                tokio::task::yield_now().await;
                continue;
            }

            let Some(mut lease) = FrameLease::acquire(rig.source.as_mut()) else {
                tokio::task::yield_now().await;
                continue;
            };
            stats.frame_acquired();
            if token.is_cancelled() {
                return LoopExit::Stopped;
            }
            let captured_at_us = lease.timestamp_us();

            let copy = {
                let mut locked = match LockedSurface::lock(display.as_mut()) {
                    Ok(locked) => locked,
                    Err(e) => {
                        warn!(error = %e, "display lock failed, frame loop exiting");
                        return LoopExit::SurfaceLost;
                    }
                };
                if let Err(e) = lease.render(&mut locked.buffer()) {
                    debug!(error = %e, "render failed");
                }
                let copy = stream
                    .as_ref()
                    .filter(|sink| sink.is_connected())
                    .map(|_| locked.copy_frame());
                locked.present();
                copy
            };
            stats.frame_presented();

            if let (Some(frame), Some(sink)) = (copy, stream.as_mut()) {
                sink.push(&frame, captured_at_us, stats).await;
            }

            lease.release();
            tokio::task::yield_now().await;
        }
    }
}

impl<W> Drop for PipelineState<W> {
    fn drop(&mut self) {
        if let Some(rig) = self.rig.take() {
            let CaptureRig { device, source, .. } = rig;
            drop(device);
            drop(source);
            debug!("capture released");
        }
        if self.display.take().is_some() {
            debug!("display surface released");
        }
        if let Some(sink) = self.stream.take() {
            let StreamSink {
                compressor, client, ..
            } = sink;
            drop(compressor);
            drop(client);
            debug!("stream released");
        }
    }
}

// ── PipelineController ───────────────────────────────────────────

struct Worker<W> {
    token: CancellationToken,
    handle: JoinHandle<(PipelineState<W>, LoopExit)>,
}

/// The pipeline state, if no worker currently owns it.
fn idle<'a, W>(
    worker: &Option<Worker<W>>,
    state: &'a mut Option<PipelineState<W>>,
) -> Result<&'a mut PipelineState<W>, EdgeError> {
    if worker.is_some() {
        return Err(EdgeError::PipelineRunning);
    }
    state.as_mut().ok_or(EdgeError::PipelineRunning)
}

/// Root of the capture → display → stream pipeline.
///
/// # Lifetime
///
/// `set_up_camera`, then optionally `configure_streaming`, then `start`.
/// `stop` (or `shutdown`) joins the loop before anything is torn down.
pub struct PipelineController<W = TcpStream> {
    camera: Box<dyn CameraProvider>,
    codecs: Arc<dyn CodecFactory>,
    config: PipelineConfig,
    facing: CameraFacing,
    stats: PipelineStats,
    /// `None` exactly while a worker owns it.
    state: Option<PipelineState<W>>,
    worker: Option<Worker<W>>,
    last_exit: Option<LoopExit>,
}

impl<W> PipelineController<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(
        camera: Box<dyn CameraProvider>,
        display: Box<dyn DisplaySurface>,
        codecs: Arc<dyn CodecFactory>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            camera,
            codecs,
            facing: config.facing,
            config,
            stats: PipelineStats::new(),
            state: Some(PipelineState {
                rig: None,
                display: Some(display),
                stream: None,
            }),
            worker: None,
            last_exit: None,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn facing(&self) -> CameraFacing {
        self.facing
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats.clone()
    }

    /// Whether the loop task is alive.
    pub fn is_running(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|w| !w.handle.is_finished())
    }

    /// Exit reason of the most recently joined loop.
    pub fn last_exit(&self) -> Option<LoopExit> {
        self.last_exit
    }

    /// Negotiated capture size, if a camera is open and the loop joined.
    pub fn capture_resolution(&self) -> Option<Resolution> {
        self.state.as_ref()?.rig.as_ref().map(|r| r.resolution)
    }

    /// Whether a connected stream is attached. `false` while running.
    pub fn is_streaming(&self) -> bool {
        self.state
            .as_ref()
            .and_then(|s| s.stream.as_ref())
            .is_some_and(|sink| sink.is_connected())
    }

    /// Open the camera for the current facing, replacing any open one.
    pub fn set_up_camera(&mut self) -> Result<Resolution, EdgeError> {
        let facing = self.facing;
        let state = idle(&self.worker, &mut self.state)?;
        let display_size = state
            .display
            .as_ref()
            .map(|d| d.size())
            .ok_or_else(|| EdgeError::SurfaceLost("no display surface".into()))?;

        state.rig = None;
        let mut rig = self.camera.open(facing, display_size)?;
        rig.source.set_present_rotation(rig.orientation);
        let resolution = rig.resolution;
        info!(
            ?facing,
            %resolution,
            orientation = rig.orientation,
            "camera opened"
        );
        state.rig = Some(rig);
        Ok(resolution)
    }

    /// Spawn the frame loop.
    pub fn start(&mut self) -> Result<(), EdgeError> {
        let state = idle(&self.worker, &mut self.state)?;
        if state.rig.is_none() {
            return Err(EdgeError::CaptureUnavailable);
        }
        if state.display.is_none() {
            return Err(EdgeError::SurfaceLost("no display surface".into()));
        }
        let Some(mut state) = self.state.take() else {
            return Err(EdgeError::PipelineRunning);
        };

        let token = CancellationToken::new();
        let loop_token = token.clone();
        let stats = self.stats.clone();
        let handle = tokio::spawn(async move {
            let exit = state.run(&loop_token, &stats).await;
            info!(?exit, "frame loop exited");
            (state, exit)
        });

        self.last_exit = None;
        self.worker = Some(Worker { token, handle });
        Ok(())
    }

    /// Ask the loop to stop at its next checkpoint. Does not wait.
    pub fn request_stop(&self) {
        if let Some(worker) = &self.worker {
            worker.token.cancel();
        }
    }

    /// Stop and join the loop, taking its resources back.
    ///
    /// Returns `None` if no loop was started.
    pub async fn stop(&mut self) -> Result<Option<LoopExit>, EdgeError> {
        let Some(worker) = self.worker.take() else {
            return Ok(None);
        };
        worker.token.cancel();
        let (state, exit) = worker.handle.await?;
        self.state = Some(state);
        self.last_exit = Some(exit);
        Ok(Some(exit))
    }

    /// Close the current camera and open the other one, then restart.
    ///
    /// Rejected while the loop is running; stop it first.
    pub fn switch_camera(&mut self) -> Result<Resolution, EdgeError> {
        let state = idle(&self.worker, &mut self.state)?;
        state.rig = None;
        self.facing = self.facing.toggled();
        let resolution = self.set_up_camera()?;
        self.start()?;
        Ok(resolution)
    }

    /// Attach an open connection: send the dimensions handshake, then
    /// bring up the compressor for the configured mode.
    ///
    /// Any previous stream is torn down first. If the encoder fails to
    /// start, the new connection is closed and the error returned.
    pub async fn attach_stream(&mut self, mut client: StreamClient<W>) -> Result<Resolution, EdgeError> {
        let mode = self.config.mode;
        if client.framing() != mode.framing() {
            return Err(EdgeError::ProtocolViolation(
                "connection framing does not match the stream mode",
            ));
        }
        let max_width = self.config.max_encode_width;
        let state = idle(&self.worker, &mut self.state)?;
        let capture = state
            .rig
            .as_ref()
            .map(|r| r.resolution)
            .ok_or(EdgeError::CaptureUnavailable)?;
        let resolution = capture.capped_even(max_width);

        state.stream = None;
        client
            .send_dimensions(resolution.width as i32, resolution.height as i32)
            .await?;

        let compressor = match mode {
            StreamMode::H264 => {
                let mut settings =
                    EncoderSettings::new(resolution, self.config.bitrate, self.config.frame_rate);
                settings.input_timeout = Duration::from_millis(self.config.input_timeout_ms);
                let mut encoder = VideoEncoder::new();
                if let Err(e) = encoder.initialize(self.codecs.as_ref(), settings) {
                    client.close();
                    return Err(e);
                }
                Compressor::H264(encoder)
            }
            StreamMode::Jpeg => Compressor::Jpeg(JpegEncoder::new(self.config.jpeg_quality)),
        };

        info!(%capture, %resolution, ?mode, "streaming configured");
        state.stream = Some(StreamSink {
            compressor,
            client,
            resolution,
            meter: ThroughputMeter::new(),
            drops_reported: 0,
        });
        Ok(resolution)
    }

    /// Tear down the streaming stage. Rejected while running.
    pub fn detach_stream(&mut self) -> Result<(), EdgeError> {
        idle(&self.worker, &mut self.state)?.stream = None;
        Ok(())
    }

    /// Stop the loop and release everything in teardown order.
    pub async fn shutdown(mut self) -> Result<(), EdgeError> {
        let joined = self.stop().await;
        self.state = None;
        joined.map(|_| ())
    }
}

impl PipelineController<TcpStream> {
    /// Connect to `host:port` with the mode's framing and attach the
    /// connection. Any previous stream is torn down first, so connection
    /// failures leave the stream unconfigured.
    pub async fn configure_streaming(&mut self, host: &str, port: u16) -> Result<Resolution, EdgeError> {
        idle(&self.worker, &mut self.state)?.stream = None;
        let client = StreamClient::connect(host, port, self.config.mode.framing()).await?;
        self.attach_stream(client).await
    }
}

impl<W> Drop for PipelineController<W> {
    fn drop(&mut self) {
        if let Some(worker) = &self.worker {
            worker.token.cancel();
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
