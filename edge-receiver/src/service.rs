//! Receiver service core logic.
//!
//! Accepts one sender at a time, decodes its message stream and records
//! it: H.264 access units are appended to an Annex-B file, JPEG images
//! overwrite a snapshot file.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use edge_core::{EdgeError, Message, MessageType, StreamCodec};
use futures::StreamExt;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::FramedRead;
use tracing::{debug, info, warn};

use crate::config::ReceiverConfig;

// ── SessionSummary ───────────────────────────────────────────────

/// What one sender delivered before disconnecting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub dimensions: Option<(i32, i32)>,
    pub configs: u64,
    pub frames: u64,
    pub images: u64,
    /// Payload bytes received, headers excluded.
    pub bytes: u64,
}

// ── StreamRecorder ───────────────────────────────────────────────

/// Per-session sink for decoded messages.
struct StreamRecorder {
    h264_path: Option<PathBuf>,
    jpeg_path: Option<PathBuf>,
    progress_interval: u64,
    file: Option<File>,
    cached_config: Option<Bytes>,
    config_pending: bool,
    summary: SessionSummary,
}

impl StreamRecorder {
    fn new(config: &ReceiverConfig) -> Self {
        Self {
            h264_path: config.h264_path(),
            jpeg_path: config.jpeg_path(),
            progress_interval: config.output.progress_interval,
            file: None,
            cached_config: None,
            config_pending: false,
            summary: SessionSummary::default(),
        }
    }

    async fn record(&mut self, msg: Message) -> Result<(), EdgeError> {
        let kind = msg.kind();
        let dimensions = msg.as_dimensions();
        let payload = msg.into_payload();
        self.summary.bytes += payload.len() as u64;

        match kind {
            MessageType::Dimensions => {
                if let Some((w, h)) = dimensions {
                    info!("stream dimensions {w}x{h}");
                    self.summary.dimensions = Some((w, h));
                }
            }
            MessageType::Config => {
                if payload.is_empty() {
                    debug!("ignoring empty config record");
                    return Ok(());
                }
                info!("codec config received ({} bytes)", payload.len());
                self.summary.configs += 1;
                self.cached_config = Some(payload);
                self.config_pending = true;
            }
            MessageType::Frame => {
                if payload.is_empty() {
                    debug!("ignoring empty frame");
                    return Ok(());
                }
                self.append_frame(&payload).await?;
                self.summary.frames += 1;
                self.report_progress();
            }
            MessageType::Image => {
                if payload.is_empty() {
                    debug!("ignoring empty image");
                    return Ok(());
                }
                if let Some(path) = &self.jpeg_path {
                    tokio::fs::write(path, &payload)
                        .await
                        .map_err(|e| output_error(path, e))?;
                }
                self.summary.images += 1;
                self.report_progress();
            }
        }
        Ok(())
    }

    /// Append one access unit, preceded by the cached config when it has
    /// not been written to the file yet.
    async fn append_frame(&mut self, unit: &[u8]) -> Result<(), EdgeError> {
        let Some(path) = self.h264_path.clone() else {
            return Ok(());
        };
        if self.file.is_none() {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .await
                .map_err(|e| output_error(&path, e))?;
            info!("recording to {}", path.display());
            self.file = Some(file);
        }
        let Some(file) = self.file.as_mut() else {
            return Ok(());
        };

        if self.config_pending {
            if let Some(config) = &self.cached_config {
                file.write_all(config)
                    .await
                    .map_err(|e| output_error(&path, e))?;
            }
            self.config_pending = false;
        }
        file.write_all(unit)
            .await
            .map_err(|e| output_error(&path, e))
    }

    fn report_progress(&self) {
        let count = self.summary.frames + self.summary.images;
        if self.progress_interval > 0 && count % self.progress_interval == 0 {
            info!(
                "received {count} frames, {} KiB",
                self.summary.bytes / 1024
            );
        }
    }

    async fn finish(mut self) -> SessionSummary {
        if let Some(mut file) = self.file.take() {
            if let Err(e) = file.flush().await {
                warn!("flushing recording failed: {e}");
            }
        }
        self.summary
    }
}

fn output_error(path: &std::path::Path, e: std::io::Error) -> EdgeError {
    EdgeError::Other(format!("writing {}: {e}", path.display()))
}

// ── ReceiverService ──────────────────────────────────────────────

/// The top-level receiver service.
pub struct ReceiverService {
    config: ReceiverConfig,
    running: Arc<AtomicBool>,
}

impl ReceiverService {
    pub fn new(config: ReceiverConfig) -> Self {
        Self {
            config,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle that stops the service when `false` is stored into it.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn config(&self) -> &ReceiverConfig {
        &self.config
    }

    /// Bind the configured address and serve until stopped.
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(self.config.listen_addr()).await?;
        self.run_on(listener).await
    }

    /// Serve senders from an already bound listener until stopped.
    ///
    /// Senders are handled one after another; a second sender waits in
    /// the accept backlog until the current one disconnects.
    pub async fn run_on(&self, listener: TcpListener) -> Result<(), Box<dyn std::error::Error>> {
        self.running.store(true, Ordering::SeqCst);
        info!(
            "receiver listening on {} ({} framing)",
            listener.local_addr()?,
            self.config.network.framing
        );

        while self.running.load(Ordering::SeqCst) {
            let accept = tokio::select! {
                result = listener.accept() => result,
                _ = Self::wait_for_stop(&self.running) => break,
            };

            let (stream, peer) = match accept {
                Ok(pair) => pair,
                Err(e) => {
                    warn!("accept error: {e}");
                    continue;
                }
            };

            info!("sender connected from {peer}");
            match self.session(stream, peer).await {
                Ok(summary) => info!(
                    "session with {peer} ended: {} frames, {} images, {} bytes",
                    summary.frames, summary.images, summary.bytes
                ),
                Err(e) => warn!("session with {peer} aborted: {e}"),
            }
        }

        self.running.store(false, Ordering::SeqCst);
        info!("receiver stopped");
        Ok(())
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    // ── Internal ─────────────────────────────────────────────────

    /// Decode and record one sender's stream until EOF, a decode error,
    /// or a stop request.
    async fn session(&self, stream: TcpStream, peer: SocketAddr) -> Result<SessionSummary, EdgeError> {
        let mut reader = FramedRead::new(stream, StreamCodec::new(self.config.network.framing));
        let mut recorder = StreamRecorder::new(&self.config);

        let outcome = loop {
            let next = tokio::select! {
                item = reader.next() => item,
                _ = Self::wait_for_stop(&self.running) => break Ok(()),
            };
            match next {
                Some(Ok(msg)) => {
                    if let Err(e) = recorder.record(msg).await {
                        break Err(e);
                    }
                }
                Some(Err(e)) => break Err(e),
                None => {
                    debug!("{peer} closed the stream");
                    break Ok(());
                }
            }
        };

        let summary = recorder.finish().await;
        outcome.map(|()| summary)
    }

    /// Resolves when `running` becomes false.
    async fn wait_for_stop(running: &Arc<AtomicBool>) {
        loop {
            if !running.load(Ordering::SeqCst) {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
