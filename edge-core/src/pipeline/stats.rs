//! Counters shared between the frame loop and the control side.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
struct Counters {
    frames_acquired: AtomicU64,
    frames_presented: AtomicU64,
    frames_encoded: AtomicU64,
    frames_dropped: AtomicU64,
    messages_sent: AtomicU64,
    bytes_sent: AtomicU64,
    send_failures: AtomicU64,
}

/// Cloneable handle to the pipeline counters.
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    inner: Arc<Counters>,
}

/// Point-in-time copy of [`PipelineStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    pub frames_acquired: u64,
    pub frames_presented: u64,
    pub frames_encoded: u64,
    pub frames_dropped: u64,
    pub messages_sent: u64,
    pub bytes_sent: u64,
    pub send_failures: u64,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let c = &self.inner;
        StatsSnapshot {
            frames_acquired: c.frames_acquired.load(Ordering::Relaxed),
            frames_presented: c.frames_presented.load(Ordering::Relaxed),
            frames_encoded: c.frames_encoded.load(Ordering::Relaxed),
            frames_dropped: c.frames_dropped.load(Ordering::Relaxed),
            messages_sent: c.messages_sent.load(Ordering::Relaxed),
            bytes_sent: c.bytes_sent.load(Ordering::Relaxed),
            send_failures: c.send_failures.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn frame_acquired(&self) {
        self.inner.frames_acquired.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn frame_presented(&self) {
        self.inner.frames_presented.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn frame_encoded(&self) {
        self.inner.frames_encoded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn frames_dropped(&self, count: u64) {
        self.inner.frames_dropped.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn message_sent(&self, bytes: usize) {
        self.inner.messages_sent.fetch_add(1, Ordering::Relaxed);
        self.inner.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub(crate) fn send_failed(&self) {
        self.inner.send_failures.fetch_add(1, Ordering::Relaxed);
    }
}
