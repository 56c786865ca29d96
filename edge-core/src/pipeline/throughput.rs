//! Outbound throughput meter.
//!
//! Keeps `(timestamp, bytes)` samples over a rolling window and reports
//! the average rate. The streaming stage logs it once per window.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

pub struct ThroughputMeter {
    samples: VecDeque<(Instant, u64)>,
    window: Duration,
    /// Sum of the bytes currently in `samples`.
    total_bytes: u64,
    last_report: Option<Instant>,
}

impl ThroughputMeter {
    /// Meter with a one-second window.
    pub fn new() -> Self {
        Self::with_window(Duration::from_secs(1))
    }

    pub fn with_window(window: Duration) -> Self {
        Self {
            samples: VecDeque::with_capacity(64),
            window,
            total_bytes: 0,
            last_report: None,
        }
    }

    pub fn record(&mut self, bytes: u64) {
        self.record_at(Instant::now(), bytes);
    }

    pub fn record_at(&mut self, when: Instant, bytes: u64) {
        self.samples.push_back((when, bytes));
        self.total_bytes += bytes;
        self.evict(when);
    }

    /// Average rate over the window in bytes/second.
    pub fn bytes_per_sec(&self) -> u64 {
        let (Some((first, _)), Some((last, _))) = (self.samples.front(), self.samples.back())
        else {
            return 0;
        };
        let span = last.duration_since(*first).max(Duration::from_millis(1));
        (self.total_bytes as f64 / span.as_secs_f64()) as u64
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Current rate if a full window has passed since the last report.
    pub fn due_report(&mut self, now: Instant) -> Option<u64> {
        match self.last_report {
            Some(at) if now.duration_since(at) < self.window => None,
            Some(_) => {
                self.last_report = Some(now);
                Some(self.bytes_per_sec())
            }
            None => {
                self.last_report = Some(now);
                None
            }
        }
    }

    fn evict(&mut self, now: Instant) {
        while let Some(&(ts, bytes)) = self.samples.front() {
            if now.duration_since(ts) <= self.window {
                break;
            }
            self.samples.pop_front();
            self.total_bytes = self.total_bytes.saturating_sub(bytes);
        }
    }
}

impl Default for ThroughputMeter {
    fn default() -> Self {
        Self::new()
    }
}
