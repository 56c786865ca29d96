//! Configuration for the stream receiver.

use std::path::{Path, PathBuf};

use edge_core::Framing;
use serde::{Deserialize, Serialize};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    pub network: NetworkConfig,
    pub output: OutputConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address to listen on.
    pub bind: String,
    pub port: u16,
    /// `"tagged"` for H.264 senders, `"bare"` for JPEG senders.
    pub framing: Framing,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Annex-B elementary stream file, appended to. Empty disables it.
    pub h264_path: String,
    /// Latest received JPEG is written here. Empty disables it.
    pub jpeg_path: String,
    /// Log a progress line every this many frames.
    pub progress_interval: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 9999,
            framing: Framing::Tagged,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            h264_path: "received.h264".into(),
            jpeg_path: "latest.jpg".into(),
            progress_interval: 30,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl ReceiverConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Write the default configuration to a file.
    pub fn write_default(path: &Path) -> std::io::Result<()> {
        let text = toml::to_string_pretty(&Self::default()).map_err(std::io::Error::other)?;
        std::fs::write(path, text)
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.network.bind, self.network.port)
    }

    pub fn h264_path(&self) -> Option<PathBuf> {
        non_empty(&self.output.h264_path)
    }

    pub fn jpeg_path(&self) -> Option<PathBuf> {
        non_empty(&self.output.jpeg_path)
    }
}

fn non_empty(path: &str) -> Option<PathBuf> {
    (!path.trim().is_empty()).then(|| PathBuf::from(path))
}

// ── Tests ────────────────────────────────────────────────────────
