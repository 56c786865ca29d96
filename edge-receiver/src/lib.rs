//! # edge-receiver
//!
//! Listening end of the edge stream protocol. Accepts one sender at a
//! time and records what it sends:
//!
//! - **Tagged framing**: codec config and H.264 access units are appended
//!   to an Annex-B `.h264` file, config first, so the file plays back.
//! - **Bare framing**: each JPEG image overwrites a snapshot file.

pub mod config;
pub mod service;
