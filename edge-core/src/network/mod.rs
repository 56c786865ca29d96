//! Outbound TCP transport for the streaming protocol.

pub mod client;

pub use client::{ConnectionState, Endpoint, StreamClient};
