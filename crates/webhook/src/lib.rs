//! HTTP face of the relay.
//!
//! The channel bridge delivers inbound events with `POST /inbound` and the
//! relay calls back into the bridge to send replies and fetch media. The
//! inbound endpoint acknowledges immediately and processes in the
//! background so a slow backend never blocks the bridge.

pub mod server;
pub mod transport;

pub use {
    server::{AppState, app, serve},
    transport::HttpTransport,
};
