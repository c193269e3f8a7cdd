//! HTTP client for the remote consultation backend.
//!
//! Two stateless endpoints: `/api/chat` (full-history JSON round-trip) and
//! `/api/vision` (multipart image upload returning a diagnosis text).

pub mod client;
pub mod error;

pub use {
    client::{BackendClient, DEFAULT_REQUEST_TIMEOUT},
    error::{Error, Result},
};
