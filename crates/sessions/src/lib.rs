//! Per-sender conversation sessions with idle expiry and best-effort
//! snapshot persistence.
//!
//! The in-memory map is the source of truth for a running process; the
//! snapshot file exists only to repopulate the store after a restart.

pub mod error;
pub mod snapshot;
pub mod store;

pub use {
    error::{Error, Result},
    store::{DEFAULT_EXPIRY_MINUTES, Session, SessionStore, StoreStats},
};
