//! Shared types and helpers used across all consult-relay crates.

pub mod types;

pub use types::{ChatMessage, ChatRole, now_ms};
