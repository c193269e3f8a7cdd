//! Inbound event routing.
//!
//! One state machine per inbound channel event: admission against the
//! allow-list, payload classification, dispatch to the chat or vision
//! backend, reply sanitization, and chunked delivery back through the
//! transport. Every failure terminates in at most one user-visible reply.

pub mod chunk;
pub mod error;
pub mod router;
pub mod sanitize;

pub use {
    chunk::{MAX_MESSAGE_LEN, chunk_reply},
    error::{RelayError, reply},
    router::{MessageRouter, Outcome, sender_id_from_address},
    sanitize::strip_emphasis,
};
