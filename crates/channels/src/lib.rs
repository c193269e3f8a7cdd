//! Sender admission control and the transport boundary.
//!
//! The router depends only on the abstractions here — an inbound message
//! shape and a reply-sink/media-source trait — never on a concrete
//! messaging client, so transports can be substituted in tests.

pub mod allowlist;
pub mod transport;

pub use {
    allowlist::{Allowlist, is_valid_e164},
    transport::{ChannelTransport, InboundMessage, MediaPayload, MediaRef},
};
