//! Blockchain networking layer
//!
//! This crate provides the message plumbing the ledger needs from the
//! transport: a typed wire envelope, an outbound broadcast that isolates
//! per-peer failures, and inbound dispatch to per-type handlers.

pub mod dispatch;
pub mod error;
pub mod message;
pub mod peer;

pub use dispatch::{dispatch, serve_connection, MessageHandler};
pub use error::{NetworkError, NetworkResult};
pub use message::{MessageKind, NetworkMessage};
pub use peer::{channel, BroadcastReport, Broadcaster, ChannelSink, PeerSet, PeerSink};
