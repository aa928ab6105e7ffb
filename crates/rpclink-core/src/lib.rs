//! # rpclink-core
//!
//! Shared library for the rpclink discovery client containing the wire
//! message types, the JSON codec, and the bookkeeping structures used while
//! choosing which server instance to connect to.
//!
//! It has zero dependencies on sockets, timers, or an async runtime, so every
//! piece of it can be tested with plain `#[test]` functions.
//!
//! # Architecture overview (for beginners)
//!
//! An rpclink client is given a *service name* and nothing else.  It shouts
//! "who serves `db`?" on the local network using a UDP broadcast, picks one of
//! the servers that answers, opens a direct connection to it, and exchanges a
//! short "ready" handshake before any application traffic flows.
//!
//! This crate holds the parts of that process that are pure data:
//!
//! - **`protocol`** – What travels over the network.  Every inbound payload is
//!   parsed into one variant of [`WireMessage`]: a discovery request, a
//!   discovery response, the handshake, or an application message.
//!
//! - **`domain`** – Where candidates live.  A [`Remote`] is a server location,
//!   a [`ServerKey`] identifies it for duplicate suppression, the
//!   [`DedupRegistry`] remembers which candidates were already accepted, and
//!   the [`BackupQueue`] keeps spare candidates for when the current
//!   connection fails.

pub mod domain;
pub mod protocol;

pub use domain::candidates::{BackupQueue, DedupRegistry};
pub use domain::remote::{ConnectionContext, Remote, ServerKey};
pub use protocol::codec::{
    decode_datagram, decode_response, decode_value, encode_message, ProtocolError,
};
pub use protocol::messages::{
    DiscoveryRequest, DiscoveryResponse, MessageKind, WireMessage, HANDSHAKE_NAME,
};
