//! Wire protocol: message types and the JSON codec.
//!
//! Discovery datagrams and link messages are self-describing JSON objects.
//! The codec never hands raw JSON to callers; everything is classified into
//! a [`messages::WireMessage`] first.

pub mod codec;
pub mod messages;

pub use codec::{decode_datagram, decode_response, decode_value, encode_message, ProtocolError};
pub use messages::{DiscoveryRequest, DiscoveryResponse, MessageKind, WireMessage};
