//! All rpclink wire message types.
//!
//! Field names follow the JSON objects exchanged with rpclink servers:
//!
//! ```text
//! discovery request   {"where":"db","encrypted":"..","hash":".."}
//! discovery response  {"name":"db","port":7000,"encrypted":"..","hash":".."}
//! handshake           {"name":"connectSuccess"}
//! ```
//!
//! The proof fields (`encrypted`, `hash`) are only present when the client
//! and server share a secret.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

// ── Protocol constants ────────────────────────────────────────────────────────

/// Reserved message name exchanged by both peers once a link is ready.
pub const HANDSHAKE_NAME: &str = "connectSuccess";

// ── Per-message payload structs ───────────────────────────────────────────────

/// Broadcast by the client to ask which servers provide `service`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryRequest {
    /// Name of the service being searched for.
    #[serde(rename = "where")]
    pub service: String,
    /// Proof ciphertext, filled in by a proof scheme when a secret is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted: Option<String>,
    /// Proof digest accompanying `encrypted`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

impl DiscoveryRequest {
    /// Creates a request without proof fields.
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            encrypted: None,
            hash: None,
        }
    }
}

/// Sent by a server in reply to a [`DiscoveryRequest`].
///
/// The server's address is not part of the payload; it is the source address
/// of the datagram that carried the response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryResponse {
    /// Name of the service the server provides.
    pub name: String,
    /// Port on which the server accepts point-to-point connections.
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

// ── Message variants ──────────────────────────────────────────────────────────

/// Discriminant of a [`WireMessage`], used for logging and error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    DiscoveryRequest,
    DiscoveryResponse,
    Handshake,
    Application,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageKind::DiscoveryRequest => "discovery request",
            MessageKind::DiscoveryResponse => "discovery response",
            MessageKind::Handshake => "handshake",
            MessageKind::Application => "application",
        };
        f.write_str(name)
    }
}

/// Every payload the client can send or receive, after classification.
#[derive(Debug, Clone, PartialEq)]
pub enum WireMessage {
    DiscoveryRequest(DiscoveryRequest),
    DiscoveryResponse(DiscoveryResponse),
    /// The link-ready signal; carries no payload.
    Handshake,
    /// Any other structured message, passed through to the application layer.
    Application(Value),
}

impl WireMessage {
    /// Returns the [`MessageKind`] discriminant for this message.
    pub fn kind(&self) -> MessageKind {
        match self {
            WireMessage::DiscoveryRequest(_) => MessageKind::DiscoveryRequest,
            WireMessage::DiscoveryResponse(_) => MessageKind::DiscoveryResponse,
            WireMessage::Handshake => MessageKind::Handshake,
            WireMessage::Application(_) => MessageKind::Application,
        }
    }

    /// Converts the message back into the JSON object that goes on the wire.
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        match self {
            WireMessage::DiscoveryRequest(req) => serde_json::to_value(req),
            WireMessage::DiscoveryResponse(resp) => serde_json::to_value(resp),
            WireMessage::Handshake => Ok(json!({ "name": HANDSHAKE_NAME })),
            WireMessage::Application(value) => Ok(value.clone()),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
