//! Point-to-point transport contract.
//!
//! A [`Connector`] turns a [`Remote`] into a [`TransportLink`].  The link is
//! split the same way a TCP stream is split into halves: a shared writer for
//! outbound messages and an event stream for everything inbound.

use std::sync::Arc;

use async_trait::async_trait;
use rpclink_core::Remote;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors raised by a transport link.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The connection to the remote could not be established.
    #[error("failed to connect to {remote}: {source}")]
    ConnectFailed {
        remote: Remote,
        #[source]
        source: std::io::Error,
    },
    /// An I/O error occurred on an established link.
    #[error("link I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// An inbound frame was not valid JSON.
    #[error("failed to decode inbound message: {0}")]
    Decode(#[source] serde_json::Error),
    /// An outbound message could not be serialized.
    #[error("failed to encode outbound message: {0}")]
    Encode(#[source] serde_json::Error),
    /// The link has already been ended.
    #[error("link has ended")]
    Ended,
}

/// Something that happened on a transport link.
#[derive(Debug)]
pub enum TransportEvent {
    /// A structured message arrived.
    Message(Value),
    /// A fault was observed.  The link is not necessarily closed.
    Error(TransportError),
    /// The link closed, from either side.  Always the last event.
    Closed,
}

/// Outbound half of a transport link.
pub trait LinkWriter: Send + Sync {
    /// Queues `message` for delivery to the peer.
    fn send(&self, message: &Value) -> Result<(), TransportError>;

    /// Ends the link.  A [`TransportEvent::Closed`] follows on the event stream.
    fn end(&self);
}

/// An established transport link.
pub struct TransportLink {
    pub writer: Arc<dyn LinkWriter>,
    pub events: mpsc::Receiver<TransportEvent>,
}

/// Opens transport links.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connects to `remote`.  `protocol_prefix` namespaces the link for the
    /// server (the client's address prefix).
    async fn connect(
        &self,
        remote: Remote,
        protocol_prefix: &str,
    ) -> Result<TransportLink, TransportError>;
}
