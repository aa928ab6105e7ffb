//! Broadcast channel contract.

use std::net::SocketAddr;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors raised by a broadcast channel.
#[derive(Debug, Error)]
pub enum BroadcastError {
    /// The datagram socket could not be opened.
    #[error("failed to open broadcast socket on {addr}: {source}")]
    OpenFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    /// A discovery datagram could not be sent.
    #[error("failed to send discovery datagram to port {port}: {source}")]
    SendFailed {
        port: u16,
        #[source]
        source: std::io::Error,
    },
    /// An I/O error occurred while receiving.
    #[error("broadcast channel I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The channel was closed.
    #[error("broadcast channel closed")]
    Closed,
}

/// Something that happened on an open broadcast channel.
#[derive(Debug)]
pub enum BroadcastEvent {
    /// A datagram arrived from `source`.
    Datagram { payload: Vec<u8>, source: SocketAddr },
    /// The channel reported a fault.  It may keep running afterwards.
    Error(BroadcastError),
}

/// Outbound half of a broadcast channel.
#[async_trait]
pub trait DatagramSender: Send + Sync {
    /// Broadcasts `payload` to `port` on the local network.
    async fn send(&self, payload: &[u8], port: u16) -> Result<(), BroadcastError>;

    /// Releases the channel.  Further sends fail and the event stream ends.
    fn close(&self);
}

/// An open broadcast channel: a sender plus the stream of inbound events.
pub struct BroadcastChannel {
    pub sender: Box<dyn DatagramSender>,
    pub events: mpsc::Receiver<BroadcastEvent>,
}

/// Opens broadcast channels.
#[async_trait]
pub trait BroadcastOpener: Send + Sync {
    /// Opens a new channel.  `exclusive` requests a socket that is not shared
    /// with any other owner.
    async fn open(&self, exclusive: bool) -> Result<BroadcastChannel, BroadcastError>;
}
