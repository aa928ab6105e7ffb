//! Server locations and the identities derived from them.

use std::fmt;
use std::net::{IpAddr, SocketAddr};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A candidate server's network location.
///
/// `address` is the source address of the discovery response datagram;
/// `port` is the port the server announced inside that response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Remote {
    pub address: IpAddr,
    pub port: u16,
}

impl Remote {
    pub fn new(address: IpAddr, port: u16) -> Self {
        Self { address, port }
    }

    /// Returns the de-duplication key for this candidate.
    pub fn key(&self) -> ServerKey {
        ServerKey {
            address: self.address,
            port: self.port,
        }
    }

    /// Returns the socket address a transport should connect to.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }
}

impl fmt::Display for Remote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.socket_addr())
    }
}

/// Identifies a candidate for duplicate suppression: address + announced port.
///
/// Two responses from the same host announcing different ports are different
/// candidates; the same host announcing the same port twice is a duplicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServerKey {
    address: IpAddr,
    port: u16,
}

impl fmt::Display for ServerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}^{}", self.address, self.port)
    }
}

/// Attached to every event about one connection attempt.
///
/// The `attempt_id` is fresh for each attempt, so a `closed` event can be
/// matched to the `connection` event that preceded it even when the same
/// remote is connected to more than once.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionContext {
    pub attempt_id: Uuid,
    pub remote: Remote,
}

impl ConnectionContext {
    pub fn new(remote: Remote) -> Self {
        Self {
            attempt_id: Uuid::new_v4(),
            remote,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
