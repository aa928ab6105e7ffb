//! Collaborator contracts consumed by the client state machine.
//!
//! The state machine never touches a socket or a cipher directly.  It talks
//! to these traits, and the infrastructure layer supplies implementations
//! (UDP broadcast, TCP JSON lines) or test doubles.
//!
//! - **`broadcast`** – the unreliable datagram channel used for discovery.
//! - **`transport`** – the point-to-point link factory.
//! - **`proof`** – the sign/verify pair used when a shared secret is set.
//! - **`inbound`** – where post-handshake messages are delivered.

pub mod broadcast;
pub mod inbound;
pub mod proof;
pub mod transport;

pub use broadcast::{BroadcastChannel, BroadcastError, BroadcastEvent, BroadcastOpener, DatagramSender};
pub use inbound::{InboundSink, LogSink};
pub use proof::{ProofConfig, ProofScheme, VerificationError};
pub use transport::{Connector, LinkWriter, TransportError, TransportEvent, TransportLink};
