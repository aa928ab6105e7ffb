//! rpclink-client library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does rpclink-client do? (for beginners)
//!
//! Given only a service name, the client finds a server on the local network
//! and keeps a live point-to-point link to it:
//!
//! 1. Broadcasts a discovery request (`{"where":"<service>"}`) on the
//!    discovery port, repeating it every retry interval.
//! 2. Takes the first server that answers for that service, remembering any
//!    later answers as backups.
//! 3. Connects to it and waits for the `connectSuccess` handshake.  Only then
//!    is the link usable and the `connection` event fired.
//! 4. When the link drops, waits the retry delay, then tries the most recent
//!    backup or starts discovering again.
//!
//! The caller never drives any of this; it only observes events and sends
//! messages through the [`ClientHandle`].

use std::sync::Arc;

/// Application layer: the state machine and the ports it depends on.
pub mod application;

/// Infrastructure layer: UDP, TCP and config file adapters.
pub mod infrastructure;

pub use application::client::{ClientBuilder, ClientError, ClientHandle, ClientSettings, ClientState};
pub use application::ports::{InboundSink, ProofConfig, ProofScheme};
pub use application::retry::{FixedRetry, RetryPolicy};

/// Connects with the default adapters: UDP broadcast to `255.255.255.255`
/// and newline-delimited JSON over TCP.
///
/// Must be called from within a Tokio runtime.  Use [`ClientBuilder`] to
/// register observers before the client starts or to swap adapters.
///
/// # Errors
///
/// Returns [`ClientError::InvalidArgument`] if any argument is empty or zero.
pub fn connect(
    address_prefix: &str,
    discovery_port: u16,
    service_name: &str,
    proof: Option<ProofConfig>,
) -> Result<ClientHandle, ClientError> {
    let mut settings = ClientSettings::new(address_prefix, discovery_port, service_name);
    settings.proof = proof;
    ClientBuilder::new(settings).connect(
        Arc::new(infrastructure::broadcast::UdpBroadcast::default()),
        Arc::new(infrastructure::transport::TcpJsonConnector),
    )
}
