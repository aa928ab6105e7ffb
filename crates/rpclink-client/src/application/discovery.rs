//! DiscoveryProtocol: finds a server instance answering to a service name.
//!
//! The client broadcasts a [`DiscoveryRequest`] to the discovery port and
//! keeps re-broadcasting it at the retry interval until a response is
//! accepted.  Broadcast is unreliable and may be answered by several servers,
//! more than once, in any order, so every inbound datagram is screened:
//!
//! ```text
//! undecodable datagram          -> discard (malformed)
//! another message kind          -> discard (unexpected)
//! name != service               -> discard (another service's domain)
//! proof configured and invalid  -> discard (unverified)
//! address^port already accepted -> discard (duplicate)
//! otherwise                     -> record key, accept Remote
//! ```
//!
//! Discards are logged at debug level and never surface as client errors.

use std::net::SocketAddr;
use std::time::Duration;

use rpclink_core::{
    decode_response, encode_message, DedupRegistry, DiscoveryRequest, MessageKind,
    ProtocolError, Remote, WireMessage,
};
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::debug;

use crate::application::client::ClientError;
use crate::application::ports::{DatagramSender, ProofConfig};

/// Why a datagram was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// Not a decodable message.
    Malformed,
    /// A well-formed message that is not a discovery response.
    Unexpected(MessageKind),
    /// A response for a different service name.
    OtherService,
    /// The proof did not verify.
    Unverified,
    /// The candidate was already accepted this cycle.
    Duplicate,
}

/// Outcome of screening one inbound datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Screening {
    Accepted(Remote),
    Discarded(DiscardReason),
}

/// Discovery request/response logic plus the re-broadcast timer.
pub struct DiscoveryProtocol {
    service_name: String,
    discovery_port: u16,
    proof: Option<ProofConfig>,
    resend: Option<Interval>,
}

impl DiscoveryProtocol {
    pub fn new(service_name: impl Into<String>, discovery_port: u16, proof: Option<ProofConfig>) -> Self {
        Self {
            service_name: service_name.into(),
            discovery_port,
            proof,
            resend: None,
        }
    }

    /// Builds a request, with a freshly generated proof when a secret is set.
    pub fn request(&self) -> DiscoveryRequest {
        let mut request = DiscoveryRequest::new(self.service_name.clone());
        if let Some(proof) = &self.proof {
            proof.scheme.generate(&proof.secret, &mut request);
        }
        request
    }

    /// Broadcasts one request to the discovery port.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Encode`] if the request cannot be serialized and
    /// [`ClientError::Broadcast`] if the channel rejects the datagram.
    pub async fn broadcast(&self, sender: &dyn DatagramSender) -> Result<(), ClientError> {
        debug!(
            "search server `{}`, port {}",
            self.service_name, self.discovery_port
        );
        let bytes = encode_message(&WireMessage::DiscoveryRequest(self.request()))?;
        sender.send(&bytes, self.discovery_port).await?;
        Ok(())
    }

    /// Arms the re-broadcast timer.  The first resend is due one `period`
    /// from now; the caller sends the initial request itself.
    pub fn start_resend(&mut self, period: Duration) {
        let mut interval = time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.resend = Some(interval);
    }

    /// Cancels the re-broadcast timer.
    pub fn stop_resend(&mut self) {
        self.resend = None;
    }

    pub fn is_resending(&self) -> bool {
        self.resend.is_some()
    }

    /// Completes when the next resend is due.  Never completes while the
    /// timer is stopped.
    pub async fn resend_due(&mut self) {
        match self.resend.as_mut() {
            Some(interval) => {
                interval.tick().await;
            }
            None => std::future::pending::<()>().await,
        }
    }

    /// Screens one inbound datagram and, if it is accepted, records its key
    /// in `registry`.
    pub fn screen(
        &self,
        payload: &[u8],
        source: SocketAddr,
        registry: &mut DedupRegistry,
    ) -> Screening {
        let response = match decode_response(payload) {
            Ok(response) => response,
            Err(ProtocolError::Unexpected(kind)) => {
                debug!("skip {kind} from {source}");
                return Screening::Discarded(DiscardReason::Unexpected(kind));
            }
            Err(e) => {
                debug!("skip undecodable datagram from {source}: {e}");
                return Screening::Discarded(DiscardReason::Malformed);
            }
        };

        if response.name != self.service_name {
            debug!(
                "skip resp from {source} for service `{}`",
                response.name
            );
            return Screening::Discarded(DiscardReason::OtherService);
        }

        if let Some(proof) = &self.proof {
            if let Err(e) = proof.scheme.verify(&proof.secret, &response) {
                debug!("skip resp from {source}: {e}");
                return Screening::Discarded(DiscardReason::Unverified);
            }
        }

        let remote = Remote::new(source.ip(), response.port);
        if !registry.insert(remote.key()) {
            debug!("duplicate resp from {remote}");
            return Screening::Discarded(DiscardReason::Duplicate);
        }

        Screening::Accepted(remote)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
