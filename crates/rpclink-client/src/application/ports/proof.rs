//! Shared-secret proof contract.
//!
//! When client and server share a secret, every discovery request carries a
//! proof and every response must carry one that verifies.  The algorithm is
//! supplied by the caller; the client only calls `generate` and `verify`.

use std::fmt;
use std::sync::Arc;

use rpclink_core::{DiscoveryRequest, DiscoveryResponse};
use thiserror::Error;

/// Why a response's proof was rejected.
#[derive(Debug, Error, PartialEq)]
pub enum VerificationError {
    #[error("response carries no proof")]
    MissingProof,
    #[error("proof does not match the shared secret")]
    Mismatch,
    #[error("proof scheme failure: {0}")]
    Scheme(String),
}

/// Generates and verifies discovery proofs.
#[cfg_attr(test, mockall::automock)]
pub trait ProofScheme: Send + Sync {
    /// Adds proof fields (`encrypted`, `hash`) to an outbound request.
    fn generate(&self, secret: &str, request: &mut DiscoveryRequest);

    /// Checks the proof fields of an inbound response.
    fn verify(&self, secret: &str, response: &DiscoveryResponse) -> Result<(), VerificationError>;
}

/// A shared secret together with the scheme that uses it.
#[derive(Clone)]
pub struct ProofConfig {
    pub secret: String,
    pub scheme: Arc<dyn ProofScheme>,
}

impl ProofConfig {
    pub fn new(secret: impl Into<String>, scheme: Arc<dyn ProofScheme>) -> Self {
        Self {
            secret: secret.into(),
            scheme,
        }
    }
}

impl fmt::Debug for ProofConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProofConfig")
            .field("secret", &"<redacted>")
            .finish_non_exhaustive()
    }
}
