//! Application-layer delivery of post-handshake messages.

use rpclink_core::ConnectionContext;
use serde_json::Value;
use tracing::debug;

/// Receives every structured message that arrives after the handshake.
pub trait InboundSink: Send + Sync {
    fn deliver(&self, message: Value, context: &ConnectionContext);
}

/// Default sink: logs each message and drops it.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl InboundSink for LogSink {
    fn deliver(&self, message: Value, context: &ConnectionContext) {
        debug!(remote = %context.remote, "inbound message: {message}");
    }
}
