//! ConnectionManager: turns one selected [`Remote`] into a handshaked link.
//!
//! Each attempt runs a small task that opens the transport and forwards every
//! link event to the client's driver task, tagged with the attempt's id.  All
//! decisions (handshake, binding, event emission) are made on the driver task
//! by [`ConnectionManager::on_transport_event`], so observers are never called
//! concurrently.
//!
//! # Handshake
//!
//! ```text
//! Client                               Server
//! ──────                               ──────
//! connect(remote, prefix)  ─────────▶
//!                          ◀─────────  {"name":"connectSuccess"}
//! bind sender, emit `connection`
//! {"name":"connectSuccess"} ────────▶
//!                          ◀────────▶  application traffic
//! ```
//!
//! Only the first message received before the handshake is inspected.  If it
//! is anything else the attempt never becomes ready; it sits until the link
//! closes and the normal retry takes over.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use rpclink_core::{decode_value, ConnectionContext, Remote, WireMessage};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::application::client::ClientError;
use crate::application::events::EventHub;
use crate::application::ports::{
    Connector, InboundSink, LinkWriter, TransportError, TransportEvent,
};

// ── Outbound sender ───────────────────────────────────────────────────────────

/// The application's outbound path, bound to whichever link is ready.
///
/// Cloned into the public handle; bound and unbound by the connection
/// manager.  While unbound, sends fail with [`ClientError::NotConnected`].
#[derive(Clone, Default)]
pub struct OutboundSender {
    bound: Arc<Mutex<Option<Arc<dyn LinkWriter>>>>,
}

impl OutboundSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sends `message` over the bound link.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotConnected`] when no link is bound and
    /// [`ClientError::Transport`] when the link rejects the message.
    pub fn send(&self, message: &Value) -> Result<(), ClientError> {
        let writer = self.lock().clone().ok_or(ClientError::NotConnected)?;
        writer.send(message)?;
        Ok(())
    }

    pub fn is_bound(&self) -> bool {
        self.lock().is_some()
    }

    pub(crate) fn bind(&self, writer: Arc<dyn LinkWriter>) {
        *self.lock() = Some(writer);
    }

    pub(crate) fn unbind(&self) {
        *self.lock() = None;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Arc<dyn LinkWriter>>> {
        self.bound.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

// ── Attempt events ────────────────────────────────────────────────────────────

/// A link event forwarded from an attempt task to the driver task.
pub(crate) struct AttemptEvent {
    pub attempt_id: Uuid,
    pub kind: AttemptEventKind,
}

pub(crate) enum AttemptEventKind {
    /// The transport connected; the link is not yet usable.
    TransportUp(Arc<dyn LinkWriter>),
    Transport(TransportEvent),
}

/// What the driver should do after an event was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AttemptStatus {
    Running,
    Closed { was_ready: bool },
}

/// Collaborators the manager calls while handling an event.
pub(crate) struct AttemptHooks<'a> {
    pub events: &'a EventHub,
    pub sender: &'a OutboundSender,
    pub sink: &'a dyn InboundSink,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Connecting,
    AwaitingHandshake,
    /// The first message was not a handshake.
    Stalled,
    Ready,
    Finished,
}

// ── Connection manager ────────────────────────────────────────────────────────

/// One in-flight connection attempt.
pub struct ConnectionManager {
    context: ConnectionContext,
    phase: Phase,
    writer: Option<Arc<dyn LinkWriter>>,
    cancelled: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl ConnectionManager {
    /// Starts an attempt to `remote`.  Link events are forwarded on `events`.
    pub(crate) fn start(
        remote: Remote,
        protocol_prefix: &str,
        connector: Arc<dyn Connector>,
        events: mpsc::Sender<AttemptEvent>,
    ) -> Self {
        let context = ConnectionContext::new(remote);
        let cancelled = Arc::new(AtomicBool::new(false));
        let task = tokio::spawn(run_attempt(
            context.attempt_id,
            remote,
            protocol_prefix.to_string(),
            connector,
            events,
            Arc::clone(&cancelled),
        ));
        Self {
            context,
            phase: Phase::Connecting,
            writer: None,
            cancelled,
            task,
        }
    }

    pub fn context(&self) -> &ConnectionContext {
        &self.context
    }

    pub fn attempt_id(&self) -> Uuid {
        self.context.attempt_id
    }

    pub fn is_ready(&self) -> bool {
        self.phase == Phase::Ready
    }

    pub(crate) fn on_transport_up(&mut self, writer: Arc<dyn LinkWriter>) {
        debug!("RPC connect to server {} (transport up)", self.context.remote);
        self.writer = Some(writer);
        if self.phase == Phase::Connecting {
            self.phase = Phase::AwaitingHandshake;
        }
    }

    pub(crate) fn on_transport_event(
        &mut self,
        event: TransportEvent,
        hooks: &AttemptHooks<'_>,
    ) -> AttemptStatus {
        match event {
            TransportEvent::Message(value) => {
                self.on_message(value, hooks);
                AttemptStatus::Running
            }
            TransportEvent::Error(e) => {
                warn!("RPC link error on {}: {e}", self.context.remote);
                hooks
                    .events
                    .emit_error(&ClientError::Transport(e), Some(&self.context));
                AttemptStatus::Running
            }
            TransportEvent::Closed => {
                debug!("RPC connect close {}", self.context.remote);
                let was_ready = self.phase == Phase::Ready;
                self.phase = Phase::Finished;
                self.writer = None;
                hooks.sender.unbind();
                AttemptStatus::Closed { was_ready }
            }
        }
    }

    /// Ends the attempt without scheduling anything further.  Late events from
    /// its task are never delivered.
    pub(crate) fn cancel(mut self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.task.abort();
        if let Some(writer) = self.writer.take() {
            writer.end();
        }
        self.phase = Phase::Finished;
    }

    fn on_message(&mut self, value: Value, hooks: &AttemptHooks<'_>) {
        match self.phase {
            // Once ready the link carries application traffic only.
            Phase::Ready => hooks.sink.deliver(value, &self.context),
            Phase::Connecting | Phase::AwaitingHandshake => match decode_value(value) {
                Ok(WireMessage::Handshake) => self.become_ready(hooks),
                Ok(other) => {
                    warn!(
                        "first message from {} was {}, not a handshake; link stays unready",
                        self.context.remote,
                        other.kind()
                    );
                    self.phase = Phase::Stalled;
                }
                Err(e) => {
                    warn!(
                        "first message from {} was undecodable ({e}); link stays unready",
                        self.context.remote
                    );
                    self.phase = Phase::Stalled;
                }
            },
            Phase::Stalled | Phase::Finished => {
                debug!("drop message on unready link {}", self.context.remote);
            }
        }
    }

    fn become_ready(&mut self, hooks: &AttemptHooks<'_>) {
        let Some(writer) = self.writer.clone() else {
            return;
        };
        self.phase = Phase::Ready;
        hooks.sender.bind(Arc::clone(&writer));
        info!("RPC link ready: {}", self.context.remote);
        hooks.events.emit_connection(&self.context);

        let reply = WireMessage::Handshake
            .to_value()
            .map_err(TransportError::Encode)
            .and_then(|value| writer.send(&value));
        if let Err(e) = reply {
            hooks
                .events
                .emit_error(&ClientError::Transport(e), Some(&self.context));
        }
    }
}

/// Body of the per-attempt task: connect, then forward link events until the
/// link closes or the driver goes away.
async fn run_attempt(
    attempt_id: Uuid,
    remote: Remote,
    protocol_prefix: String,
    connector: Arc<dyn Connector>,
    events: mpsc::Sender<AttemptEvent>,
    cancelled: Arc<AtomicBool>,
) {
    let forward = |kind| AttemptEvent { attempt_id, kind };

    let mut link = match connector.connect(remote, &protocol_prefix).await {
        Ok(link) => link,
        Err(e) => {
            let _ = events
                .send(forward(AttemptEventKind::Transport(TransportEvent::Error(e))))
                .await;
            let _ = events
                .send(forward(AttemptEventKind::Transport(TransportEvent::Closed)))
                .await;
            return;
        }
    };

    if cancelled.load(Ordering::SeqCst) {
        link.writer.end();
        return;
    }

    let writer = Arc::clone(&link.writer);
    if events
        .send(forward(AttemptEventKind::TransportUp(Arc::clone(&writer))))
        .await
        .is_err()
    {
        writer.end();
        return;
    }

    loop {
        let event = link.events.recv().await.unwrap_or(TransportEvent::Closed);
        let closed = matches!(event, TransportEvent::Closed);
        if events
            .send(forward(AttemptEventKind::Transport(event)))
            .await
            .is_err()
        {
            writer.end();
            return;
        }
        if closed {
            return;
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
