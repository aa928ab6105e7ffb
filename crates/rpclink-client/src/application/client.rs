//! ClientStateMachine: the discovery → connect → retry loop behind a
//! [`ClientHandle`].
//!
//! # State machine (for beginners)
//!
//! ```text
//!            broadcast open
//!   Init ─────────────────────▶ Searching ◀──────────────┐
//!                                  │                      │ retry delay
//!            accepted response     │                      │ elapsed, no backup
//!                                  ▼                      │
//!                              Connected ─── link closed ─┘
//!                                  │  ▲
//!          accepted response       │  │ retry delay elapsed,
//!          → BackupQueue           └──┘ backup popped
//!
//!   any state ── close() ──▶ Closed (terminal)
//! ```
//!
//! `Connected` means "a candidate was selected and an attempt is in flight".
//! Whether the link is usable is reported separately by the `connection`
//! event once the handshake completes.
//!
//! # Concurrency
//!
//! Everything runs on a single driver task spawned by
//! [`ClientBuilder::connect`].  The task `select!`s over:
//!
//! - commands from the [`ClientHandle`] (only `Close` today),
//! - broadcast channel events (discovery responses and faults),
//! - the discovery re-broadcast timer,
//! - the one-shot retry timer armed after a link closes,
//! - link events forwarded by the active attempt's task.
//!
//! Observers are therefore never called concurrently, and an event from a
//! superseded attempt is recognised by its attempt id and ignored.

use std::sync::Arc;
use std::time::Duration;

use rpclink_core::{BackupQueue, ConnectionContext, DedupRegistry, ProtocolError, Remote};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{self, Instant};
use tracing::{debug, error, info, warn};

use crate::application::connection::{
    AttemptEvent, AttemptEventKind, AttemptHooks, AttemptStatus, ConnectionManager,
    OutboundSender,
};
use crate::application::discovery::{DiscoveryProtocol, Screening};
use crate::application::events::EventHub;
use crate::application::ports::{
    BroadcastChannel, BroadcastError, BroadcastEvent, BroadcastOpener, Connector,
    DatagramSender, InboundSink, LogSink, ProofConfig, ProofScheme, TransportError,
};
use crate::application::retry::{effective_delay, FixedRetry, RetryPolicy};

/// Capacity of the channel carrying link events from attempt tasks.
const ATTEMPT_EVENT_CAPACITY: usize = 64;

// ── Public types ──────────────────────────────────────────────────────────────

/// Lifecycle state of a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientState {
    /// Created; the broadcast channel is not open yet.
    Init,
    /// Broadcasting discovery requests.
    Searching,
    /// A candidate was selected and a connection attempt is in flight (or
    /// waiting out the retry delay after it closed).
    Connected,
    /// Shut down.  Terminal.
    Closed,
}

/// Errors surfaced by the client, either from a call or through the `error`
/// event.
#[derive(Debug, Error)]
pub enum ClientError {
    /// An argument to `connect` was empty or zero.
    #[error("invalid argument: {0} must not be empty")]
    InvalidArgument(&'static str),
    /// The broadcast channel reported a fault.
    #[error("broadcast channel error: {0}")]
    Broadcast(#[from] BroadcastError),
    /// A transport link reported a fault.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    /// A message could not be encoded for the wire.
    #[error("encode error: {0}")]
    Encode(#[from] ProtocolError),
    /// `send` was called while no link is ready.
    #[error("no ready link to send on")]
    NotConnected,
    /// The client has been closed.
    #[error("client is closed")]
    Closed,
}

/// What the client connects to and how it proves itself.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    /// Passed to the transport to namespace the link.
    pub address_prefix: String,
    /// UDP port discovery requests are broadcast to.
    pub discovery_port: u16,
    /// Service name servers must answer to.
    pub service_name: String,
    /// Shared secret, when requests and responses carry a proof.
    pub proof: Option<ProofConfig>,
}

impl ClientSettings {
    pub fn new(
        address_prefix: impl Into<String>,
        discovery_port: u16,
        service_name: impl Into<String>,
    ) -> Self {
        Self {
            address_prefix: address_prefix.into(),
            discovery_port,
            service_name: service_name.into(),
            proof: None,
        }
    }

    /// Requires every request and response to carry a proof for `secret`.
    pub fn with_proof(mut self, secret: impl Into<String>, scheme: Arc<dyn ProofScheme>) -> Self {
        self.proof = Some(ProofConfig::new(secret, scheme));
        self
    }

    /// Checks that no required field is empty.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidArgument`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ClientError> {
        if self.address_prefix.is_empty() {
            return Err(ClientError::InvalidArgument("address prefix"));
        }
        if self.discovery_port == 0 {
            return Err(ClientError::InvalidArgument("discovery port"));
        }
        if self.service_name.is_empty() {
            return Err(ClientError::InvalidArgument("service name"));
        }
        if matches!(&self.proof, Some(p) if p.secret.is_empty()) {
            return Err(ClientError::InvalidArgument("proof secret"));
        }
        Ok(())
    }
}

// ── Builder ───────────────────────────────────────────────────────────────────

/// Configures and starts a client.
///
/// Observers registered here are in place before the driver task starts, so
/// no event can be missed.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use rpclink_client::application::client::{ClientBuilder, ClientSettings};
/// use rpclink_client::infrastructure::broadcast::UdpBroadcast;
/// use rpclink_client::infrastructure::transport::TcpJsonConnector;
///
/// # async fn run() -> Result<(), rpclink_client::application::client::ClientError> {
/// let client = ClientBuilder::new(ClientSettings::new("rpc", 24802, "db"))
///     .on_connection(|ctx| println!("ready: {}", ctx.remote))
///     .connect(Arc::new(UdpBroadcast::default()), Arc::new(TcpJsonConnector))?;
/// client.close().await;
/// # Ok(())
/// # }
/// ```
pub struct ClientBuilder {
    settings: ClientSettings,
    retry: Arc<dyn RetryPolicy>,
    sink: Arc<dyn InboundSink>,
    events: Arc<EventHub>,
}

impl ClientBuilder {
    pub fn new(settings: ClientSettings) -> Self {
        Self {
            settings,
            retry: Arc::new(FixedRetry::default()),
            sink: Arc::new(LogSink),
            events: Arc::new(EventHub::new()),
        }
    }

    pub fn retry_policy(mut self, policy: impl RetryPolicy + 'static) -> Self {
        self.retry = Arc::new(policy);
        self
    }

    /// Where post-handshake messages are delivered.  Defaults to [`LogSink`].
    pub fn inbound(mut self, sink: impl InboundSink + 'static) -> Self {
        self.sink = Arc::new(sink);
        self
    }

    pub fn on_connection<F>(self, f: F) -> Self
    where
        F: Fn(&ConnectionContext) + Send + Sync + 'static,
    {
        self.events.on_connection(f);
        self
    }

    pub fn on_closed<F>(self, f: F) -> Self
    where
        F: Fn(&ConnectionContext) + Send + Sync + 'static,
    {
        self.events.on_closed(f);
        self
    }

    pub fn on_error<F>(self, f: F) -> Self
    where
        F: Fn(&ClientError, Option<&ConnectionContext>) + Send + Sync + 'static,
    {
        self.events.on_error(f);
        self
    }

    pub fn on_close<F>(self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.events.on_close(f);
        self
    }

    /// Validates the settings and spawns the driver task.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidArgument`] if the settings are incomplete.
    /// Faults opening the broadcast channel are reported through the `error`
    /// event instead.
    pub fn connect(
        self,
        opener: Arc<dyn BroadcastOpener>,
        connector: Arc<dyn Connector>,
    ) -> Result<ClientHandle, ClientError> {
        self.settings.validate()?;

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ClientState::Init);
        let (attempt_tx, attempt_rx) = mpsc::channel(ATTEMPT_EVENT_CAPACITY);
        let sender = OutboundSender::new();

        info!(
            "RPC client for `{}` starting (discovery port {})",
            self.settings.service_name, self.settings.discovery_port
        );

        let driver = Driver {
            discovery: DiscoveryProtocol::new(
                self.settings.service_name.clone(),
                self.settings.discovery_port,
                self.settings.proof.clone(),
            ),
            settings: self.settings,
            registry: DedupRegistry::new(),
            backups: BackupQueue::new(),
            retry: self.retry,
            connector,
            sink: self.sink,
            events: Arc::clone(&self.events),
            sender: sender.clone(),
            state: state_tx,
            attempt: None,
            attempt_tx,
            attempt_rx,
            retry_at: None,
        };
        tokio::spawn(driver.run(opener, command_rx));

        Ok(ClientHandle {
            commands: command_tx,
            state: state_rx,
            events: self.events,
            sender,
        })
    }
}

// ── Handle ────────────────────────────────────────────────────────────────────

enum Command {
    Close(oneshot::Sender<()>),
}

/// The caller's view of a running client.
///
/// Cloning is cheap; every clone controls the same client.  When the last
/// clone is dropped the client shuts down as if [`close`](Self::close) had
/// been called.
#[derive(Clone)]
pub struct ClientHandle {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ClientState>,
    events: Arc<EventHub>,
    sender: OutboundSender,
}

impl ClientHandle {
    pub fn state(&self) -> ClientState {
        *self.state.borrow()
    }

    /// Sends an application message over the ready link.
    ///
    /// # Errors
    ///
    /// [`ClientError::Closed`] after shutdown, [`ClientError::NotConnected`]
    /// while no link has completed its handshake.
    pub fn send(&self, message: &Value) -> Result<(), ClientError> {
        if self.state() == ClientState::Closed {
            return Err(ClientError::Closed);
        }
        self.sender.send(message)
    }

    pub fn on_connection<F>(&self, f: F)
    where
        F: Fn(&ConnectionContext) + Send + Sync + 'static,
    {
        self.events.on_connection(f);
    }

    pub fn on_closed<F>(&self, f: F)
    where
        F: Fn(&ConnectionContext) + Send + Sync + 'static,
    {
        self.events.on_closed(f);
    }

    pub fn on_error<F>(&self, f: F)
    where
        F: Fn(&ClientError, Option<&ConnectionContext>) + Send + Sync + 'static,
    {
        self.events.on_error(f);
    }

    pub fn on_close<F>(&self, f: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.events.on_close(f);
    }

    /// Shuts the client down and waits until teardown has finished.
    ///
    /// Idempotent: later calls return immediately and `close` fires once.
    pub async fn close(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.commands.send(Command::Close(ack_tx)).is_ok() {
            // Err means the driver already exited.
            let _ = ack_rx.await;
        }
    }

    /// Completes once the client reaches [`ClientState::Closed`].
    pub async fn wait_closed(&self) {
        let mut state = self.state.clone();
        let _ = state.wait_for(|s| *s == ClientState::Closed).await;
    }
}

// ── Driver ────────────────────────────────────────────────────────────────────

struct Driver {
    settings: ClientSettings,
    discovery: DiscoveryProtocol,
    registry: DedupRegistry,
    backups: BackupQueue,
    retry: Arc<dyn RetryPolicy>,
    connector: Arc<dyn Connector>,
    sink: Arc<dyn InboundSink>,
    events: Arc<EventHub>,
    sender: OutboundSender,
    state: watch::Sender<ClientState>,
    attempt: Option<ConnectionManager>,
    attempt_tx: mpsc::Sender<AttemptEvent>,
    attempt_rx: mpsc::Receiver<AttemptEvent>,
    /// Deadline of the post-close backoff, when one is pending.
    retry_at: Option<Instant>,
}

impl Driver {
    async fn run(
        mut self,
        opener: Arc<dyn BroadcastOpener>,
        mut commands: mpsc::UnboundedReceiver<Command>,
    ) {
        let opened = tokio::select! {
            command = commands.recv() => {
                self.shutdown(None, command);
                return;
            }
            opened = opener.open(true) => opened,
        };

        let BroadcastChannel {
            sender: broadcast,
            events: mut broadcast_events,
        } = match opened {
            Ok(channel) => channel,
            Err(e) => {
                error!("failed to open broadcast channel: {e}");
                self.events.emit_error(&ClientError::Broadcast(e), None);
                let command = commands.recv().await;
                self.shutdown(None, command);
                return;
            }
        };

        self.begin_cycle(broadcast.as_ref()).await;

        let mut broadcast_open = true;
        loop {
            tokio::select! {
                command = commands.recv() => {
                    self.shutdown(Some(broadcast.as_ref()), command);
                    return;
                }
                event = broadcast_events.recv(), if broadcast_open => match event {
                    Some(event) => self.on_broadcast_event(event),
                    None => {
                        warn!("broadcast channel event stream ended");
                        broadcast_open = false;
                    }
                },
                _ = self.discovery.resend_due() => {
                    self.rebroadcast(broadcast.as_ref()).await;
                }
                _ = sleep_until_some(self.retry_at) => {
                    self.retry_at = None;
                    self.on_retry_due(broadcast.as_ref()).await;
                }
                Some(event) = self.attempt_rx.recv() => self.on_attempt_event(event),
            }
        }
    }

    fn set_state(&self, next: ClientState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!("client state {previous:?} -> {next:?}");
        }
    }

    fn current_state(&self) -> ClientState {
        *self.state.borrow()
    }

    fn retry_delay(&self) -> Duration {
        effective_delay(self.retry.as_ref())
    }

    /// Starts a new discovery cycle: one request now, then one per retry
    /// interval until a response is accepted.
    async fn begin_cycle(&mut self, broadcast: &dyn DatagramSender) {
        self.set_state(ClientState::Searching);
        let delay = self.retry_delay();
        self.discovery.start_resend(delay);
        self.rebroadcast(broadcast).await;
    }

    async fn rebroadcast(&self, broadcast: &dyn DatagramSender) {
        if let Err(e) = self.discovery.broadcast(broadcast).await {
            error!("discovery broadcast failed: {e}");
            self.events.emit_error(&e, None);
        }
    }

    fn on_broadcast_event(&mut self, event: BroadcastEvent) {
        match event {
            BroadcastEvent::Datagram { payload, source } => {
                if let Screening::Accepted(remote) =
                    self.discovery.screen(&payload, source, &mut self.registry)
                {
                    self.on_candidate(remote);
                }
            }
            BroadcastEvent::Error(e) => {
                error!("broadcast channel fault: {e}");
                self.events.emit_error(&ClientError::Broadcast(e), None);
            }
        }
    }

    fn on_candidate(&mut self, remote: Remote) {
        self.discovery.stop_resend();
        if self.current_state() == ClientState::Connected {
            info!("add backup server {remote}");
            self.backups.push(remote);
        } else {
            info!("selected server {remote}");
            self.set_state(ClientState::Connected);
            self.start_attempt(remote);
        }
    }

    fn start_attempt(&mut self, remote: Remote) {
        self.attempt = Some(ConnectionManager::start(
            remote,
            &self.settings.address_prefix,
            Arc::clone(&self.connector),
            self.attempt_tx.clone(),
        ));
    }

    fn on_attempt_event(&mut self, event: AttemptEvent) {
        let Some(attempt) = self
            .attempt
            .as_mut()
            .filter(|a| a.attempt_id() == event.attempt_id)
        else {
            debug!("drop event from superseded attempt {}", event.attempt_id);
            if let AttemptEventKind::TransportUp(writer) = event.kind {
                writer.end();
            }
            return;
        };

        let event = match event.kind {
            AttemptEventKind::TransportUp(writer) => {
                attempt.on_transport_up(writer);
                return;
            }
            AttemptEventKind::Transport(event) => event,
        };

        let hooks = AttemptHooks {
            events: &self.events,
            sender: &self.sender,
            sink: self.sink.as_ref(),
        };
        let AttemptStatus::Closed { was_ready } = attempt.on_transport_event(event, &hooks) else {
            return;
        };

        let Some(finished) = self.attempt.take() else {
            return;
        };
        let context = finished.context().clone();
        self.registry.remove(&context.remote.key());
        if was_ready {
            info!("RPC link to {} closed", context.remote);
            self.events.emit_closed(&context);
        }
        self.schedule_retry();
    }

    fn schedule_retry(&mut self) {
        let delay = self.retry_delay();
        debug!("retry in {delay:?}");
        self.retry_at = Some(Instant::now() + delay);
    }

    async fn on_retry_due(&mut self, broadcast: &dyn DatagramSender) {
        self.set_state(ClientState::Searching);
        match self.backups.pop() {
            Some(remote) => {
                info!("try backup server {remote}");
                self.set_state(ClientState::Connected);
                self.start_attempt(remote);
            }
            None => self.begin_cycle(broadcast).await,
        }
    }

    fn shutdown(&mut self, broadcast: Option<&dyn DatagramSender>, command: Option<Command>) {
        info!("RPC client for `{}` closing", self.settings.service_name);
        self.set_state(ClientState::Closed);
        self.discovery.stop_resend();
        self.retry_at = None;
        if let Some(attempt) = self.attempt.take() {
            attempt.cancel();
        }
        if let Some(broadcast) = broadcast {
            broadcast.close();
        }
        self.sender.unbind();
        self.registry.clear();
        self.backups.clear();

        self.events.emit_close();
        self.events.release();

        if let Some(Command::Close(ack)) = command {
            let _ = ack.send(());
        }
    }
}

/// Sleeps until `deadline`, or forever when there is none.
async fn sleep_until_some(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;
    use crate::application::ports::proof::MockProofScheme;
    use crate::application::retry::MockRetryPolicy;
    use crate::infrastructure::broadcast::mock::MockBroadcast;
    use crate::infrastructure::transport::mock::MockConnector;
    use serde_json::json;

    fn settings() -> ClientSettings {
        ClientSettings::new("rpc", 24802, "db")
    }

    async fn settle() {
        time::sleep(Duration::from_millis(1)).await;
    }

    #[test]
    fn test_validate_rejects_empty_fields() {
        assert!(matches!(
            ClientSettings::new("", 1, "db").validate(),
            Err(ClientError::InvalidArgument("address prefix"))
        ));
        assert!(matches!(
            ClientSettings::new("rpc", 0, "db").validate(),
            Err(ClientError::InvalidArgument("discovery port"))
        ));
        assert!(matches!(
            ClientSettings::new("rpc", 1, "").validate(),
            Err(ClientError::InvalidArgument("service name"))
        ));
        let no_secret = settings().with_proof("", Arc::new(MockProofScheme::new()));
        assert!(matches!(
            no_secret.validate(),
            Err(ClientError::InvalidArgument("proof secret"))
        ));
        assert!(settings().validate().is_ok());
    }

    #[tokio::test]
    async fn test_connect_with_invalid_settings_fails_synchronously() {
        let result = ClientBuilder::new(ClientSettings::new("rpc", 24802, ""))
            .connect(Arc::new(MockBroadcast::new()), Arc::new(MockConnector::new()));

        assert!(matches!(result, Err(ClientError::InvalidArgument("service name"))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_exclusive_channel_and_starts_searching() {
        // Arrange
        let broadcast = MockBroadcast::new();

        // Act
        let client = ClientBuilder::new(settings())
            .connect(Arc::new(broadcast.clone()), Arc::new(MockConnector::new()))
            .unwrap();
        settle().await;

        // Assert
        assert_eq!(client.state(), ClientState::Searching);
        assert_eq!(broadcast.opened_exclusive(), Some(true));
        assert_eq!(broadcast.sent_requests(), vec![json!({ "where": "db" })]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_failure_is_reported_and_client_stays_init() {
        // Arrange
        let errors = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&errors);

        // Act
        let client = ClientBuilder::new(settings())
            .on_error(move |e, ctx| {
                assert!(matches!(e, ClientError::Broadcast(_)));
                assert!(ctx.is_none());
                seen.fetch_add(1, Ordering::SeqCst);
            })
            .connect(Arc::new(MockBroadcast::failing()), Arc::new(MockConnector::new()))
            .unwrap();
        settle().await;

        // Assert
        assert_eq!(errors.load(Ordering::SeqCst), 1);
        assert_eq!(client.state(), ClientState::Init);
        client.close().await;
        assert_eq!(client.state(), ClientState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_policy_sets_rebroadcast_interval() {
        // Arrange
        let mut policy = MockRetryPolicy::new();
        policy
            .expect_retry_delay()
            .return_const(Duration::from_millis(200));
        let broadcast = MockBroadcast::new();
        let _client = ClientBuilder::new(settings())
            .retry_policy(policy)
            .connect(Arc::new(broadcast.clone()), Arc::new(MockConnector::new()))
            .unwrap();
        settle().await;

        // Act
        time::sleep(Duration::from_millis(450)).await;

        // Assert: initial request plus two resends
        assert_eq!(broadcast.sent_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_before_handshake_is_not_connected() {
        let client = ClientBuilder::new(settings())
            .connect(Arc::new(MockBroadcast::new()), Arc::new(MockConnector::new()))
            .unwrap();
        settle().await;

        let result = client.send(&json!({ "op": "ping" }));

        assert!(matches!(result, Err(ClientError::NotConnected)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_after_close_reports_closed() {
        let client = ClientBuilder::new(settings())
            .connect(Arc::new(MockBroadcast::new()), Arc::new(MockConnector::new()))
            .unwrap();
        client.close().await;

        let result = client.send(&json!({ "op": "ping" }));

        assert!(matches!(result, Err(ClientError::Closed)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_last_handle_closes_client() {
        // Arrange
        let broadcast = MockBroadcast::new();
        let closes = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&closes);
        let client = ClientBuilder::new(settings())
            .on_close(move || *counter.lock().unwrap() += 1)
            .connect(Arc::new(broadcast.clone()), Arc::new(MockConnector::new()))
            .unwrap();
        settle().await;

        // Act
        drop(client);
        settle().await;

        // Assert
        assert_eq!(*closes.lock().unwrap(), 1);
        assert!(broadcast.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_closed_completes_after_close() {
        let client = ClientBuilder::new(settings())
            .connect(Arc::new(MockBroadcast::new()), Arc::new(MockConnector::new()))
            .unwrap();
        let waiter = client.clone();
        let waiting = tokio::spawn(async move { waiter.wait_closed().await });

        client.close().await;

        assert!(waiting.await.is_ok());
    }
}
