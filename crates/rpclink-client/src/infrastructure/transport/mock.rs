//! Hand-driven transport for tests.
//!
//! Every successful `connect` on a [`MockConnector`] creates a [`MockLink`].
//! The test plays the server through it: `send_handshake`, `send_message`,
//! `fail` and `close` push events to the client, and `sent` shows what the
//! client wrote.
//!
//! # Usage in tests
//!
//! ```ignore
//! let connector = MockConnector::new();
//! // ... client accepts a discovery response and connects ...
//! let link = connector.link(0);
//! link.send_handshake();
//! assert_eq!(link.sent(), vec![json!({ "name": "connectSuccess" })]);
//! link.close();
//! ```

use std::io;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use rpclink_core::Remote;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use crate::application::ports::{
    Connector, LinkWriter, TransportError, TransportEvent, TransportLink,
};

const EVENT_CAPACITY: usize = 256;

#[derive(Default)]
struct ConnectorState {
    links: Vec<MockLink>,
    refusals: usize,
    attempts: Vec<Remote>,
}

/// A connector whose links are scripted by the test.
#[derive(Clone, Default)]
pub struct MockConnector {
    state: Arc<Mutex<ConnectorState>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `connect` fail with `ConnectionRefused`.
    pub fn refuse_next(&self) {
        self.lock().refusals += 1;
    }

    /// Every remote `connect` was called with, refused ones included.
    pub fn remotes(&self) -> Vec<Remote> {
        self.lock().attempts.clone()
    }

    pub fn connect_count(&self) -> usize {
        self.lock().attempts.len()
    }

    /// Links created so far, in connect order.
    pub fn links(&self) -> Vec<MockLink> {
        self.lock().links.clone()
    }

    /// The `index`-th successful link.
    ///
    /// # Panics
    ///
    /// Panics if fewer than `index + 1` links were created.
    pub fn link(&self, index: usize) -> MockLink {
        self.try_link(index)
            .unwrap_or_else(|| panic!("no mock link #{index}"))
    }

    pub fn try_link(&self, index: usize) -> Option<MockLink> {
        self.lock().links.get(index).cloned()
    }

    fn lock(&self) -> MutexGuard<'_, ConnectorState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(
        &self,
        remote: Remote,
        protocol_prefix: &str,
    ) -> Result<TransportLink, TransportError> {
        let mut state = self.lock();
        state.attempts.push(remote);
        if state.refusals > 0 {
            state.refusals -= 1;
            return Err(TransportError::ConnectFailed {
                remote,
                source: io::Error::new(io::ErrorKind::ConnectionRefused, "mock refusal"),
            });
        }

        let (tx, rx) = mpsc::channel(EVENT_CAPACITY);
        let link = MockLink {
            remote,
            protocol_prefix: protocol_prefix.to_string(),
            shared: Arc::new(Mutex::new(LinkState {
                sent: Vec::new(),
                ended: false,
                events_tx: Some(tx),
            })),
        };
        state.links.push(link.clone());

        Ok(TransportLink {
            writer: Arc::new(MockLinkWriter {
                shared: Arc::clone(&link.shared),
            }),
            events: rx,
        })
    }
}

struct LinkState {
    sent: Vec<Value>,
    ended: bool,
    events_tx: Option<mpsc::Sender<TransportEvent>>,
}

impl LinkState {
    fn push(&mut self, event: TransportEvent) {
        if let Some(tx) = &self.events_tx {
            let _ = tx.try_send(event);
        }
    }

    fn close(&mut self) {
        self.push(TransportEvent::Closed);
        self.events_tx = None;
    }
}

/// The server side of one mock link.
#[derive(Clone)]
pub struct MockLink {
    pub remote: Remote,
    pub protocol_prefix: String,
    shared: Arc<Mutex<LinkState>>,
}

impl MockLink {
    pub fn push(&self, event: TransportEvent) {
        self.lock().push(event);
    }

    pub fn send_handshake(&self) {
        self.send_message(json!({ "name": "connectSuccess" }));
    }

    pub fn send_message(&self, message: Value) {
        self.push(TransportEvent::Message(message));
    }

    /// Reports a link fault without closing the link.
    pub fn fail(&self, error: TransportError) {
        self.push(TransportEvent::Error(error));
    }

    /// Closes the link from the server side.
    pub fn close(&self) {
        self.lock().close();
    }

    /// Messages the client wrote, in order.
    pub fn sent(&self) -> Vec<Value> {
        self.lock().sent.clone()
    }

    /// Whether the client ended the link.
    pub fn is_ended(&self) -> bool {
        self.lock().ended
    }

    fn lock(&self) -> MutexGuard<'_, LinkState> {
        self.shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

struct MockLinkWriter {
    shared: Arc<Mutex<LinkState>>,
}

impl LinkWriter for MockLinkWriter {
    fn send(&self, message: &Value) -> Result<(), TransportError> {
        let mut state = self.shared.lock().unwrap_or_else(|p| p.into_inner());
        if state.ended {
            return Err(TransportError::Ended);
        }
        state.sent.push(message.clone());
        Ok(())
    }

    fn end(&self) {
        let mut state = self.shared.lock().unwrap_or_else(|p| p.into_inner());
        if !state.ended {
            state.ended = true;
            state.close();
        }
    }
}
