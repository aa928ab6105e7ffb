//! In-memory broadcast channel for tests.
//!
//! `MockBroadcast` records every datagram the client sends and lets the test
//! inject inbound datagrams as if servers had answered.  Clones share state,
//! so a test keeps one clone and hands another to the client.
//!
//! # Usage in tests
//!
//! ```ignore
//! let broadcast = MockBroadcast::new();
//! let client = ClientBuilder::new(settings)
//!     .connect(Arc::new(broadcast.clone()), Arc::new(MockConnector::new()))?;
//!
//! broadcast.inject_response(server_addr, &json!({ "name": "db", "port": 7000 }));
//! assert_eq!(broadcast.sent_requests(), vec![json!({ "where": "db" })]);
//! ```

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::application::ports::{
    BroadcastChannel, BroadcastError, BroadcastEvent, BroadcastOpener, DatagramSender,
};

const EVENT_CAPACITY: usize = 256;

/// One datagram the client sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentDatagram {
    pub payload: Vec<u8>,
    pub port: u16,
}

struct Inner {
    sent: Vec<SentDatagram>,
    events_tx: Option<mpsc::Sender<BroadcastEvent>>,
    events_rx: Option<mpsc::Receiver<BroadcastEvent>>,
    opened_exclusive: Option<bool>,
    fail_open: bool,
    closed: bool,
}

/// A broadcast channel whose traffic is recorded and scripted by the test.
#[derive(Clone)]
pub struct MockBroadcast {
    inner: Arc<Mutex<Inner>>,
}

impl Default for MockBroadcast {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBroadcast {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Mutex::new(Inner {
                sent: Vec::new(),
                events_tx: Some(tx),
                events_rx: Some(rx),
                opened_exclusive: None,
                fail_open: false,
                closed: false,
            })),
        }
    }

    /// A channel whose `open` always fails.
    pub fn failing() -> Self {
        let mock = Self::new();
        mock.lock().fail_open = true;
        mock
    }

    /// Delivers `response` as a datagram from `source`.
    pub fn inject_response(&self, source: SocketAddr, response: &Value) {
        self.inject_raw(source, response.to_string().into_bytes());
    }

    /// Delivers arbitrary bytes as a datagram from `source`.
    pub fn inject_raw(&self, source: SocketAddr, payload: Vec<u8>) {
        self.push(BroadcastEvent::Datagram { payload, source });
    }

    /// Reports a channel fault.
    pub fn inject_error(&self, error: BroadcastError) {
        self.push(BroadcastEvent::Error(error));
    }

    pub fn sent(&self) -> Vec<SentDatagram> {
        self.lock().sent.clone()
    }

    pub fn sent_count(&self) -> usize {
        self.lock().sent.len()
    }

    /// Every sent payload parsed as JSON.  Unparseable payloads are skipped.
    pub fn sent_requests(&self) -> Vec<Value> {
        self.lock()
            .sent
            .iter()
            .filter_map(|d| serde_json::from_slice(&d.payload).ok())
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// The `exclusive` flag of the last `open`, or `None` if never opened.
    pub fn opened_exclusive(&self) -> Option<bool> {
        self.lock().opened_exclusive
    }

    fn push(&self, event: BroadcastEvent) {
        // Events after close are dropped, like datagrams to a closed socket.
        if let Some(tx) = &self.lock().events_tx {
            let _ = tx.try_send(event);
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl BroadcastOpener for MockBroadcast {
    async fn open(&self, exclusive: bool) -> Result<BroadcastChannel, BroadcastError> {
        let mut inner = self.lock();
        inner.opened_exclusive = Some(exclusive);
        if inner.fail_open {
            return Err(BroadcastError::OpenFailed {
                addr: SocketAddr::from(([0, 0, 0, 0], 0)),
                source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "mock open failure"),
            });
        }
        let events = inner.events_rx.take().ok_or(BroadcastError::Closed)?;
        Ok(BroadcastChannel {
            sender: Box::new(MockDatagramSender {
                inner: Arc::clone(&self.inner),
            }),
            events,
        })
    }
}

struct MockDatagramSender {
    inner: Arc<Mutex<Inner>>,
}

impl MockDatagramSender {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl DatagramSender for MockDatagramSender {
    async fn send(&self, payload: &[u8], port: u16) -> Result<(), BroadcastError> {
        let mut inner = self.lock();
        if inner.closed {
            return Err(BroadcastError::Closed);
        }
        inner.sent.push(SentDatagram {
            payload: payload.to_vec(),
            port,
        });
        Ok(())
    }

    fn close(&self) {
        let mut inner = self.lock();
        inner.closed = true;
        inner.events_tx = None;
    }
}
