//! TCP transport carrying one JSON object per line.
//!
//! # Link layout
//!
//! ```text
//! client                                    server
//! ──────                                    ──────
//! <protocol prefix>\n          ──────────▶  namespaces the link
//! {"name":"connectSuccess"}\n  ◀─────────▶  handshake
//! {...}\n                      ◀─────────▶  application traffic
//! ```
//!
//! The stream is split into halves.  A writer task drains an unbounded
//! outbound queue; a reader task turns lines into [`TransportEvent`]s.  The
//! reader emits [`TransportEvent::Closed`] exactly once, when the peer closes
//! the stream, a read fails, or the link is ended locally.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use rpclink_core::Remote;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, warn};

use crate::application::ports::{
    Connector, LinkWriter, TransportError, TransportEvent, TransportLink,
};

const EVENT_CAPACITY: usize = 128;

enum Outbound {
    Line(String),
    End,
}

/// Connects to servers over TCP.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpJsonConnector;

#[async_trait]
impl Connector for TcpJsonConnector {
    async fn connect(
        &self,
        remote: Remote,
        protocol_prefix: &str,
    ) -> Result<TransportLink, TransportError> {
        let stream = TcpStream::connect(remote.socket_addr())
            .await
            .map_err(|source| TransportError::ConnectFailed { remote, source })?;
        debug!("TCP connected to {remote}");

        let (read_half, write_half) = stream.into_split();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::channel(EVENT_CAPACITY);
        let stop_reading = Arc::new(Notify::new());

        // Queued first so it precedes anything the caller sends.
        let _ = outbound_tx.send(Outbound::Line(protocol_prefix.to_string()));

        tokio::spawn(write_loop(
            write_half,
            outbound_rx,
            event_tx.clone(),
            Arc::clone(&stop_reading),
        ));
        tokio::spawn(read_loop(read_half, event_tx, stop_reading));

        Ok(TransportLink {
            writer: Arc::new(TcpLinkWriter {
                outbound: outbound_tx,
                ended: AtomicBool::new(false),
            }),
            events: event_rx,
        })
    }
}

struct TcpLinkWriter {
    outbound: mpsc::UnboundedSender<Outbound>,
    ended: AtomicBool,
}

impl LinkWriter for TcpLinkWriter {
    fn send(&self, message: &Value) -> Result<(), TransportError> {
        if self.ended.load(Ordering::SeqCst) {
            return Err(TransportError::Ended);
        }
        let line = serde_json::to_string(message).map_err(TransportError::Encode)?;
        self.outbound
            .send(Outbound::Line(line))
            .map_err(|_| TransportError::Ended)
    }

    fn end(&self) {
        if !self.ended.swap(true, Ordering::SeqCst) {
            let _ = self.outbound.send(Outbound::End);
        }
    }
}

async fn write_loop(
    mut writer: OwnedWriteHalf,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    events: mpsc::Sender<TransportEvent>,
    stop_reading: Arc<Notify>,
) {
    while let Some(item) = outbound.recv().await {
        let Outbound::Line(mut line) = item else {
            break;
        };
        line.push('\n');
        if let Err(e) = writer.write_all(line.as_bytes()).await {
            warn!("TCP write failed: {e}");
            let _ = events.send(TransportEvent::Error(TransportError::Io(e))).await;
            break;
        }
    }
    let _ = writer.shutdown().await;
    stop_reading.notify_one();
}

async fn read_loop(
    reader: OwnedReadHalf,
    events: mpsc::Sender<TransportEvent>,
    stop_reading: Arc<Notify>,
) {
    let mut lines = BufReader::new(reader).lines();
    loop {
        let line = tokio::select! {
            _ = stop_reading.notified() => break,
            line = lines.next_line() => line,
        };
        let event = match line {
            Ok(Some(line)) if line.trim().is_empty() => continue,
            Ok(Some(line)) => match serde_json::from_str::<Value>(&line) {
                Ok(value) => TransportEvent::Message(value),
                Err(e) => TransportEvent::Error(TransportError::Decode(e)),
            },
            Ok(None) => break,
            Err(e) => {
                let _ = events.send(TransportEvent::Error(TransportError::Io(e))).await;
                break;
            }
        };
        if events.send(event).await.is_err() {
            return;
        }
    }
    let _ = events.send(TransportEvent::Closed).await;
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use serde_json::json;
    use tokio::net::TcpListener;

    async fn next_event(link: &mut TransportLink) -> TransportEvent {
        tokio::time::timeout(Duration::from_secs(5), link.events.recv())
            .await
            .expect("timed out waiting for link event")
            .expect("event stream ended")
    }

    async fn listener() -> (TcpListener, Remote) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        (listener, Remote::new(addr.ip(), addr.port()))
    }

    #[tokio::test]
    async fn test_prefix_is_first_line_and_messages_flow_both_ways() {
        // Arrange
        let (listener, remote) = listener().await;
        let mut link = TcpJsonConnector.connect(remote, "rpc").await.unwrap();
        let (server, _) = listener.accept().await.unwrap();
        let (server_read, mut server_write) = server.into_split();
        let mut server_lines = BufReader::new(server_read).lines();

        // Act
        server_write
            .write_all(b"{\"name\":\"connectSuccess\"}\n")
            .await
            .unwrap();
        let inbound = next_event(&mut link).await;
        link.writer.send(&json!({ "name": "connectSuccess" })).unwrap();

        // Assert
        assert_eq!(server_lines.next_line().await.unwrap().as_deref(), Some("rpc"));
        assert_eq!(
            server_lines.next_line().await.unwrap().as_deref(),
            Some(r#"{"name":"connectSuccess"}"#)
        );
        assert!(matches!(
            inbound,
            TransportEvent::Message(v) if v == json!({ "name": "connectSuccess" })
        ));
    }

    #[tokio::test]
    async fn test_invalid_line_is_reported_and_link_stays_open() {
        let (listener, remote) = listener().await;
        let mut link = TcpJsonConnector.connect(remote, "rpc").await.unwrap();
        let (mut server, _) = listener.accept().await.unwrap();

        server.write_all(b"not json\n{\"ok\":1}\n").await.unwrap();

        assert!(matches!(
            next_event(&mut link).await,
            TransportEvent::Error(TransportError::Decode(_))
        ));
        assert!(matches!(next_event(&mut link).await, TransportEvent::Message(_)));
    }

    #[tokio::test]
    async fn test_peer_close_yields_closed() {
        let (listener, remote) = listener().await;
        let mut link = TcpJsonConnector.connect(remote, "rpc").await.unwrap();
        let (server, _) = listener.accept().await.unwrap();

        drop(server);

        assert!(matches!(next_event(&mut link).await, TransportEvent::Closed));
    }

    #[tokio::test]
    async fn test_end_yields_closed_and_rejects_sends() {
        // Arrange
        let (listener, remote) = listener().await;
        let mut link = TcpJsonConnector.connect(remote, "rpc").await.unwrap();
        let _server = listener.accept().await.unwrap();

        // Act
        link.writer.end();
        let result = link.writer.send(&json!({ "late": true }));

        // Assert
        assert!(matches!(result, Err(TransportError::Ended)));
        assert!(matches!(next_event(&mut link).await, TransportEvent::Closed));
    }

    #[tokio::test]
    async fn test_connect_refused_reports_remote() {
        // Arrange: bind then drop so the port is very likely closed.
        let (listener, remote) = listener().await;
        drop(listener);

        // Act
        let result = TcpJsonConnector.connect(remote, "rpc").await;

        // Assert
        match result {
            Err(TransportError::ConnectFailed { remote: r, .. }) => assert_eq!(r, remote),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("connect unexpectedly succeeded"),
        }
    }
}
