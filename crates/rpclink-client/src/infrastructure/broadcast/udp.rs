//! UDP broadcast channel.
//!
//! Each [`UdpBroadcast::open`] binds a fresh socket (by default on an
//! ephemeral port of every interface), enables `SO_BROADCAST`, and spawns a
//! receive task that forwards datagrams and receive errors to the channel's
//! event stream.  After a receive error the task pauses before reading again,
//! and it stops after [`MAX_RECV_ERRORS`] failures in a row, ending the stream.
//!
//! # How discovery uses this (for beginners)
//!
//! The client sends its request to the LAN broadcast address
//! (`255.255.255.255`) on the discovery port.  Every host on the segment
//! receives it; servers providing the service answer with a unicast datagram
//! to the client's source address, which is the socket opened here.  The
//! server's address is taken from that reply's source address.
//!
//! # Exclusivity
//!
//! A socket bound to port 0 gets an ephemeral port nobody else holds, so an
//! exclusive channel needs no extra socket options.  Binding to a fixed port
//! with `exclusive = false` is not supported by this adapter.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, info, warn};

use crate::application::ports::{
    BroadcastChannel, BroadcastError, BroadcastEvent, BroadcastOpener, DatagramSender,
};

/// Largest datagram the receive task accepts.
const MAX_DATAGRAM: usize = 64 * 1024;

const EVENT_CAPACITY: usize = 64;

/// Pause after a failed receive before the socket is read again.
const RECV_ERROR_PAUSE: Duration = Duration::from_millis(100);

/// Consecutive receive failures after which the receive task gives up.
pub const MAX_RECV_ERRORS: u32 = 8;

/// Opens UDP broadcast channels.
#[derive(Debug, Clone)]
pub struct UdpBroadcast {
    broadcast_address: IpAddr,
    bind_addr: SocketAddr,
}

impl Default for UdpBroadcast {
    fn default() -> Self {
        Self::new(IpAddr::V4(Ipv4Addr::BROADCAST))
    }
}

impl UdpBroadcast {
    /// Sends to `broadcast_address` from an ephemeral port on all interfaces.
    pub fn new(broadcast_address: IpAddr) -> Self {
        Self {
            broadcast_address,
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
        }
    }

    /// Binds the socket to `bind_addr` instead.
    pub fn with_bind_addr(mut self, bind_addr: SocketAddr) -> Self {
        self.bind_addr = bind_addr;
        self
    }
}

#[async_trait]
impl BroadcastOpener for UdpBroadcast {
    async fn open(&self, exclusive: bool) -> Result<BroadcastChannel, BroadcastError> {
        let addr = self.bind_addr;
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| BroadcastError::OpenFailed { addr, source })?;
        socket
            .set_broadcast(true)
            .map_err(|source| BroadcastError::OpenFailed { addr, source })?;

        let local = socket.local_addr()?;
        info!(exclusive, "broadcast channel open on UDP {local}");

        let socket = Arc::new(socket);
        let shutdown = Arc::new(Notify::new());
        let (tx, rx) = mpsc::channel(EVENT_CAPACITY);
        tokio::spawn(receive_loop(Arc::clone(&socket), tx, Arc::clone(&shutdown)));

        Ok(BroadcastChannel {
            sender: Box::new(UdpDatagramSender {
                socket,
                target: self.broadcast_address,
                shutdown,
                closed: AtomicBool::new(false),
            }),
            events: rx,
        })
    }
}

struct UdpDatagramSender {
    socket: Arc<UdpSocket>,
    target: IpAddr,
    shutdown: Arc<Notify>,
    closed: AtomicBool,
}

#[async_trait]
impl DatagramSender for UdpDatagramSender {
    async fn send(&self, payload: &[u8], port: u16) -> Result<(), BroadcastError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BroadcastError::Closed);
        }
        self.socket
            .send_to(payload, SocketAddr::new(self.target, port))
            .await
            .map_err(|source| BroadcastError::SendFailed { port, source })?;
        Ok(())
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            // notify_one stores a permit, so a receive loop that is not
            // waiting yet still sees it.
            self.shutdown.notify_one();
        }
    }
}

/// What the receive task does after a failed `recv_from`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AfterRecvError {
    Pause(Duration),
    GiveUp,
}

/// Counts receive failures in a row.
#[derive(Debug, Default)]
struct RecvErrorStreak {
    consecutive: u32,
}

impl RecvErrorStreak {
    fn failed(&mut self) -> AfterRecvError {
        self.consecutive += 1;
        if self.consecutive >= MAX_RECV_ERRORS {
            AfterRecvError::GiveUp
        } else {
            AfterRecvError::Pause(RECV_ERROR_PAUSE)
        }
    }

    fn succeeded(&mut self) {
        self.consecutive = 0;
    }
}

async fn receive_loop(
    socket: Arc<UdpSocket>,
    tx: mpsc::Sender<BroadcastEvent>,
    shutdown: Arc<Notify>,
) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    let mut streak = RecvErrorStreak::default();
    loop {
        let (event, after) = tokio::select! {
            _ = shutdown.notified() => break,
            received = socket.recv_from(&mut buf) => match received {
                Ok((len, source)) => {
                    streak.succeeded();
                    let event = BroadcastEvent::Datagram {
                        payload: buf[..len].to_vec(),
                        source,
                    };
                    (event, None)
                }
                Err(e) => {
                    warn!("broadcast recv error: {e}");
                    (BroadcastEvent::Error(BroadcastError::Io(e)), Some(streak.failed()))
                }
            },
        };
        if tx.send(event).await.is_err() {
            // Receiver dropped: the client is gone.
            break;
        }
        match after {
            None => {}
            Some(AfterRecvError::GiveUp) => {
                warn!("broadcast recv failed {MAX_RECV_ERRORS} times in a row; stop receiving");
                break;
            }
            Some(AfterRecvError::Pause(pause)) => {
                tokio::select! {
                    _ = shutdown.notified() => break,
                    _ = tokio::time::sleep(pause) => {}
                }
            }
        }
    }
    debug!("broadcast receive loop stopped");
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn loopback() -> UdpBroadcast {
        UdpBroadcast::new(IpAddr::V4(Ipv4Addr::LOCALHOST))
            .with_bind_addr("127.0.0.1:0".parse().unwrap())
    }

    #[tokio::test]
    async fn test_send_reaches_listener_and_reply_arrives_as_event() {
        // Arrange
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = server.local_addr().unwrap().port();
        let mut channel = loopback().open(true).await.unwrap();

        // Act
        channel.sender.send(br#"{"where":"db"}"#, port).await.unwrap();
        let mut buf = [0u8; 256];
        let (len, client_addr) = server.recv_from(&mut buf).await.unwrap();
        server
            .send_to(br#"{"name":"db","port":7000}"#, client_addr)
            .await
            .unwrap();
        let event = tokio::time::timeout(Duration::from_secs(5), channel.events.recv())
            .await
            .unwrap()
            .unwrap();

        // Assert
        assert_eq!(&buf[..len], br#"{"where":"db"}"#);
        match event {
            BroadcastEvent::Datagram { payload, source } => {
                assert_eq!(payload, br#"{"name":"db","port":7000}"#.to_vec());
                assert_eq!(source, server.local_addr().unwrap());
            }
            BroadcastEvent::Error(e) => panic!("unexpected error event: {e}"),
        }
    }

    #[tokio::test]
    async fn test_close_rejects_sends_and_ends_event_stream() {
        // Arrange
        let mut channel = loopback().open(true).await.unwrap();

        // Act
        channel.sender.close();
        let result = channel.sender.send(b"{}", 9).await;
        let next = tokio::time::timeout(Duration::from_secs(5), channel.events.recv())
            .await
            .unwrap();

        // Assert
        assert!(matches!(result, Err(BroadcastError::Closed)));
        assert!(next.is_none());
    }

    #[test]
    fn test_recv_error_streak_pauses_then_gives_up() {
        // Arrange
        let mut streak = RecvErrorStreak::default();

        // Act
        let early: Vec<AfterRecvError> = (1..MAX_RECV_ERRORS).map(|_| streak.failed()).collect();
        let last = streak.failed();

        // Assert
        assert!(early.iter().all(|a| *a == AfterRecvError::Pause(RECV_ERROR_PAUSE)));
        assert_eq!(last, AfterRecvError::GiveUp);
    }

    #[test]
    fn test_recv_error_streak_resets_on_success() {
        let mut streak = RecvErrorStreak::default();
        for _ in 1..MAX_RECV_ERRORS {
            streak.failed();
        }

        streak.succeeded();

        assert_eq!(streak.failed(), AfterRecvError::Pause(RECV_ERROR_PAUSE));
    }

    #[tokio::test]
    async fn test_open_reports_bind_failure() {
        // Arrange: hold the port so the second bind fails.
        let taken = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = taken.local_addr().unwrap();

        // Act
        let result = UdpBroadcast::default().with_bind_addr(addr).open(true).await;

        // Assert
        assert!(matches!(result, Err(BroadcastError::OpenFailed { .. })));
    }
}
