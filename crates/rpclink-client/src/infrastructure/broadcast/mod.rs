//! Broadcast channel adapters.
//!
//! - **`udp`** – the real thing: a Tokio `UdpSocket` with `SO_BROADCAST` set.
//! - **`mock`** – an in-memory channel for tests.

pub mod mock;
pub mod udp;

pub use udp::UdpBroadcast;
