//! Infrastructure layer for the client.
//!
//! Contains the adapters behind the traits in `application::ports`: a UDP
//! broadcast channel, a TCP transport carrying one JSON object per line, and
//! the TOML config file.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `rpclink_core`, but MUST NOT be imported by the `application` layer
//! (tests excepted).
//!
//! # Sub-modules
//!
//! - **`broadcast`** – `UdpBroadcast`, plus a `MockBroadcast` that records
//!   every datagram and lets tests inject responses.
//!
//! - **`transport`** – `TcpJsonConnector`, plus a `MockConnector` whose links
//!   are driven by hand from tests.
//!
//! - **`storage`** – reading and writing the client's config file.

pub mod broadcast;
pub mod storage;
pub mod transport;
