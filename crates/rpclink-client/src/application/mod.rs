//! Application layer: the discovery-and-connection state machine.
//!
//! # What lives here?
//!
//! - **`client`** – the top-level driver.  Owns everything below, runs on one
//!   Tokio task, and exposes [`client::ClientHandle`] to the caller.
//!
//! - **`discovery`** – builds discovery requests, re-broadcasts them on a
//!   timer, and screens responses (service name, proof, duplicates).
//!
//! - **`connection`** – one connection attempt: connect, wait for the peer's
//!   handshake, bind the outbound sender, report close.
//!
//! - **`events`** – the `connection` / `closed` / `error` / `close` observer
//!   lists.
//!
//! - **`retry`** – how long to wait before re-broadcasting or reconnecting.
//!
//! - **`ports`** – the traits the infrastructure layer implements.  Nothing in
//!   this layer opens a socket itself.

pub mod client;
pub mod connection;
pub mod discovery;
pub mod events;
pub mod ports;
pub mod retry;
