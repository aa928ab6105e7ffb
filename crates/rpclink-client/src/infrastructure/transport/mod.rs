//! Transport adapters.
//!
//! - **`tcp`** – `TcpJsonConnector`: newline-delimited JSON over TCP.
//! - **`mock`** – hand-driven links for tests.

pub mod mock;
pub mod tcp;

pub use tcp::TcpJsonConnector;
