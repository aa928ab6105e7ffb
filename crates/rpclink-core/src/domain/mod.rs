//! Domain types for candidate selection.
//!
//! - **`remote`** – [`remote::Remote`] (where a server lives),
//!   [`remote::ServerKey`] (its de-duplication identity) and
//!   [`remote::ConnectionContext`] (the identity of one connection attempt).
//! - **`candidates`** – the per-client [`candidates::DedupRegistry`] and
//!   [`candidates::BackupQueue`].

pub mod candidates;
pub mod remote;
