//! Storage infrastructure: the client's TOML config file.
//!
//! The `config` sub-module reads the file (falling back to defaults when it
//! does not exist yet) and writes it back, creating parent directories.

pub mod config;
