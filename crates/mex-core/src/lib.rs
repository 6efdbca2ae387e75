//! Core logic for exporting Telegram group members.
//!
//! This crate is transport-agnostic. The Telegram Bot API client lives behind the
//! `RemoteSource` port, implemented in the `mex-telegram` adapter crate.

pub mod config;
pub mod domain;
pub mod errors;
pub mod export;
pub mod logging;
pub mod pagination;
pub mod ports;
pub mod projection;
pub mod retry;
pub mod utils;
pub mod workflow;

#[cfg(test)]
pub(crate) mod test_support;

pub use errors::{Error, RemoteError, Result};
