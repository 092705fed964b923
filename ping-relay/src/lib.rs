//! Ping relay hub library.
//!
//! Routes chat messages and key-exchange material between platform adapters.
//! Senders call unary operations; recipients hold one open `ReceiveMessages`
//! stream each, fed from a bounded per-client queue. Nothing is persisted:
//! a message for a client without an open stream is refused.

pub mod client;
pub mod config;
pub mod error;
pub mod identity;
pub mod pump;
pub mod queue;
pub mod registry;
pub mod server;
pub mod service;
