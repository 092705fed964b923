//! Shared protocol definitions for the Ping relay wire format.

pub mod codec;
pub mod rpc;
pub mod status;
pub mod types;
