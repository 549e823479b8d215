//! Protocol module for client-worker communication
//!
//! Defines the request/response messages, the endpoint address format and
//! the length-prefixed JSON framing used over TCP.

mod endpoint;
mod framing;
mod messages;

pub use endpoint::*;
pub use framing::*;
pub use messages::*;
