//! Worker side: the engine that owns a namespace, the call middleware,
//! and the TCP listener that exposes it

mod engine;
mod listener;
mod middleware;

pub use engine::*;
pub use listener::*;
pub use middleware::*;
