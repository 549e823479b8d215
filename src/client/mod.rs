//! Client side of the worker pool: transports, handles and the
//! namespace proxy built on top of them.

mod benchmark;
mod callable;
mod handle;
mod proxy;
mod transport;

pub use benchmark::*;
pub use callable::*;
pub use handle::*;
pub use proxy::*;
pub use transport::*;
