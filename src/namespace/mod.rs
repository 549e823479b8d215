//! Per-worker namespace: the store and the lock that guards it

mod lock;
mod store;

pub use lock::*;
pub use store::*;
