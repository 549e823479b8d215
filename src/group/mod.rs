//! Worker groups and multi-run orchestration

#[allow(clippy::module_inception)]
mod group;
mod multirun;

pub use group::*;
pub use multirun::*;
