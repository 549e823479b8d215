//! System module for worker identity and host information

mod info;

pub use info::*;
