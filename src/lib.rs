//! nsworker - a pool of remote workers with persistent namespaces
//!
//! Each worker owns a mutable namespace driven by a small script
//! language. A [`client::WorkerHandle`] talks to one worker; a
//! [`group::WorkerGroup`] fans operations out across many, sequentially
//! or in parallel, capturing per-member failures.

pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod group;
pub mod logging;
pub mod namespace;
pub mod protocol;
pub mod script;
pub mod server;
pub mod system;
pub mod version;

pub use client::{ConnectOptions, NamespaceProxy, RemoteCallable, Resolved, WorkerHandle};
pub use error::{Error, ErrorKind, Result};
pub use group::{JoinOptions, MultiRunResult, Operation, Outcome, Output, WorkerFilter, WorkerGroup};
pub use script::Value;
pub use server::{EngineSettings, RunningServer, WorkerEngine, WorkerServer};
