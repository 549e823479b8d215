//! Common test utilities and fixtures
//!
//! Spins up real workers on ephemeral loopback ports.

#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use nsworker::client::{ConnectOptions, WorkerHandle};
use nsworker::group::WorkerGroup;
use nsworker::server::{EngineSettings, RunningServer, WorkerEngine, WorkerServer};
use tempfile::TempDir;

/// Workers running inside the test process
pub struct TestPool {
    pub servers: Vec<RunningServer>,
}

impl TestPool {
    pub async fn start(count: usize) -> Self {
        Self::start_with(count, EngineSettings::default()).await
    }

    pub async fn start_with(count: usize, settings: EngineSettings) -> Self {
        let mut servers = Vec::with_capacity(count);
        for _ in 0..count {
            let engine = Arc::new(WorkerEngine::new(settings.clone()));
            let server = WorkerServer::bind(engine, "127.0.0.1", 0, None)
                .await
                .expect("bind worker");
            servers.push(server.spawn());
        }
        Self { servers }
    }

    /// Discovery file contents for every worker
    pub fn uri_text(&self) -> String {
        self.servers
            .iter()
            .map(|s| format!("{}\n", s.endpoint()))
            .collect()
    }

    pub async fn group(&self) -> WorkerGroup {
        WorkerGroup::connect_from_text(&self.uri_text(), fast_options())
            .await
            .expect("connect pool")
    }

    pub async fn handle(&self, index: usize) -> WorkerHandle {
        let endpoint = self.servers[index].endpoint().to_string();
        WorkerHandle::connect(&endpoint, fast_options())
            .await
            .expect("connect worker")
    }
}

pub fn fast_options() -> ConnectOptions {
    ConnectOptions {
        connect_timeout: Duration::from_millis(500),
        call_timeout: Duration::from_secs(10),
    }
}

/// Scratch directory holding config and discovery files
pub struct TestEnvironment {
    pub root: TempDir,
}

impl TestEnvironment {
    pub fn new() -> Self {
        Self {
            root: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    pub fn write(&self, name: &str, content: &str) -> PathBuf {
        let path = self.root.path().join(name);
        fs::write(&path, content).expect("write fixture");
        path
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.root.path().join(name)
    }
}

/// Port that nothing is listening on
pub fn dead_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    listener.local_addr().expect("local addr").port()
}
