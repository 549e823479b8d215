//! TCP listener serving one worker engine
//!
//! Each connection carries exactly one request frame and one response
//! frame.

use std::fs::OpenOptions;
use std::io::Write;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::error::{Error, Result};
use crate::protocol::{read_frame, write_frame, Endpoint, RequestEnvelope, ResponseEnvelope};

use super::WorkerEngine;

/// A bound listener for one engine, not yet accepting
pub struct WorkerServer {
    engine: Arc<WorkerEngine>,
    listener: TcpListener,
    endpoint: Endpoint,
}

impl WorkerServer {
    /// Bind `bind_host:port` (0 = auto-assign) and derive the public endpoint
    pub async fn bind(
        engine: Arc<WorkerEngine>,
        bind_host: &str,
        port: u16,
        advertise_host: Option<&str>,
    ) -> Result<Self> {
        let listener = TcpListener::bind((bind_host, port)).await?;
        let addr = listener.local_addr()?;
        let host = advertised_host(addr, advertise_host);
        let endpoint = Endpoint::new(host, addr.port(), engine.worker_id());

        info!(addr = %addr, endpoint = %endpoint, "Worker listening");
        Ok(Self {
            engine,
            listener,
            endpoint,
        })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn engine(&self) -> Arc<WorkerEngine> {
        self.engine.clone()
    }

    /// Accept connections forever
    pub async fn run(self) {
        let Self {
            engine, listener, ..
        } = self;

        loop {
            match listener.accept().await {
                Ok((stream, peer_addr)) => {
                    debug!(peer_addr = %peer_addr, "Incoming connection");
                    let engine = Arc::clone(&engine);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(engine, stream).await {
                            debug!(error = %e, "Connection failed");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "Accept failed");
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }

    /// Run the accept loop in the background
    pub fn spawn(self) -> RunningServer {
        let endpoint = self.endpoint.clone();
        let engine = self.engine.clone();
        let task = tokio::spawn(self.run());
        RunningServer {
            endpoint,
            engine,
            task: Some(task),
        }
    }
}

/// A worker accepting connections in the background; stops when dropped
pub struct RunningServer {
    endpoint: Endpoint,
    engine: Arc<WorkerEngine>,
    task: Option<JoinHandle<()>>,
}

impl RunningServer {
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn engine(&self) -> &Arc<WorkerEngine> {
        &self.engine
    }

    /// Stop accepting connections
    pub fn shutdown(&self) {
        if let Some(task) = &self.task {
            task.abort();
        }
    }

    /// Wait for the accept loop to end
    pub async fn wait(mut self) {
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for RunningServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Serve a single request/response exchange
async fn handle_connection(engine: Arc<WorkerEngine>, mut stream: TcpStream) -> anyhow::Result<()> {
    let envelope: RequestEnvelope = read_frame(&mut stream).await?;
    let op = envelope.request.name();

    let response = match engine.handle(envelope.request).await {
        Ok(payload) => ResponseEnvelope::ok(envelope.id, payload),
        Err(e) => {
            debug!(op, error = %e, "Request failed");
            ResponseEnvelope::error(envelope.id, &e)
        }
    };

    write_frame(&mut stream, &response).await?;
    Ok(())
}

fn advertised_host(addr: SocketAddr, advertise_host: Option<&str>) -> String {
    if let Some(host) = advertise_host {
        return host.to_string();
    }
    let ip: IpAddr = addr.ip();
    if !ip.is_unspecified() {
        return ip.to_string();
    }
    hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "127.0.0.1".to_string())
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|e| Error::IoWrite {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
    }
    Ok(())
}

/// Empty the discovery file so endpoints of a previous run do not linger
pub fn reset_endpoint_file(path: &Path) -> Result<()> {
    ensure_parent(path)?;
    OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)
        .map_err(|e| Error::IoWrite {
            path: path.to_path_buf(),
            source: e,
        })?;
    debug!(path = %path.display(), "Endpoint file reset");
    Ok(())
}

/// Append an endpoint line to the discovery file
pub fn append_endpoint(path: &Path, endpoint: &Endpoint) -> Result<()> {
    ensure_parent(path)?;

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| Error::IoWrite {
            path: path.to_path_buf(),
            source: e,
        })?;
    writeln!(file, "{}", endpoint).map_err(|e| Error::IoWrite {
        path: path.to_path_buf(),
        source: e,
    })?;

    debug!(path = %path.display(), endpoint = %endpoint, "Endpoint published");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::EngineSettings;

    #[tokio::test]
    async fn test_bind_derives_endpoint() {
        let engine = Arc::new(WorkerEngine::with_id("w-bind", EngineSettings::default()));
        let server = WorkerServer::bind(engine, "127.0.0.1", 0, None).await.unwrap();

        let ep = server.endpoint();
        assert_eq!(ep.host(), "127.0.0.1");
        assert_ne!(ep.port(), 0);
        assert_eq!(ep.worker_id(), "w-bind");
    }

    #[tokio::test]
    async fn test_advertise_host_override() {
        let engine = Arc::new(WorkerEngine::new(EngineSettings::default()));
        let server = WorkerServer::bind(engine, "127.0.0.1", 0, Some("pool-node-1"))
            .await
            .unwrap();
        assert_eq!(server.endpoint().host(), "pool-node-1");
    }

    #[test]
    fn test_append_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("pool.uri");

        append_endpoint(&path, &Endpoint::new("10.0.0.1", 1, "a")).unwrap();
        append_endpoint(&path, &Endpoint::new("10.0.0.2", 2, "b")).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "nsw://10.0.0.1:1/a\nnsw://10.0.0.2:2/b\n");
    }

    #[test]
    fn test_reset_drops_stale_endpoints() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pool.uri");
        append_endpoint(&path, &Endpoint::new("10.0.0.1", 1, "old")).unwrap();

        reset_endpoint_file(&path).unwrap();
        append_endpoint(&path, &Endpoint::new("10.0.0.1", 2, "new")).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "nsw://10.0.0.1:2/new\n");

        let fresh = dir.path().join("sub").join("fresh.uri");
        reset_endpoint_file(&fresh).unwrap();
        assert_eq!(std::fs::read_to_string(&fresh).unwrap(), "");
    }
}
