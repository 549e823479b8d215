//! Client transports
//!
//! A [`Transport`] carries one request to a worker and brings back its
//! payload. [`TcpTransport`] is the real wire; [`LocalTransport`] calls an
//! in-process engine directly.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tracing::trace;

use crate::error::{Error, Result};
use crate::protocol::{
    read_frame, write_frame, Endpoint, Payload, Request, RequestEnvelope, Response,
    ResponseEnvelope,
};
use crate::server::WorkerEngine;

/// Carries requests to a worker
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform one call; remote errors come back with their original kind
    async fn call(&self, endpoint: &Endpoint, request: Request) -> Result<Payload>;
}

/// Timeouts applied by [`TcpTransport`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Limit on establishing the TCP connection
    pub connect_timeout: Duration,

    /// Limit on waiting for the response once the request is sent
    pub call_timeout: Duration,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            call_timeout: Duration::from_secs(60),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// TCP
// ─────────────────────────────────────────────────────────────────

/// One TCP connection per call
#[derive(Debug, Clone, Default)]
pub struct TcpTransport {
    options: ConnectOptions,
}

impl TcpTransport {
    pub fn new(options: ConnectOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ConnectOptions {
        &self.options
    }

    /// Response deadline for a request; `None` means wait indefinitely
    fn response_timeout(&self, request: &Request) -> Option<Duration> {
        match request {
            Request::Wait { timeout_ms: None } => None,
            Request::Wait {
                timeout_ms: Some(ms),
            } => Some(self.options.call_timeout + Duration::from_millis(*ms)),
            _ => Some(self.options.call_timeout),
        }
    }

    async fn exchange(&self, endpoint: &Endpoint, request: Request) -> Result<ResponseEnvelope> {
        let unreachable = |message: String| Error::unreachable(endpoint.to_string(), message);

        let mut stream = tokio::time::timeout(
            self.options.connect_timeout,
            TcpStream::connect(endpoint.socket_addr()),
        )
        .await
        .map_err(|_| unreachable("connection timeout".to_string()))?
        .map_err(|e| unreachable(e.to_string()))?;
        stream.set_nodelay(true).ok();

        let deadline = self.response_timeout(&request);
        let envelope = RequestEnvelope::new(request);
        trace!(endpoint = %endpoint, op = envelope.request.name(), id = %envelope.id, "Sending request");

        write_frame(&mut stream, &envelope)
            .await
            .map_err(|e| unreachable(e.to_string()))?;

        let read = read_frame::<_, ResponseEnvelope>(&mut stream);
        let response = match deadline {
            Some(limit) => tokio::time::timeout(limit, read)
                .await
                .map_err(|_| unreachable(format!("no response within {}ms", limit.as_millis())))?,
            None => read.await,
        }
        .map_err(|e| match e {
            Error::Protocol(_) => e,
            other => unreachable(other.to_string()),
        })?;

        if response.id != envelope.id {
            return Err(Error::Protocol(format!(
                "response id {} does not match request {}",
                response.id, envelope.id
            )));
        }
        Ok(response)
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn call(&self, endpoint: &Endpoint, request: Request) -> Result<Payload> {
        match self.exchange(endpoint, request).await?.response {
            Response::Ok { payload } => Ok(payload),
            Response::Error { error } => Err(error.into_error(&endpoint.to_string())),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// In-process
// ─────────────────────────────────────────────────────────────────

/// Calls an engine in the same process, bypassing the network
#[derive(Clone)]
pub struct LocalTransport {
    engine: Arc<WorkerEngine>,
}

impl LocalTransport {
    pub fn new(engine: Arc<WorkerEngine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Arc<WorkerEngine> {
        &self.engine
    }

    /// Endpoint naming the in-process engine
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new("localhost", 0, self.engine.worker_id())
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn call(&self, endpoint: &Endpoint, request: Request) -> Result<Payload> {
        self.engine.handle(request).await.map_err(|e| match e {
            // Same shape a remote caller would observe
            Error::WorkerUnreachable { message, .. } => {
                Error::unreachable(endpoint.to_string(), message)
            }
            other => other,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::{EngineSettings, WorkerServer};

    #[tokio::test]
    async fn test_tcp_roundtrip() {
        let engine = Arc::new(WorkerEngine::new(EngineSettings::default()));
        let server = WorkerServer::bind(engine, "127.0.0.1", 0, None)
            .await
            .unwrap()
            .spawn();

        let transport = TcpTransport::default();
        let pong = transport.call(server.endpoint(), Request::Ping).await.unwrap();
        assert_eq!(pong, Payload::Text("pong".into()));

        let err = transport
            .call(server.endpoint(), Request::Get { name: "missing".into() })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NameNotFound { ref name } if name == "missing"));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint() {
        // Bind then drop to get a port nothing listens on
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let endpoint = Endpoint::new("127.0.0.1", port, "gone");
        let transport = TcpTransport::new(ConnectOptions {
            connect_timeout: Duration::from_millis(200),
            call_timeout: Duration::from_millis(200),
        });

        let err = transport.call(&endpoint, Request::Ping).await.unwrap_err();
        assert!(err.is_unreachable());
    }

    #[test]
    fn test_wait_extends_deadline() {
        let transport = TcpTransport::new(ConnectOptions {
            connect_timeout: Duration::from_secs(1),
            call_timeout: Duration::from_secs(2),
        });
        assert_eq!(transport.response_timeout(&Request::Wait { timeout_ms: None }), None);
        assert_eq!(
            transport.response_timeout(&Request::Wait { timeout_ms: Some(500) }),
            Some(Duration::from_millis(2500))
        );
        assert_eq!(transport.response_timeout(&Request::List), Some(Duration::from_secs(2)));
    }
}
