//! Worker handle
//!
//! Client-side representative of one remote worker. Clones share the same
//! connection settings, cached info and tags.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tracing::debug;

use crate::error::{Error, Result};
use crate::protocol::{Endpoint, Payload, Request};
use crate::script::Value;
use crate::system::{WorkerIdentity, WorkerInfo};

use super::benchmark::{BenchmarkReport, BENCHMARK_SOURCE};
use super::callable::RemoteCallable;
use super::proxy::NamespaceProxy;
use super::transport::{ConnectOptions, TcpTransport, Transport};

#[derive(Debug, Default, Clone)]
struct Tags {
    name: Option<String>,
    group: Option<String>,
}

struct HandleInner {
    endpoint: Endpoint,
    transport: Arc<dyn Transport>,
    info: WorkerInfo,
    tags: RwLock<Tags>,
}

#[derive(Clone)]
pub struct WorkerHandle {
    inner: Arc<HandleInner>,
}

impl WorkerHandle {
    // ─────────────────────────────────────────────────────────────
    // Connecting
    // ─────────────────────────────────────────────────────────────

    /// Connect over TCP and perform the info handshake
    pub async fn connect(endpoint: &str, options: ConnectOptions) -> Result<Self> {
        Self::connect_to(endpoint.parse()?, options).await
    }

    pub async fn connect_to(endpoint: Endpoint, options: ConnectOptions) -> Result<Self> {
        Self::connect_with(endpoint, Arc::new(TcpTransport::new(options))).await
    }

    /// Handshake over a caller-supplied transport
    pub async fn connect_with(endpoint: Endpoint, transport: Arc<dyn Transport>) -> Result<Self> {
        let payload = transport
            .call(&endpoint, Request::Info)
            .await
            .map_err(|e| match e {
                Error::WorkerUnreachable { .. } => e,
                other => Error::unreachable(endpoint.to_string(), other.to_string()),
            })?;

        let info = match payload {
            Payload::Info(info) => info,
            other => {
                return Err(Error::unreachable(
                    endpoint.to_string(),
                    format!("handshake returned {} instead of info", other.kind()),
                ))
            }
        };
        debug!(endpoint = %endpoint, worker_id = %info.worker_id, "Connected to worker");

        Ok(Self {
            inner: Arc::new(HandleInner {
                endpoint,
                transport,
                info,
                tags: RwLock::new(Tags::default()),
            }),
        })
    }

    async fn call(&self, request: Request) -> Result<Payload> {
        self.inner.transport.call(&self.inner.endpoint, request).await
    }

    // ─────────────────────────────────────────────────────────────
    // Namespace operations
    // ─────────────────────────────────────────────────────────────

    pub async fn get(&self, name: &str) -> Result<Value> {
        let payload = self.call(Request::Get { name: name.to_string() }).await?;
        expect_value("GET", payload)
    }

    pub async fn get_many(&self, names: &[&str]) -> Result<BTreeMap<String, Value>> {
        let names = names.iter().map(|n| n.to_string()).collect();
        let payload = self.call(Request::GetMany { names }).await?;
        expect_bindings("GET_MANY", payload)
    }

    pub async fn set(&self, name: &str, value: impl Into<Value>) -> Result<()> {
        let request = Request::Set {
            name: name.to_string(),
            value: value.into(),
        };
        expect_unit("SET", self.call(request).await?)
    }

    pub async fn set_many(&self, bindings: BTreeMap<String, Value>) -> Result<()> {
        expect_unit("SET_MANY", self.call(Request::SetMany { bindings }).await?)
    }

    pub async fn list(&self) -> Result<Vec<String>> {
        match self.call(Request::List).await? {
            Payload::Names(names) => Ok(names),
            other => Err(unexpected("LIST", &other)),
        }
    }

    pub async fn clear(&self) -> Result<()> {
        expect_unit("CLEAR", self.call(Request::Clear).await?)
    }

    pub async fn execute(&self, code: &str) -> Result<()> {
        self.execute_with(code, BTreeMap::new()).await
    }

    /// Bind `bindings`, then run `code`, under one lock acquisition
    pub async fn execute_with(&self, code: &str, bindings: BTreeMap<String, Value>) -> Result<()> {
        let request = Request::Execute {
            code: code.to_string(),
            bindings,
        };
        expect_unit("EXECUTE", self.call(request).await?)
    }

    pub async fn evaluate(&self, code: &str) -> Result<Value> {
        self.evaluate_with(code, BTreeMap::new()).await
    }

    pub async fn evaluate_with(&self, code: &str, bindings: BTreeMap<String, Value>) -> Result<Value> {
        let request = Request::Evaluate {
            code: code.to_string(),
            bindings,
        };
        expect_value("EVALUATE", self.call(request).await?)
    }

    /// Run in a private namespace; the worker's namespace is not touched
    pub async fn volatile_execute(
        &self,
        code: &str,
        bindings: BTreeMap<String, Value>,
        outputs: &[&str],
    ) -> Result<BTreeMap<String, Value>> {
        let request = Request::VolatileExecute {
            code: code.to_string(),
            bindings,
            outputs: outputs.iter().map(|o| o.to_string()).collect(),
        };
        expect_bindings("VOLATILE_EXECUTE", self.call(request).await?)
    }

    pub async fn install(&self, name: &str, source: &str) -> Result<()> {
        let request = Request::Install {
            name: name.to_string(),
            source: source.to_string(),
        };
        expect_unit("INSTALL", self.call(request).await?)
    }

    pub async fn import(&self, name: &str) -> Result<()> {
        let request = Request::Import {
            name: name.to_string(),
        };
        expect_unit("IMPORT", self.call(request).await?)
    }

    pub async fn is_module_reference(&self, name: &str) -> Result<bool> {
        let request = Request::IsModuleReference {
            name: name.to_string(),
        };
        expect_flag("IS_MODULE_REFERENCE", self.call(request).await?)
    }

    // ─────────────────────────────────────────────────────────────
    // Worker state
    // ─────────────────────────────────────────────────────────────

    pub async fn ping(&self) -> Result<String> {
        match self.call(Request::Ping).await? {
            Payload::Text(text) => Ok(text),
            other => Err(unexpected("PING", &other)),
        }
    }

    pub async fn is_busy(&self) -> Result<bool> {
        expect_flag("IS_BUSY", self.call(Request::IsBusy).await?)
    }

    /// Wait for the worker lock to be free; `false` if `timeout` elapsed first
    pub async fn wait(&self, timeout: Option<Duration>) -> Result<bool> {
        let request = Request::Wait {
            timeout_ms: timeout.map(|t| t.as_millis() as u64),
        };
        expect_flag("WAIT", self.call(request).await?)
    }

    pub async fn identity(&self) -> Result<WorkerIdentity> {
        match self.call(Request::GetIdentity).await? {
            Payload::Identity(identity) => Ok(identity),
            other => Err(unexpected("GET_IDENTITY", &other)),
        }
    }

    /// Fresh info block from the worker
    pub async fn info(&self) -> Result<WorkerInfo> {
        match self.call(Request::Info).await? {
            Payload::Info(info) => Ok(info),
            other => Err(unexpected("INFO", &other)),
        }
    }

    /// Info captured during the handshake
    pub fn cached_info(&self) -> &WorkerInfo {
        &self.inner.info
    }

    // ─────────────────────────────────────────────────────────────
    // Derived helpers
    // ─────────────────────────────────────────────────────────────

    pub fn associate_callable(&self, name: &str) -> RemoteCallable {
        RemoteCallable::new(self.clone(), name)
    }

    /// Root namespace proxy
    pub fn proxy(&self) -> NamespaceProxy {
        NamespaceProxy::new(self.clone())
    }

    /// Time the prime-sum workload on the worker
    pub async fn benchmark(&self, cycles: u64) -> Result<BenchmarkReport> {
        let cycles = i64::try_from(cycles)
            .map_err(|_| Error::operation(format!("benchmark cycles out of range: {}", cycles)))?;
        let mut bindings = BTreeMap::new();
        bindings.insert("cycles".to_string(), Value::Int(cycles));

        let started = Instant::now();
        let outputs = self
            .volatile_execute(BENCHMARK_SOURCE, bindings, &["elapsed"])
            .await?;
        let round_trip = started.elapsed().as_secs_f64();

        let compute_secs = outputs
            .get("elapsed")
            .and_then(Value::as_f64)
            .ok_or_else(|| Error::operation("benchmark returned no elapsed time"))?;
        let busy = self.is_busy().await?;

        Ok(BenchmarkReport {
            network_secs: (round_trip - compute_secs).max(0.0),
            compute_secs,
            busy,
        })
    }

    // ─────────────────────────────────────────────────────────────
    // Tags and attributes
    // ─────────────────────────────────────────────────────────────

    pub fn name(&self) -> Option<String> {
        self.inner.tags.read().name.clone()
    }

    pub fn set_name(&self, name: impl Into<String>) {
        self.inner.tags.write().name = Some(name.into());
    }

    pub fn group(&self) -> Option<String> {
        self.inner.tags.read().group.clone()
    }

    pub fn set_group(&self, group: impl Into<String>) {
        self.inner.tags.write().group = Some(group.into());
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.inner.endpoint
    }

    /// Key identifying this worker in multi-run results
    pub fn key(&self) -> String {
        self.inner.endpoint.to_string()
    }

    pub fn ip(&self) -> &str {
        self.inner.endpoint.host()
    }

    pub fn port(&self) -> u16 {
        self.inner.endpoint.port()
    }

    pub fn hostname(&self) -> &str {
        &self.inner.info.hostname
    }

    pub fn system(&self) -> String {
        self.inner.info.system()
    }
}

impl fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tags = self.inner.tags.read();
        f.debug_struct("WorkerHandle")
            .field("endpoint", &self.key())
            .field("name", &tags.name)
            .field("group", &tags.group)
            .finish()
    }
}

fn unexpected(op: &str, payload: &Payload) -> Error {
    Error::Protocol(format!("{} answered with a {} payload", op, payload.kind()))
}

fn expect_unit(op: &str, payload: Payload) -> Result<()> {
    match payload {
        Payload::Unit => Ok(()),
        other => Err(unexpected(op, &other)),
    }
}

fn expect_value(op: &str, payload: Payload) -> Result<Value> {
    match payload {
        Payload::Value(value) => Ok(value),
        other => Err(unexpected(op, &other)),
    }
}

fn expect_flag(op: &str, payload: Payload) -> Result<bool> {
    match payload {
        Payload::Flag(flag) => Ok(flag),
        other => Err(unexpected(op, &other)),
    }
}

fn expect_bindings(op: &str, payload: Payload) -> Result<BTreeMap<String, Value>> {
    match payload {
        Payload::Bindings(bindings) => Ok(bindings),
        other => Err(unexpected(op, &other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::LocalTransport;
    use crate::server::{EngineSettings, WorkerEngine};

    async fn local() -> WorkerHandle {
        let transport = LocalTransport::new(Arc::new(WorkerEngine::new(EngineSettings::default())));
        let endpoint = transport.endpoint();
        WorkerHandle::connect_with(endpoint, Arc::new(transport)).await.unwrap()
    }

    #[tokio::test]
    async fn test_namespace_roundtrip() {
        let handle = local().await;
        handle.set("x", 41).await.unwrap();
        handle.execute("y = x + 1").await.unwrap();

        assert_eq!(handle.get("y").await.unwrap(), Value::Int(42));
        assert_eq!(handle.list().await.unwrap(), vec!["x", "y"]);

        let many = handle.get_many(&["x", "y"]).await.unwrap();
        assert_eq!(many.len(), 2);

        handle.clear().await.unwrap();
        assert!(handle.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_volatile_leaves_namespace_alone() {
        let handle = local().await;
        handle.set("keep", "me").await.unwrap();
        let before = handle.list().await.unwrap();

        let mut bindings = BTreeMap::new();
        bindings.insert("n".to_string(), Value::Int(3));
        let out = handle
            .volatile_execute("m = n * 2", bindings, &["m"])
            .await
            .unwrap();
        assert_eq!(out["m"], Value::Int(6));
        assert_eq!(handle.list().await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_tags_are_shared_between_clones() {
        let handle = local().await;
        let clone = handle.clone();
        clone.set_name("alpha");
        clone.set_group("gpu");

        assert_eq!(handle.name().as_deref(), Some("alpha"));
        assert_eq!(handle.group().as_deref(), Some("gpu"));
        assert_eq!(handle.ip(), "localhost");
        assert_eq!(handle.hostname(), handle.cached_info().hostname);
    }

    #[tokio::test]
    async fn test_benchmark_report() {
        let handle = local().await;
        let report = handle.benchmark(2_000).await.unwrap();
        assert!(report.compute_secs >= 0.0);
        assert!(report.network_secs >= 0.0);
        assert!(!report.busy);
    }

    #[tokio::test]
    async fn test_benchmark_reports_busy_after_workload() {
        let engine = Arc::new(WorkerEngine::new(EngineSettings::default()));
        let transport = LocalTransport::new(Arc::clone(&engine));
        let handle = WorkerHandle::connect_with(transport.endpoint(), Arc::new(transport))
            .await
            .unwrap();

        let guard = engine.lock().acquire().await.unwrap();
        let report = handle.benchmark(500).await.unwrap();
        assert!(report.busy);

        drop(guard);
        assert!(!handle.benchmark(500).await.unwrap().busy);
    }

    #[tokio::test]
    async fn test_benchmark_rejects_oversized_cycles() {
        let handle = local().await;
        let err = handle.benchmark(u64::MAX).await.unwrap_err();
        assert!(matches!(err, Error::Operation(_)));
        assert!(err.to_string().contains("out of range"));
    }

    #[tokio::test]
    async fn test_ping_and_wait() {
        let handle = local().await;
        assert_eq!(handle.ping().await.unwrap(), "pong");
        assert!(!handle.is_busy().await.unwrap());
        assert!(handle.wait(Some(Duration::from_millis(10))).await.unwrap());
        assert_eq!(handle.identity().await.unwrap(), handle.cached_info().identity());
    }
}
