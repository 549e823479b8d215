//! Worker engine
//!
//! Owns one namespace store, its lock and the immutable worker info, and
//! turns requests into payloads. Script work runs on the blocking pool.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::info;

use crate::error::{Error, Result};
use crate::namespace::{volatile_execute, NamespaceStore, SourceUnits, WorkerLock};
use crate::protocol::{Payload, Request};
use crate::system::{generate_worker_id, WorkerIdentity, WorkerInfo};

use super::middleware::{EngineStats, MiddlewareChain};

/// Engine tuning
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// How long an exclusive call waits for the worker lock
    pub lock_timeout: Duration,

    /// Log every call
    pub debug: bool,

    /// Log call durations
    pub timing: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            lock_timeout: crate::namespace::DEFAULT_LOCK_TIMEOUT,
            debug: false,
            timing: false,
        }
    }
}

pub struct WorkerEngine {
    info: WorkerInfo,
    store: Arc<Mutex<NamespaceStore>>,
    units: SourceUnits,
    lock: WorkerLock,
    chain: MiddlewareChain,
    stats: Arc<EngineStats>,
}

impl WorkerEngine {
    /// Create an engine with a freshly generated worker id
    pub fn new(settings: EngineSettings) -> Self {
        Self::with_id(generate_worker_id(), settings)
    }

    pub fn with_id(worker_id: impl Into<String>, settings: EngineSettings) -> Self {
        let store = NamespaceStore::new();
        let units = store.units();
        let info = WorkerInfo::collect(worker_id);
        info!(worker_id = %info.worker_id, "Worker engine created");

        Self {
            info,
            store: Arc::new(Mutex::new(store)),
            units,
            lock: WorkerLock::new(settings.lock_timeout),
            chain: MiddlewareChain::from_settings(&settings),
            stats: Arc::new(EngineStats::default()),
        }
    }

    pub fn info(&self) -> &WorkerInfo {
        &self.info
    }

    pub fn identity(&self) -> WorkerIdentity {
        self.info.identity()
    }

    pub fn worker_id(&self) -> &str {
        &self.info.worker_id
    }

    pub fn lock(&self) -> &WorkerLock {
        &self.lock
    }

    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    /// Handle one request through the middleware chain
    pub async fn handle(&self, request: Request) -> Result<Payload> {
        self.chain
            .run(&self.lock, &self.stats, &request, || self.dispatch(request.clone()))
            .await
    }

    async fn dispatch(&self, request: Request) -> Result<Payload> {
        match request {
            Request::Get { name } => self
                .with_store(move |s| s.get(&name))
                .await
                .map(Payload::Value),
            Request::GetMany { names } => self
                .with_store(move |s| s.get_many(&names))
                .await
                .map(Payload::Bindings),
            Request::Set { name, value } => {
                self.with_store(move |s| s.set(&name, value)).await?;
                Ok(Payload::Unit)
            }
            Request::SetMany { bindings } => {
                self.with_store(move |s| s.set_many(bindings)).await?;
                Ok(Payload::Unit)
            }
            Request::List => self.with_store(|s| Ok(s.list())).await.map(Payload::Names),
            Request::Clear => {
                self.with_store(|s| {
                    s.clear();
                    Ok(())
                })
                .await?;
                Ok(Payload::Unit)
            }
            Request::Execute { code, bindings } => {
                self.with_store(move |s| {
                    s.set_many(bindings)?;
                    s.execute(&code)
                })
                .await?;
                Ok(Payload::Unit)
            }
            Request::Evaluate { code, bindings } => self
                .with_store(move |s| {
                    s.set_many(bindings)?;
                    s.evaluate(&code)
                })
                .await
                .map(Payload::Value),
            Request::VolatileExecute {
                code,
                bindings,
                outputs,
            } => {
                let units = self.units.clone();
                blocking(move || volatile_execute(&units, &code, bindings, &outputs))
                    .await
                    .map(Payload::Bindings)
            }
            Request::Install { name, source } => {
                self.with_store(move |s| s.install(&name, &source)).await?;
                Ok(Payload::Unit)
            }
            Request::Import { name } => {
                self.with_store(move |s| s.import(&name)).await?;
                Ok(Payload::Unit)
            }
            Request::IsModuleReference { name } => self
                .with_store(move |s| Ok(s.is_module_reference(&name)))
                .await
                .map(Payload::Flag),
            Request::Ping => Ok(Payload::Text("pong".to_string())),
            Request::IsBusy => Ok(Payload::Flag(self.lock.is_busy())),
            Request::Wait { timeout_ms } => {
                let free = self.lock.wait(timeout_ms.map(Duration::from_millis)).await;
                Ok(Payload::Flag(free))
            }
            Request::GetIdentity => Ok(Payload::Identity(self.identity())),
            Request::Info => Ok(Payload::Info(self.info.clone())),
        }
    }

    async fn with_store<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut NamespaceStore) -> Result<T> + Send + 'static,
    {
        let store = self.store.clone();
        blocking(move || {
            let mut guard = store.lock();
            f(&mut *guard)
        })
        .await
    }
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Internal(format!("worker task failed: {}", e)))?
}
