//! Namespace proxy
//!
//! Dotted-path view over a worker namespace. Looking up a name classifies
//! it as a module (another proxy), a callable or a plain value.

use crate::error::{Error, Result};
use crate::script::Value;

use super::callable::RemoteCallable;
use super::handle::WorkerHandle;

/// What a name resolved to on the worker
#[derive(Debug, Clone)]
pub enum Resolved {
    Module(NamespaceProxy),
    Callable(RemoteCallable),
    Value(Value),
}

#[derive(Debug, Clone)]
pub struct NamespaceProxy {
    handle: WorkerHandle,
    prefix: Option<String>,
}

impl NamespaceProxy {
    /// Proxy over the worker's root namespace
    pub fn new(handle: WorkerHandle) -> Self {
        Self {
            handle,
            prefix: None,
        }
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    pub fn handle(&self) -> &WorkerHandle {
        &self.handle
    }

    fn qualify(&self, name: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}.{}", prefix, name),
            None => name.to_string(),
        }
    }

    /// Proxy rooted one level deeper, without checking it exists
    pub fn child(&self, name: &str) -> NamespaceProxy {
        Self {
            handle: self.handle.clone(),
            prefix: Some(self.qualify(name)),
        }
    }

    /// Classify `name`: module first, then callable, then value
    pub async fn resolve(&self, name: &str) -> Result<Resolved> {
        let path = self.qualify(name);

        if self.handle.is_module_reference(&path).await? {
            return Ok(Resolved::Module(self.child(name)));
        }

        match self.handle.evaluate(&format!("callable({})", path)).await {
            Ok(Value::Bool(true)) => {
                return Ok(Resolved::Callable(self.handle.associate_callable(&path)))
            }
            Ok(_) => {}
            // Unbound names are reported by the value lookup below
            Err(Error::Execution { .. }) => {}
            Err(e) => return Err(e),
        }

        self.handle.get(&path).await.map(Resolved::Value)
    }

    /// Value bound at `name`; modules and callables are rejected
    pub async fn get(&self, name: &str) -> Result<Value> {
        match self.resolve(name).await? {
            Resolved::Value(value) => Ok(value),
            Resolved::Module(_) => Err(Error::operation(format!(
                "'{}' is a module, not a value",
                self.qualify(name)
            ))),
            Resolved::Callable(_) => Err(Error::operation(format!(
                "'{}' is callable, not a value",
                self.qualify(name)
            ))),
        }
    }

    pub async fn set(&self, name: &str, value: impl Into<Value>) -> Result<()> {
        self.handle.set(&self.qualify(name), value).await
    }

    pub async fn delete(&self, name: &str) -> Result<()> {
        self.handle.execute(&format!("del {}", self.qualify(name))).await
    }

    /// Names bound at this level
    pub async fn names(&self) -> Result<Vec<String>> {
        let prefix = match &self.prefix {
            None => return self.handle.list().await,
            Some(prefix) => prefix,
        };

        match self.handle.evaluate(&format!("dir({})", prefix)).await? {
            Value::List(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::Str(s) => Ok(s),
                    other => Err(Error::Protocol(format!(
                        "dir() returned a {}",
                        other.type_name()
                    ))),
                })
                .collect(),
            other => Err(Error::Protocol(format!(
                "dir() returned a {}",
                other.type_name()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::client::LocalTransport;
    use crate::server::{EngineSettings, WorkerEngine};

    async fn proxy() -> NamespaceProxy {
        let transport = LocalTransport::new(Arc::new(WorkerEngine::new(EngineSettings::default())));
        let handle = WorkerHandle::connect_with(transport.endpoint(), Arc::new(transport))
            .await
            .unwrap();
        handle
            .install("geometry", "unit = 2\nfn area(w, h) = w * h * unit")
            .await
            .unwrap();
        handle.execute("import geometry\nlimit = 10").await.unwrap();
        handle.proxy()
    }

    #[tokio::test]
    async fn test_classification_order() {
        let root = proxy().await;

        let geometry = match root.resolve("geometry").await.unwrap() {
            Resolved::Module(p) => p,
            other => panic!("expected module, got {:?}", other),
        };
        assert_eq!(geometry.prefix(), Some("geometry"));

        match geometry.resolve("area").await.unwrap() {
            Resolved::Callable(c) => {
                assert_eq!(c.name(), "geometry.area");
                let v = c.call(&[Value::Int(3), Value::Int(4)], &[]).await.unwrap();
                assert_eq!(v, Value::Int(24));
            }
            other => panic!("expected callable, got {:?}", other),
        }

        match root.resolve("limit").await.unwrap() {
            Resolved::Value(v) => assert_eq!(v, Value::Int(10)),
            other => panic!("expected value, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_name() {
        let root = proxy().await;
        let err = root.resolve("nothing").await.unwrap_err();
        assert!(matches!(err, Error::NameNotFound { .. }));
    }

    #[tokio::test]
    async fn test_nested_set_and_delete() {
        let root = proxy().await;
        let geometry = root.child("geometry");

        geometry.set("unit", 5).await.unwrap();
        assert_eq!(geometry.get("unit").await.unwrap(), Value::Int(5));
        assert!(geometry.get("area").await.is_err());

        geometry.delete("unit").await.unwrap();
        assert_eq!(geometry.names().await.unwrap(), vec!["area"]);
        assert_eq!(root.names().await.unwrap(), vec!["geometry", "limit"]);
    }
}
