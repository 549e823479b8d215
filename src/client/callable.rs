//! Remote callables
//!
//! A callable bound in a worker namespace, invoked by rendering the
//! arguments as script literals and evaluating one call expression.

use crate::error::Result;
use crate::script::Value;

use super::handle::WorkerHandle;

#[derive(Debug, Clone)]
pub struct RemoteCallable {
    handle: WorkerHandle,
    name: String,
}

impl RemoteCallable {
    pub fn new(handle: WorkerHandle, name: impl Into<String>) -> Self {
        Self {
            handle,
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handle(&self) -> &WorkerHandle {
        &self.handle
    }

    /// Source text of the call, e.g. `scale(2, k=3)`
    pub fn expression(&self, args: &[Value], kwargs: &[(&str, Value)]) -> String {
        let mut parts: Vec<String> = args.iter().map(Value::to_literal).collect();
        parts.extend(
            kwargs
                .iter()
                .map(|(key, value)| format!("{}={}", key, value.to_literal())),
        );
        format!("{}({})", self.name, parts.join(", "))
    }

    /// Invoke remotely in a single round trip
    pub async fn call(&self, args: &[Value], kwargs: &[(&str, Value)]) -> Result<Value> {
        let expr = self.expression(args, kwargs);
        self.handle.evaluate(&expr).await
    }
}
