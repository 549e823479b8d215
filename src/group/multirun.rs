//! Multi-run orchestration
//!
//! Runs one handle operation across every distinct member of a group.
//! A member's failure is captured in its own slot and never aborts the
//! run as a whole.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::client::{BenchmarkReport, WorkerHandle};
use crate::error::{Error, Result};
use crate::script::Value;
use crate::system::{WorkerIdentity, WorkerInfo};

use super::WorkerGroup;

/// Members are keyed by their endpoint string
pub type WorkerKey = String;

/// A worker handle operation together with its arguments
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Get { name: String },
    GetMany { names: Vec<String> },
    Set { name: String, value: Value },
    SetMany { bindings: BTreeMap<String, Value> },
    List,
    Clear,
    Execute { code: String, bindings: BTreeMap<String, Value> },
    Evaluate { code: String, bindings: BTreeMap<String, Value> },
    VolatileExecute {
        code: String,
        bindings: BTreeMap<String, Value>,
        outputs: Vec<String>,
    },
    Install { name: String, source: String },
    Import { name: String },
    IsModuleReference { name: String },
    Call {
        name: String,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    },
    Ping,
    IsBusy,
    Wait { timeout: Option<Duration> },
    Identity,
    Info,
    Benchmark { cycles: u64 },
}

impl Operation {
    pub fn execute(code: impl Into<String>) -> Self {
        Operation::Execute {
            code: code.into(),
            bindings: BTreeMap::new(),
        }
    }

    pub fn evaluate(code: impl Into<String>) -> Self {
        Operation::Evaluate {
            code: code.into(),
            bindings: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Operation::Get { .. } => "get",
            Operation::GetMany { .. } => "get_many",
            Operation::Set { .. } => "set",
            Operation::SetMany { .. } => "set_many",
            Operation::List => "list",
            Operation::Clear => "clear",
            Operation::Execute { .. } => "execute",
            Operation::Evaluate { .. } => "evaluate",
            Operation::VolatileExecute { .. } => "volatile_execute",
            Operation::Install { .. } => "install",
            Operation::Import { .. } => "import",
            Operation::IsModuleReference { .. } => "is_module_reference",
            Operation::Call { .. } => "call",
            Operation::Ping => "ping",
            Operation::IsBusy => "is_busy",
            Operation::Wait { .. } => "wait",
            Operation::Identity => "identity",
            Operation::Info => "info",
            Operation::Benchmark { .. } => "benchmark",
        }
    }

    /// Perform the operation against one worker
    pub async fn run(&self, handle: &WorkerHandle) -> Result<Output> {
        let output = match self {
            Operation::Get { name } => Output::Value(handle.get(name).await?),
            Operation::GetMany { names } => {
                let names: Vec<&str> = names.iter().map(String::as_str).collect();
                Output::Bindings(handle.get_many(&names).await?)
            }
            Operation::Set { name, value } => {
                handle.set(name, value.clone()).await?;
                Output::Unit
            }
            Operation::SetMany { bindings } => {
                handle.set_many(bindings.clone()).await?;
                Output::Unit
            }
            Operation::List => Output::Names(handle.list().await?),
            Operation::Clear => {
                handle.clear().await?;
                Output::Unit
            }
            Operation::Execute { code, bindings } => {
                handle.execute_with(code, bindings.clone()).await?;
                Output::Unit
            }
            Operation::Evaluate { code, bindings } => {
                Output::Value(handle.evaluate_with(code, bindings.clone()).await?)
            }
            Operation::VolatileExecute {
                code,
                bindings,
                outputs,
            } => {
                let outputs: Vec<&str> = outputs.iter().map(String::as_str).collect();
                Output::Bindings(
                    handle
                        .volatile_execute(code, bindings.clone(), &outputs)
                        .await?,
                )
            }
            Operation::Install { name, source } => {
                handle.install(name, source).await?;
                Output::Unit
            }
            Operation::Import { name } => {
                handle.import(name).await?;
                Output::Unit
            }
            Operation::IsModuleReference { name } => {
                Output::Flag(handle.is_module_reference(name).await?)
            }
            Operation::Call { name, args, kwargs } => {
                let kwargs: Vec<(&str, Value)> = kwargs
                    .iter()
                    .map(|(k, v)| (k.as_str(), v.clone()))
                    .collect();
                Output::Value(handle.associate_callable(name).call(args, &kwargs).await?)
            }
            Operation::Ping => Output::Text(handle.ping().await?),
            Operation::IsBusy => Output::Flag(handle.is_busy().await?),
            Operation::Wait { timeout } => Output::Flag(handle.wait(*timeout).await?),
            Operation::Identity => Output::Identity(handle.identity().await?),
            Operation::Info => Output::Info(Box::new(handle.info().await?)),
            Operation::Benchmark { cycles } => Output::Benchmark(handle.benchmark(*cycles).await?),
        };
        Ok(output)
    }
}

/// Result of one operation on one worker
#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    Unit,
    Value(Value),
    Names(Vec<String>),
    Bindings(BTreeMap<String, Value>),
    Flag(bool),
    Text(String),
    Identity(WorkerIdentity),
    Info(Box<WorkerInfo>),
    Benchmark(BenchmarkReport),
}

/// State of one member's slot
#[derive(Debug, Clone)]
pub enum Outcome {
    /// Parallel runs only: the member has not finished yet
    Pending,
    Done(Output),
    Failed(Arc<Error>),
}

impl Outcome {
    fn from_result(result: &std::result::Result<Output, Arc<Error>>) -> Self {
        match result {
            Ok(output) => Outcome::Done(output.clone()),
            Err(e) => Outcome::Failed(Arc::clone(e)),
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Outcome::Pending)
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Outcome::Done(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Outcome::Failed(_))
    }

    pub fn output(&self) -> Option<&Output> {
        match self {
            Outcome::Done(output) => Some(output),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&Error> {
        match self {
            Outcome::Failed(e) => Some(&**e),
            _ => None,
        }
    }

    /// Shortcut for outcomes carrying a single value
    pub fn value(&self) -> Option<&Value> {
        match self.output() {
            Some(Output::Value(value)) => Some(value),
            _ => None,
        }
    }
}

/// Per-member outcomes, in group order
#[derive(Debug, Clone, Default)]
pub struct MultiRunResult {
    entries: Vec<(WorkerKey, Outcome)>,
}

impl MultiRunResult {
    pub fn get(&self, key: &str) -> Option<&Outcome> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, o)| o)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&WorkerKey, &Outcome)> {
        self.entries.iter().map(|(k, o)| (k, o))
    }

    pub fn keys(&self) -> impl Iterator<Item = &WorkerKey> {
        self.entries.iter().map(|(k, _)| k)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.entries.iter().filter(|(_, o)| o.is_pending()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.entries.iter().filter(|(_, o)| o.is_failed()).count()
    }

    /// Every slot holds a value or a captured error
    pub fn is_complete(&self) -> bool {
        self.pending_count() == 0
    }
}

impl IntoIterator for MultiRunResult {
    type Item = (WorkerKey, Outcome);
    type IntoIter = std::vec::IntoIter<(WorkerKey, Outcome)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// How [`ParallelRun::join`] waits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinOptions {
    /// Give up after this long; `None` waits until every slot is filled
    pub timeout: Option<Duration>,

    /// Delay between checks of the slots
    pub poll_interval: Duration,
}

impl Default for JoinOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            poll_interval: Duration::from_millis(10),
        }
    }
}

type Slot = OnceLock<std::result::Result<Output, Arc<Error>>>;

/// A parallel run in flight
///
/// Each member's task writes only its own slot, exactly once. Dropping the
/// run does not cancel the tasks.
pub struct ParallelRun {
    operation: &'static str,
    keys: Arc<[WorkerKey]>,
    slots: Arc<[Slot]>,
    tasks: Vec<JoinHandle<()>>,
}

impl ParallelRun {
    pub fn operation(&self) -> &'static str {
        self.operation
    }

    /// Current state of every slot, without waiting
    pub fn snapshot(&self) -> MultiRunResult {
        let entries = self
            .keys
            .iter()
            .zip(self.slots.iter())
            .map(|(key, slot)| {
                let outcome = slot.get().map(Outcome::from_result).unwrap_or(Outcome::Pending);
                (key.clone(), outcome)
            })
            .collect();
        MultiRunResult { entries }
    }

    pub fn is_complete(&self) -> bool {
        self.slots.iter().all(|slot| slot.get().is_some())
    }

    /// Poll until no slot is pending or the timeout elapses
    pub async fn join(&self, options: JoinOptions) -> MultiRunResult {
        let started = Instant::now();
        loop {
            if self.is_complete() {
                break;
            }
            if let Some(limit) = options.timeout {
                if started.elapsed() >= limit {
                    debug!(op = self.operation, "Join timed out with pending members");
                    break;
                }
            }
            tokio::time::sleep(options.poll_interval).await;
        }
        self.snapshot()
    }

    /// Stop tasks that are still running; their slots stay pending
    pub fn abort(&self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

impl WorkerGroup {
    /// Members with duplicate keys collapsed, first occurrence wins
    fn distinct(&self) -> Vec<(WorkerKey, WorkerHandle)> {
        let mut seen = HashSet::new();
        self.iter()
            .filter_map(|handle| {
                let key = handle.key();
                seen.insert(key.clone()).then(|| (key, handle.clone()))
            })
            .collect()
    }

    /// Run on each member in turn; failures are recorded, not raised
    pub async fn run_sequential(&self, operation: &Operation) -> MultiRunResult {
        let mut entries = Vec::new();
        for (key, handle) in self.distinct() {
            let outcome = match operation.run(&handle).await {
                Ok(output) => Outcome::Done(output),
                Err(e) => {
                    debug!(op = operation.name(), worker = %key, error = %e, "Member failed");
                    Outcome::Failed(Arc::new(e))
                }
            };
            entries.push((key, outcome));
        }
        MultiRunResult { entries }
    }

    /// Dispatch to every member at once and return immediately
    pub fn run_parallel(&self, operation: &Operation) -> ParallelRun {
        let members = self.distinct();
        let keys: Arc<[WorkerKey]> = members.iter().map(|(k, _)| k.clone()).collect();
        let slots: Arc<[Slot]> = members.iter().map(|_| OnceLock::new()).collect();

        info!(op = operation.name(), members = members.len(), "Parallel run dispatched");

        let tasks = members
            .into_iter()
            .enumerate()
            .map(|(index, (key, handle))| {
                let slots = Arc::clone(&slots);
                let operation = operation.clone();
                tokio::spawn(async move {
                    let result = operation.run(&handle).await.map_err(|e| {
                        debug!(op = operation.name(), worker = %key, error = %e, "Member failed");
                        Arc::new(e)
                    });
                    let _ = slots[index].set(result);
                })
            })
            .collect();

        ParallelRun {
            operation: operation.name(),
            keys,
            slots,
            tasks,
        }
    }
}
