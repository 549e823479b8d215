//! Worker groups
//!
//! An ordered collection of handles with filtering, health checking and
//! benchmark-based selection.

use std::path::Path;

use futures_util::future::join_all;
use tracing::{debug, info, warn};

use crate::client::{rank, BenchmarkReport, ConnectOptions, Criterion, WorkerHandle};
use crate::error::{Error, Result};
use crate::protocol::Endpoint;

use super::multirun::{JoinOptions, Operation, Output};

/// Match on handle tags and attributes; unset fields match anything
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerFilter {
    pub name: Option<String>,
    pub group: Option<String>,
    pub ip: Option<String>,
    pub hostname: Option<String>,
}

impl WorkerFilter {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = Some(ip.into());
        self
    }

    pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    pub fn matches(&self, handle: &WorkerHandle) -> bool {
        fn accepts(wanted: &Option<String>, actual: Option<&str>) -> bool {
            match wanted {
                None => true,
                Some(w) => actual == Some(w.as_str()),
            }
        }

        accepts(&self.name, handle.name().as_deref())
            && accepts(&self.group, handle.group().as_deref())
            && accepts(&self.ip, Some(handle.ip()))
            && accepts(&self.hostname, Some(handle.hostname()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectMode {
    /// Only the best worker
    #[default]
    Single,
    /// Every benchmarked worker, best first
    Ranked,
}

#[derive(Debug, Clone)]
pub enum Selection {
    Single(WorkerHandle),
    Ranked(WorkerGroup),
}

#[derive(Debug, Clone, Default)]
pub struct WorkerGroup {
    members: Vec<WorkerHandle>,
}

impl WorkerGroup {
    pub fn new(members: Vec<WorkerHandle>) -> Self {
        Self { members }
    }

    // ─────────────────────────────────────────────────────────────
    // Building from the discovery file
    // ─────────────────────────────────────────────────────────────

    /// Endpoint lines of a discovery file; other lines are skipped
    pub fn parse_endpoints(text: &str) -> Result<Vec<Endpoint>> {
        text.lines()
            .filter(|line| Endpoint::is_endpoint_line(line))
            .map(|line| line.trim().parse())
            .collect()
    }

    /// Connect to every endpoint in `text`; fails if any worker is unreachable
    pub async fn connect_from_text(text: &str, options: ConnectOptions) -> Result<Self> {
        let endpoints = Self::parse_endpoints(text)?;
        let connects = endpoints
            .into_iter()
            .map(|endpoint| WorkerHandle::connect_to(endpoint, options));

        let members = join_all(connects)
            .await
            .into_iter()
            .collect::<Result<Vec<_>>>()?;
        info!(members = members.len(), "Worker group connected");
        Ok(Self::new(members))
    }

    pub async fn connect_from_file(path: &Path, options: ConnectOptions) -> Result<Self> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| Error::IoRead {
                path: path.to_path_buf(),
                source: e,
            })?;
        Self::connect_from_text(&text, options).await
    }

    // ─────────────────────────────────────────────────────────────
    // Membership
    // ─────────────────────────────────────────────────────────────

    pub fn push(&mut self, handle: WorkerHandle) {
        self.members.push(handle);
    }

    pub fn remove(&mut self, index: usize) -> Option<WorkerHandle> {
        (index < self.members.len()).then(|| self.members.remove(index))
    }

    pub fn get(&self, index: usize) -> Option<&WorkerHandle> {
        self.members.get(index)
    }

    /// Subgroup at `indices`, in the order given; out-of-range indices are skipped
    pub fn select(&self, indices: &[usize]) -> WorkerGroup {
        Self::new(
            indices
                .iter()
                .filter_map(|&i| self.members.get(i).cloned())
                .collect(),
        )
    }

    pub fn iter(&self) -> std::slice::Iter<'_, WorkerHandle> {
        self.members.iter()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn handles(&self) -> &[WorkerHandle] {
        &self.members
    }

    pub fn filter(&self, filter: &WorkerFilter) -> WorkerGroup {
        Self::new(
            self.members
                .iter()
                .filter(|h| filter.matches(h))
                .cloned()
                .collect(),
        )
    }

    // ─────────────────────────────────────────────────────────────
    // Health
    // ─────────────────────────────────────────────────────────────

    /// Positions of members whose ping failed, for any reason
    pub async fn detect_unreachable(&self) -> Vec<usize> {
        let pings = self.members.iter().map(|h| h.ping());
        join_all(pings)
            .await
            .into_iter()
            .enumerate()
            .filter_map(|(index, result)| match result {
                Ok(_) => None,
                Err(e) => {
                    warn!(worker = %self.members[index].key(), error = %e, "Worker unreachable");
                    Some(index)
                }
            })
            .collect()
    }

    pub async fn unreachable(&self) -> WorkerGroup {
        let dead = self.detect_unreachable().await;
        self.select(&dead)
    }

    /// Drop unreachable members; returns how many were removed
    pub async fn prune_unreachable(&mut self) -> usize {
        let dead = self.detect_unreachable().await;
        for &index in dead.iter().rev() {
            self.members.remove(index);
        }
        if !dead.is_empty() {
            info!(removed = dead.len(), remaining = self.members.len(), "Pruned unreachable workers");
        }
        dead.len()
    }

    // ─────────────────────────────────────────────────────────────
    // Selection
    // ─────────────────────────────────────────────────────────────

    /// Benchmark every member in parallel and pick by rank
    pub async fn select_fastest(
        &self,
        mode: SelectMode,
        criterion: Criterion,
        cycles: u64,
    ) -> Result<Selection> {
        self.select_fastest_within(mode, criterion, cycles, JoinOptions::default())
            .await
    }

    /// As [`select_fastest`](Self::select_fastest), giving up on members
    /// still running when `join` times out
    pub async fn select_fastest_within(
        &self,
        mode: SelectMode,
        criterion: Criterion,
        cycles: u64,
        join: JoinOptions,
    ) -> Result<Selection> {
        let ranked = self.benchmark(criterion, cycles, join).await;
        if ranked.is_empty() {
            return Err(Error::operation("no worker completed the benchmark"));
        }

        let mut handles = ranked.into_iter().map(|(handle, _)| handle);
        match mode {
            SelectMode::Single => handles
                .next()
                .map(Selection::Single)
                .ok_or_else(|| Error::operation("no worker completed the benchmark")),
            SelectMode::Ranked => Ok(Selection::Ranked(Self::new(handles.collect()))),
        }
    }

    /// Completed benchmarks, best first
    pub async fn benchmark(
        &self,
        criterion: Criterion,
        cycles: u64,
        join: JoinOptions,
    ) -> Vec<(WorkerHandle, BenchmarkReport)> {
        let run = self.run_parallel(&Operation::Benchmark { cycles });
        let result = run.join(join).await;

        let reports: Vec<(WorkerHandle, BenchmarkReport)> = result
            .iter()
            .filter_map(|(key, outcome)| match outcome.output() {
                Some(Output::Benchmark(report)) => self
                    .members
                    .iter()
                    .find(|h| &h.key() == key)
                    .map(|h| (h.clone(), *report)),
                _ => {
                    debug!(worker = %key, "Benchmark left out of ranking");
                    None
                }
            })
            .collect();
        rank(reports, criterion)
    }
}

impl<'a> IntoIterator for &'a WorkerGroup {
    type Item = &'a WorkerHandle;
    type IntoIter = std::slice::Iter<'a, WorkerHandle>;

    fn into_iter(self) -> Self::IntoIter {
        self.members.iter()
    }
}

impl FromIterator<WorkerHandle> for WorkerGroup {
    fn from_iter<I: IntoIterator<Item = WorkerHandle>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
