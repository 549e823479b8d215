//! Call middleware
//!
//! Every request passes through an ordered chain of stages before it
//! reaches the engine. Stages are entered in order and left in reverse.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use crate::error::Result;
use crate::namespace::{LockGuard, WorkerLock};
use crate::protocol::{Access, Payload, Request};

use super::EngineSettings;

// ─────────────────────────────────────────────────────────────────
// Stats
// ─────────────────────────────────────────────────────────────────

/// Counters observed by the chain
#[derive(Debug, Default)]
pub struct EngineStats {
    calls: AtomicU64,
    exclusive_in_flight: AtomicUsize,
    exclusive_peak: AtomicUsize,
}

impl EngineStats {
    /// Total calls handled
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    /// Highest number of exclusive calls ever running at once
    pub fn exclusive_peak(&self) -> usize {
        self.exclusive_peak.load(Ordering::SeqCst)
    }

    fn enter_exclusive(self: &Arc<Self>) -> InFlight {
        let now = self.exclusive_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.exclusive_peak.fetch_max(now, Ordering::SeqCst);
        InFlight(self.clone())
    }
}

struct InFlight(Arc<EngineStats>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.exclusive_in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

// ─────────────────────────────────────────────────────────────────
// Stages
// ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Holds the worker lock around exclusive operations
    Exclusive,
    /// Logs each call and its outcome
    Trace,
    /// Logs call durations
    Timing,
}

/// What a stage left behind on entry, consumed on exit
enum Entered {
    Locked(InFlight, LockGuard),
    Traced(u64),
    Timed(Instant),
    Passed,
}

#[derive(Debug, Clone)]
pub struct MiddlewareChain {
    stages: Vec<Stage>,
}

impl MiddlewareChain {
    pub fn new(stages: Vec<Stage>) -> Self {
        Self { stages }
    }

    /// Lock stage always; trace and timing stages when enabled
    pub fn from_settings(settings: &EngineSettings) -> Self {
        let mut stages = vec![Stage::Exclusive];
        if settings.debug {
            stages.push(Stage::Trace);
        }
        if settings.timing {
            stages.push(Stage::Timing);
        }
        Self::new(stages)
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Run `call` inside every stage
    pub async fn run<F, Fut>(
        &self,
        lock: &WorkerLock,
        stats: &Arc<EngineStats>,
        request: &Request,
        call: F,
    ) -> Result<Payload>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<Payload>>,
    {
        let seq = stats.calls.fetch_add(1, Ordering::Relaxed) + 1;
        let op = request.name();

        let mut entered = Vec::with_capacity(self.stages.len());
        for stage in &self.stages {
            let token = match stage {
                Stage::Exclusive if request.access() == Access::Exclusive => {
                    let guard = lock.acquire().await?;
                    Entered::Locked(stats.enter_exclusive(), guard)
                }
                Stage::Exclusive => Entered::Passed,
                Stage::Trace => {
                    debug!(seq, op, "Call started");
                    Entered::Traced(seq)
                }
                Stage::Timing => Entered::Timed(Instant::now()),
            };
            entered.push(token);
        }

        let result = call().await;

        while let Some(token) = entered.pop() {
            match token {
                Entered::Traced(seq) => match &result {
                    Ok(payload) => debug!(seq, op, payload = payload.kind(), "Call finished"),
                    Err(e) => debug!(seq, op, error = %e, "Call failed"),
                },
                Entered::Timed(start) => {
                    info!(op, elapsed_ms = start.elapsed().as_secs_f64() * 1000.0, "Call timing");
                }
                Entered::Locked(in_flight, guard) => {
                    drop(in_flight);
                    drop(guard);
                }
                Entered::Passed => {}
            }
        }

        result
    }
}
