//! Worker lock
//!
//! A single-permit gate that serializes namespace-mutating requests.
//! Holders get a [`LockGuard`]; the permit is returned when the guard
//! drops, including when the owning request task is cancelled.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};
use tracing::trace;

use crate::error::{Error, Result};

/// Default acquisition timeout
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(30);

/// Mutual-exclusion gate for one worker
#[derive(Clone)]
pub struct WorkerLock {
    permits: Arc<Semaphore>,
    busy: Arc<watch::Sender<bool>>,
    timeout: Duration,
}

/// Proof of exclusive access; releases the gate on drop
#[derive(Debug)]
pub struct LockGuard {
    permit: Option<OwnedSemaphorePermit>,
    busy: Arc<watch::Sender<bool>>,
}

impl WorkerLock {
    pub fn new(timeout: Duration) -> Self {
        let (busy, _) = watch::channel(false);
        Self {
            permits: Arc::new(Semaphore::new(1)),
            busy: Arc::new(busy),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Acquire the gate, waiting at most the configured timeout
    pub async fn acquire(&self) -> Result<LockGuard> {
        let permit = tokio::time::timeout(self.timeout, self.permits.clone().acquire_owned())
            .await
            .map_err(|_| Error::LockTimeout {
                timeout_ms: self.timeout.as_millis() as u64,
            })?
            .map_err(|_| Error::Internal("worker lock closed".to_string()))?;

        self.busy.send_replace(true);
        trace!("Worker lock acquired");
        Ok(LockGuard {
            permit: Some(permit),
            busy: self.busy.clone(),
        })
    }

    /// Whether the gate is currently held; never blocks
    pub fn is_busy(&self) -> bool {
        self.permits.available_permits() == 0
    }

    /// Wait until the gate is observed free, without acquiring it.
    ///
    /// Returns `false` if `timeout` elapsed first. `None` waits forever.
    pub async fn wait(&self, timeout: Option<Duration>) -> bool {
        let mut rx = self.busy.subscribe();
        let free = async {
            loop {
                if !self.is_busy() {
                    return;
                }
                if rx.changed().await.is_err() {
                    return;
                }
            }
        };
        match timeout {
            Some(limit) => tokio::time::timeout(limit, free).await.is_ok(),
            None => {
                free.await;
                true
            }
        }
    }
}

impl Default for WorkerLock {
    fn default() -> Self {
        Self::new(DEFAULT_LOCK_TIMEOUT)
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        // Return the permit before announcing, so woken waiters see it free
        drop(self.permit.take());
        self.busy.send_replace(false);
        trace!("Worker lock released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_acquire_and_release() {
        let lock = WorkerLock::new(Duration::from_millis(50));
        assert!(!lock.is_busy());

        let guard = lock.acquire().await.unwrap();
        assert!(lock.is_busy());
        drop(guard);
        assert!(!lock.is_busy());
    }

    #[tokio::test]
    async fn test_acquire_times_out() {
        let lock = WorkerLock::new(Duration::from_millis(30));
        let _held = lock.acquire().await.unwrap();

        let err = lock.acquire().await.err().unwrap();
        assert!(matches!(err, Error::LockTimeout { timeout_ms: 30 }));
    }

    #[tokio::test]
    async fn test_wait_observes_release() {
        let lock = WorkerLock::new(Duration::from_secs(1));
        let guard = lock.acquire().await.unwrap();

        let waiter = {
            let lock = lock.clone();
            tokio::spawn(async move { lock.wait(Some(Duration::from_secs(2))).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(guard);

        assert!(waiter.await.unwrap());
        assert!(!lock.is_busy());
    }

    #[tokio::test]
    async fn test_waiting_acquirer_woken_on_release() {
        let lock = WorkerLock::new(Duration::from_secs(1));
        let held = lock.acquire().await.unwrap();

        let mut second = tokio_test::task::spawn(lock.acquire());
        tokio_test::assert_pending!(second.poll());

        drop(held);
        assert!(second.is_woken());
        tokio_test::assert_ready_ok!(second.poll());
    }

    #[tokio::test]
    async fn test_guard_debug_output() {
        let lock = WorkerLock::default();
        let guard = lock.acquire().await.unwrap();
        assert!(format!("{:?}", guard).starts_with("LockGuard"));
    }

    #[tokio::test]
    async fn test_wait_reports_timeout() {
        let lock = WorkerLock::new(Duration::from_secs(1));
        let _held = lock.acquire().await.unwrap();
        assert!(!lock.wait(Some(Duration::from_millis(20))).await);
    }

    #[tokio::test]
    async fn test_guard_released_on_cancel() {
        let lock = WorkerLock::new(Duration::from_secs(1));
        let task = {
            let lock = lock.clone();
            tokio::spawn(async move {
                let _guard = lock.acquire().await.unwrap();
                tokio::time::sleep(Duration::from_secs(60)).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(lock.is_busy());

        task.abort();
        let _ = task.await;
        assert!(lock.wait(Some(Duration::from_millis(200))).await);
    }
}
