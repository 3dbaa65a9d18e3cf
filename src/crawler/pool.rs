//! Bounded worker pool for per-account crawl units
//!
//! The pool dispatches one task per frontier account and limits how many run
//! at once with a semaphore. Dispatch stops as soon as a stop is requested or
//! a unit reports a fatal error; tasks already running are always drained
//! before the pool returns.

use crate::api::AccountId;
use crate::SpiderError;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;

/// Requests a cooperative stop of a running crawl
#[derive(Debug)]
pub struct StopHandle {
    tx: watch::Sender<bool>,
}

impl StopHandle {
    /// Asks every holder of a matching `StopSignal` to stop
    pub fn stop(&self) {
        // Receivers may all be gone already
        let _ = self.tx.send(true);
    }

    pub fn signal(&self) -> StopSignal {
        StopSignal {
            rx: self.tx.subscribe(),
        }
    }
}

/// Observes stop requests made through a `StopHandle`
#[derive(Debug, Clone)]
pub struct StopSignal {
    rx: watch::Receiver<bool>,
}

impl StopSignal {
    /// A signal that is never raised
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow()
    }
}

/// Creates a connected stop handle and signal
pub fn stop_channel() -> (StopHandle, StopSignal) {
    let (tx, rx) = watch::channel(false);
    (StopHandle { tx }, StopSignal { rx })
}

/// Outcome of running one batch of units through the pool
#[derive(Debug)]
pub struct PoolOutcome<T> {
    /// Results of every unit that ran, in completion order
    pub results: Vec<T>,
    /// Accounts never dispatched because a stop was requested
    pub undispatched: usize,
}

/// Runs crawl units with bounded concurrency
pub struct WorkerPool {
    workers: usize,
    stop: StopSignal,
}

impl WorkerPool {
    pub fn new(workers: usize, stop: StopSignal) -> Self {
        Self {
            workers: workers.max(1),
            stop,
        }
    }

    /// Runs `unit` once per account, at most `workers` at a time
    ///
    /// # Returns
    ///
    /// * `Ok(PoolOutcome)` - Every dispatched unit finished without a fatal error
    /// * `Err(SpiderError)` - The first fatal error reported by a unit
    pub async fn run<T, F, Fut>(
        &self,
        accounts: Vec<AccountId>,
        unit: F,
    ) -> Result<PoolOutcome<T>, SpiderError>
    where
        F: Fn(AccountId) -> Fut,
        Fut: Future<Output = Result<T, SpiderError>> + Send + 'static,
        T: Send + 'static,
    {
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let fatal = Arc::new(AtomicBool::new(false));
        let mut tasks = JoinSet::new();
        let total = accounts.len();
        let mut dispatched = 0usize;

        for account in accounts {
            if self.stop.is_stopped() || fatal.load(Ordering::SeqCst) {
                break;
            }

            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| SpiderError::Worker(e.to_string()))?;

            // Re-check: the wait for a permit may have been long
            if self.stop.is_stopped() || fatal.load(Ordering::SeqCst) {
                break;
            }

            let task = unit(account);
            let fatal = Arc::clone(&fatal);
            tasks.spawn(async move {
                let _permit = permit;
                let result = task.await;
                if result.is_err() {
                    fatal.store(true, Ordering::SeqCst);
                }
                result
            });
            dispatched += 1;
        }

        let undispatched = total - dispatched;
        if undispatched > 0 && !fatal.load(Ordering::SeqCst) {
            tracing::info!(
                "Stop requested; {} accounts left undispatched",
                undispatched
            );
        }

        let mut results = Vec::with_capacity(dispatched);
        let mut first_error = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(value)) => results.push(value),
                Ok(Err(e)) => {
                    tracing::error!("Crawl unit failed: {}", e);
                    first_error.get_or_insert(e);
                }
                Err(e) => {
                    tracing::error!("Crawl worker panicked: {}", e);
                    first_error.get_or_insert(SpiderError::Worker(e.to_string()));
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(PoolOutcome {
                results,
                undispatched,
            }),
        }
    }
}
