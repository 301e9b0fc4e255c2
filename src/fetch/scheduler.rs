//! Rate-limited fetch scheduler
//!
//! The scheduler is the single gateway to the network. It enforces:
//! - a global ceiling on simultaneous in-flight requests (semaphore)
//! - minimum spacing between dispatches to the same host
//! - FIFO dispatch per host (host gates are fair mutexes, so waiters
//!   acquire in arrival order)
//! - transparent retry of transient failures per the backoff policy
//!
//! Spacing waits happen while holding only the task's own host gate, never
//! a global permit, so one slow host cannot starve throughput to others.
//! Cancellation is observed at every suspension point.

use crate::fetch::backoff::BackoffPolicy;
use crate::fetch::client::{perform, FetchErrorKind, FetchFailure, FetchedPage};
use crate::model::FetchTask;
use reqwest::Client;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Mutex, Semaphore};

/// Per-host dispatch state
///
/// Decision methods take `now` as an argument so spacing logic can be unit
/// tested against synthetic instants.
#[derive(Debug)]
pub struct HostState {
    /// When the last request to this host was dispatched
    last_dispatch: Option<Instant>,

    /// Number of requests dispatched to this host during the run
    request_count: u64,
}

impl HostState {
    pub fn new() -> Self {
        Self {
            last_dispatch: None,
            request_count: 0,
        }
    }

    /// Time remaining until this host may receive another request
    ///
    /// Returns None when a request can be dispatched immediately.
    pub fn time_until_ready(&self, min_interval: Duration, now: Instant) -> Option<Duration> {
        let last = self.last_dispatch?;
        let elapsed = now.duration_since(last);
        if elapsed < min_interval {
            Some(min_interval - elapsed)
        } else {
            None
        }
    }

    /// Records a dispatch at `now`
    pub fn record_dispatch(&mut self, now: Instant) {
        self.last_dispatch = Some(now);
        self.request_count += 1;
    }

    pub fn request_count(&self) -> u64 {
        self.request_count
    }
}

impl Default for HostState {
    fn default() -> Self {
        Self::new()
    }
}

/// Scheduler limits, usually taken from the harvester config
#[derive(Debug, Clone)]
pub struct SchedulerLimits {
    /// Maximum simultaneous in-flight requests across all hosts
    pub concurrency_limit: usize,

    /// Minimum spacing between dispatches to one host
    pub per_host_min_interval: Duration,
}

/// Result of one submitted task: success or terminal failure
#[derive(Debug)]
pub struct TaskOutcome {
    /// The task as finalized, including its final attempt count
    pub task: FetchTask,

    pub result: Result<FetchedPage, FetchFailure>,
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Bounds concurrent requests and enforces per-host politeness
pub struct Scheduler {
    client: Client,
    limits: SchedulerLimits,
    backoff: BackoffPolicy,
    global: Arc<Semaphore>,
    hosts: Mutex<HashMap<String, Arc<Mutex<HostState>>>>,
    cancel: watch::Receiver<bool>,
}

impl Scheduler {
    pub fn new(
        client: Client,
        limits: SchedulerLimits,
        backoff: BackoffPolicy,
        cancel: watch::Receiver<bool>,
    ) -> Self {
        let global = Arc::new(Semaphore::new(limits.concurrency_limit));
        Self {
            client,
            limits,
            backoff,
            global,
            hosts: Mutex::new(HashMap::new()),
            cancel,
        }
    }

    /// Submits a task, suspending for spacing, concurrency, and backoff
    ///
    /// Transient failures are retried with incremented `attempt` until the
    /// backoff policy declines; the returned outcome then carries the final
    /// attempt count either way.
    pub async fn submit(&self, mut task: FetchTask) -> TaskOutcome {
        loop {
            if self.is_cancelled() {
                return Self::cancelled(task);
            }

            let gate = self.host_gate(&task.host).await;
            let mut state = gate.lock().await;

            if let Some(wait) =
                state.time_until_ready(self.limits.per_host_min_interval, Instant::now())
            {
                tracing::trace!("Host {} not ready, waiting {:?}", task.host, wait);
                if self.sleep_cancellable(wait).await {
                    return Self::cancelled(task);
                }
            }

            // Global ceiling; acquired before the dispatch timestamp so the
            // spacing clock measures actual dispatches, not queue entries.
            let permit = match self.global.acquire().await {
                Ok(permit) => permit,
                Err(_) => return Self::cancelled(task),
            };

            if self.is_cancelled() {
                return Self::cancelled(task);
            }

            state.record_dispatch(Instant::now());
            drop(state);

            let result = perform(&self.client, &task).await;
            drop(permit);

            match result {
                Ok(page) => {
                    tracing::debug!(
                        "Fetched {} ({} bytes, attempt {})",
                        task.url,
                        page.bytes.len(),
                        task.attempt
                    );
                    return TaskOutcome {
                        task,
                        result: Ok(page),
                    };
                }
                Err(failure) => {
                    if self.backoff.should_retry(failure.kind, task.attempt) {
                        let delay = self.backoff.next_delay(task.attempt);
                        task.attempt += 1;
                        tracing::debug!(
                            "Retrying {} after {:?} (attempt {}): {}",
                            task.url,
                            delay,
                            task.attempt,
                            failure.message
                        );
                        if self.sleep_cancellable(delay).await {
                            return Self::cancelled(task);
                        }
                        continue;
                    }

                    tracing::warn!(
                        "Task failed terminally ({}, attempt {}): {}",
                        failure.kind.label(),
                        task.attempt,
                        failure.message
                    );
                    return TaskOutcome {
                        task,
                        result: Err(failure),
                    };
                }
            }
        }
    }

    /// Number of requests dispatched to a host so far
    pub async fn host_request_count(&self, host: &str) -> u64 {
        let hosts = self.hosts.lock().await;
        match hosts.get(host) {
            Some(gate) => gate.lock().await.request_count(),
            None => 0,
        }
    }

    fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    fn cancelled(task: FetchTask) -> TaskOutcome {
        TaskOutcome {
            task,
            result: Err(FetchFailure::new(
                FetchErrorKind::Cancelled,
                "run cancelled",
            )),
        }
    }

    async fn host_gate(&self, host: &str) -> Arc<Mutex<HostState>> {
        let mut hosts = self.hosts.lock().await;
        hosts
            .entry(host.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(HostState::new())))
            .clone()
    }

    /// Sleeps for `duration`; returns true if cancellation fired first
    async fn sleep_cancellable(&self, duration: Duration) -> bool {
        let mut cancel = self.cancel.clone();
        let sleep = tokio::time::sleep(duration);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => return false,
                changed = cancel.changed() => {
                    if changed.is_err() || *cancel.borrow() {
                        return true;
                    }
                }
            }
        }
    }
}
