use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::types::{ProbeOutcome, ProbeTask};

/// Upper bound applied to any requested concurrency limit.
pub const MAX_CONCURRENCY: usize = 5_000;

/// Outcomes collected by one pool run.
#[derive(Debug, Clone, Default)]
pub struct PoolRun {
    /// In completion order.
    pub outcomes: Vec<ProbeOutcome>,
    /// True if the run stopped admitting tasks because of a cancellation request.
    pub cancelled: bool,
}

/// Progress counters and the outcome accumulator shared by every worker of a run.
///
/// Cloning is cheap; all clones observe the same run.
#[derive(Clone, Debug)]
pub struct SharedProgress {
    pub completed: Arc<AtomicU64>,
    pub open_count: Arc<AtomicU64>,
    pub outcomes: Arc<Mutex<Vec<ProbeOutcome>>>,
}

impl SharedProgress {
    pub fn new() -> Self {
        Self {
            completed: Arc::new(AtomicU64::new(0)),
            open_count: Arc::new(AtomicU64::new(0)),
            outcomes: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn open(&self) -> u64 {
        self.open_count.load(Ordering::Relaxed)
    }

    async fn record(&self, outcome: ProbeOutcome) {
        if outcome.is_open() {
            self.open_count.fetch_add(1, Ordering::Relaxed);
        }
        // Push before bumping `completed` so the counter never runs ahead of the list.
        self.outcomes.lock().await.push(outcome);
        self.completed.fetch_add(1, Ordering::Relaxed);
    }
}

impl Default for SharedProgress {
    fn default() -> Self {
        Self::new()
    }
}

/// Run every task through `executor` with at most `concurrency_limit` in flight.
///
/// - A new task is admitted as soon as a slot frees up.
/// - A panic inside `executor` becomes an `Error` outcome for that task only.
/// - Once `cancel` fires no further tasks are admitted; tasks already running are
///   awaited and their outcomes returned with `cancelled = true`.
pub async fn run<I, F, Fut>(
    tasks: I,
    concurrency_limit: usize,
    executor: F,
    cancel: CancellationToken,
) -> PoolRun
where
    I: IntoIterator<Item = ProbeTask>,
    F: Fn(ProbeTask) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ProbeOutcome> + Send + 'static,
{
    run_shared(tasks, concurrency_limit, executor, cancel, SharedProgress::new()).await
}

/// Variant of [`run`] that records into a caller-owned [`SharedProgress`], so the
/// caller can watch counters while the run is in progress.
pub async fn run_shared<I, F, Fut>(
    tasks: I,
    concurrency_limit: usize,
    executor: F,
    cancel: CancellationToken,
    shared: SharedProgress,
) -> PoolRun
where
    I: IntoIterator<Item = ProbeTask>,
    F: Fn(ProbeTask) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ProbeOutcome> + Send + 'static,
{
    let limit = concurrency_limit.clamp(1, MAX_CONCURRENCY);
    let sem = Arc::new(Semaphore::new(limit));
    let executor = Arc::new(executor);
    let mut set = JoinSet::new();
    let mut cancelled = false;

    for task in tasks {
        // Waiting for a slot must not outlive a cancellation request.
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                cancelled = true;
                break;
            }
            permit = sem.clone().acquire_owned() => match permit {
                Ok(p) => p,
                Err(_) => break,
            },
        };

        let executor = executor.clone();
        let shared = shared.clone();
        set.spawn(async move {
            let _permit = permit; // keep permit until task completes
            let start = Instant::now();
            let outcome = match AssertUnwindSafe(async { (*executor)(task).await })
                .catch_unwind()
                .await
            {
                Ok(outcome) => outcome,
                Err(payload) => {
                    let msg = panic_message(payload.as_ref());
                    warn!(%task, %msg, "probe executor panicked");
                    ProbeOutcome::error(task, start.elapsed(), format!("executor panicked: {msg}"))
                }
            };
            shared.record(outcome).await;
        });

        // Reap finished tasks so the set only holds what is in flight.
        while let Some(res) = set.try_join_next() {
            log_join_error(res);
        }
    }

    if cancelled {
        debug!(in_flight = set.len(), "cancellation requested, draining in-flight probes");
    }

    while let Some(res) = set.join_next().await {
        log_join_error(res);
    }

    let outcomes = std::mem::take(&mut *shared.outcomes.lock().await);
    PoolRun { outcomes, cancelled }
}

fn log_join_error(res: Result<(), tokio::task::JoinError>) {
    if let Err(e) = res {
        // Executor panics are caught inside the task; this only fires if the
        // runtime itself cancelled the task.
        warn!(error = %e, "pool worker did not complete");
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
