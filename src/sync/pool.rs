//! Bounded-concurrency task pool.
//!
//! [`run_all`] runs a batch of independent tasks on scoped OS threads. A
//! [`tokio::sync::Semaphore`] caps how many workers execute at once; each
//! thread blocks on a permit through a current-thread runtime handle and
//! releases it when the worker returns. Outcomes are funnelled back to the
//! calling thread, which invokes the result callback exactly once per task.
//! Failures are collected, never short-circuited.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::thread;

use tokio::runtime::Builder;
use tokio::sync::Semaphore;

use crate::error::{Result, RolloutError};

/// Default number of tasks allowed to run at once.
pub const DEFAULT_SYNC_LIMIT: usize = 5;

/// A unit of work submitted to the pool.
#[derive(Debug, Clone)]
pub struct SyncTask<T> {
    /// Position of the task in the submitted batch.
    pub index: usize,
    /// Task input.
    pub payload: T,
}

impl<T> SyncTask<T> {
    /// Wrap a batch of payloads, numbering them in submission order.
    pub fn batch(payloads: impl IntoIterator<Item = T>) -> Vec<Self> {
        payloads
            .into_iter()
            .enumerate()
            .map(|(index, payload)| Self { index, payload })
            .collect()
    }
}

/// Outcome reported for a single task.
#[derive(Debug)]
pub struct SyncOutcome {
    /// Index of the task this outcome belongs to.
    pub index: usize,
    /// Failure, if the task did not succeed.
    pub error: Option<RolloutError>,
}

impl SyncOutcome {
    /// Whether the task succeeded.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// A failed task inside an [`AggregateSyncError`].
#[derive(Debug)]
pub struct SyncFailure {
    pub index: usize,
    pub error: RolloutError,
}

/// Every failure from one [`run_all`] invocation.
#[derive(Debug)]
pub struct AggregateSyncError {
    failures: Vec<SyncFailure>,
    total: usize,
}

impl AggregateSyncError {
    /// Build an aggregate from collected failures out of `total` tasks.
    pub fn new(mut failures: Vec<SyncFailure>, total: usize) -> Self {
        failures.sort_by_key(|f| f.index);
        Self { failures, total }
    }

    /// Failed tasks, ordered by index.
    pub fn failures(&self) -> &[SyncFailure] {
        &self.failures
    }

    /// Consume the aggregate, yielding the failures.
    pub fn into_failures(self) -> Vec<SyncFailure> {
        self.failures
    }

    /// Number of failed tasks.
    pub fn len(&self) -> usize {
        self.failures.len()
    }

    /// Whether no failures were recorded.
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    /// Number of tasks in the batch.
    pub fn total(&self) -> usize {
        self.total
    }
}

impl fmt::Display for AggregateSyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} of {} tasks failed", self.failures.len(), self.total)?;
        for failure in &self.failures {
            write!(f, "\n  [{}] {}", failure.index, failure.error)?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateSyncError {}

/// Run every task, at most `limit` at a time, and block until all finish.
///
/// `on_result` is called on the calling thread once per task, in completion
/// order. A panicking worker counts as a failed task. Returns an aggregate
/// of all failures if any task failed.
pub fn run_all<T, W, R>(
    tasks: Vec<SyncTask<T>>,
    worker: W,
    limit: usize,
    mut on_result: R,
) -> std::result::Result<(), AggregateSyncError>
where
    T: Send,
    W: Fn(&SyncTask<T>) -> Result<()> + Sync,
    R: FnMut(&SyncOutcome),
{
    let total = tasks.len();
    let mut failures = Vec::new();
    if tasks.is_empty() {
        return Ok(());
    }

    let runtime = match Builder::new_current_thread().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            let message = e.to_string();
            for task in tasks {
                let outcome = SyncOutcome {
                    index: task.index,
                    error: Some(RolloutError::Other(anyhow::anyhow!(
                        "failed to start task pool: {}",
                        message
                    ))),
                };
                on_result(&outcome);
                if let Some(error) = outcome.error {
                    failures.push(SyncFailure {
                        index: outcome.index,
                        error,
                    });
                }
            }
            return Err(AggregateSyncError::new(failures, total));
        }
    };
    let handle = runtime.handle();
    let semaphore = Semaphore::new(limit.clamp(1, Semaphore::MAX_PERMITS));

    thread::scope(|scope| {
        let (tx, rx) = mpsc::channel::<SyncOutcome>();
        let semaphore = &semaphore;
        let worker = &worker;

        for task in tasks {
            let tx = tx.clone();
            scope.spawn(move || {
                let result = match handle.block_on(semaphore.acquire()) {
                    Ok(_permit) => panic::catch_unwind(AssertUnwindSafe(|| worker(&task)))
                        .unwrap_or_else(|payload| {
                            Err(RolloutError::Other(anyhow::anyhow!(
                                "task {} panicked: {}",
                                task.index,
                                panic_message(&*payload)
                            )))
                        }),
                    Err(e) => Err(RolloutError::Other(anyhow::anyhow!(
                        "task {} could not acquire a worker slot: {}",
                        task.index,
                        e
                    ))),
                };
                // The receiver outlives every sender inside this scope.
                let _ = tx.send(SyncOutcome {
                    index: task.index,
                    error: result.err(),
                });
            });
        }
        drop(tx);

        for outcome in rx {
            on_result(&outcome);
            if let SyncOutcome {
                index,
                error: Some(error),
            } = outcome
            {
                failures.push(SyncFailure { index, error });
            }
        }
    });

    if failures.is_empty() {
        Ok(())
    } else {
        Err(AggregateSyncError::new(failures, total))
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn empty_batch_succeeds_without_callbacks() {
        let mut calls = 0;
        let result = run_all(
            Vec::<SyncTask<()>>::new(),
            |_| Ok(()),
            3,
            |_| calls += 1,
        );
        assert!(result.is_ok());
        assert_eq!(calls, 0);
    }

    #[test]
    fn every_task_reports_once() {
        let tasks = SyncTask::batch(0..20);
        let mut seen = vec![0usize; 20];
        let result = run_all(tasks, |_| Ok(()), 4, |outcome| seen[outcome.index] += 1);
        assert!(result.is_ok());
        assert!(seen.iter().all(|&n| n == 1));
    }

    #[test]
    fn failures_are_collected_not_short_circuited() {
        let executed = AtomicUsize::new(0);
        let tasks = SyncTask::batch(0..10);
        let result = run_all(
            tasks,
            |task| {
                executed.fetch_add(1, Ordering::SeqCst);
                if task.payload % 3 == 0 {
                    Err(RolloutError::Other(anyhow::anyhow!("bad {}", task.payload)))
                } else {
                    Ok(())
                }
            },
            2,
            |_| {},
        );

        assert_eq!(executed.load(Ordering::SeqCst), 10);
        let err = result.unwrap_err();
        assert_eq!(err.total(), 10);
        let indices: Vec<_> = err.failures().iter().map(|f| f.index).collect();
        assert_eq!(indices, vec![0, 3, 6, 9]);
        assert!(err.to_string().starts_with("4 of 10 tasks failed"));
    }

    #[test]
    fn concurrency_never_exceeds_limit() {
        let active = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);
        let tasks = SyncTask::batch(0..12);

        let result = run_all(
            tasks,
            |_| {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(15));
                active.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            },
            3,
            |_| {},
        );

        assert!(result.is_ok());
        let peak = peak.load(Ordering::SeqCst);
        assert!(peak >= 1);
        assert!(peak <= 3, "peak concurrency was {}", peak);
    }

    #[test]
    fn zero_limit_is_treated_as_one() {
        let tasks = SyncTask::batch(0..3);
        let mut count = 0;
        let result = run_all(tasks, |_| Ok(()), 0, |_| count += 1);
        assert!(result.is_ok());
        assert_eq!(count, 3);
    }

    #[test]
    fn panicking_task_becomes_failure() {
        let tasks = SyncTask::batch(vec!["ok", "boom"]);
        let mut outcomes = 0;
        let result = run_all(
            tasks,
            |task| {
                if task.payload == "boom" {
                    panic!("worker exploded");
                }
                Ok(())
            },
            2,
            |_| outcomes += 1,
        );

        assert_eq!(outcomes, 2);
        let err = result.unwrap_err();
        assert_eq!(err.len(), 1);
        assert_eq!(err.failures()[0].index, 1);
        assert!(err.failures()[0].error.to_string().contains("worker exploded"));
    }

    #[test]
    fn panicking_task_releases_its_slot() {
        let tasks = SyncTask::batch(0..4);
        let executed = AtomicUsize::new(0);
        let result = run_all(
            tasks,
            |task| {
                executed.fetch_add(1, Ordering::SeqCst);
                if task.payload == 0 {
                    panic!("first worker exploded");
                }
                Ok(())
            },
            1,
            |_| {},
        );

        assert_eq!(executed.load(Ordering::SeqCst), 4);
        assert_eq!(result.unwrap_err().len(), 1);
    }
}
