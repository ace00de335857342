//! Workflow execution orchestration.
//!
//! The [`Scheduler`] executes an [`ExecutionPlan`] against a [`StateStore`]:
//! one step at a time in sequential mode, or level by level on the bounded
//! pool in parallel mode. Every transition is persisted before the next
//! decision is made.

use std::collections::{HashMap, HashSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::cancel::CancellationToken;
use crate::error::{Result, RolloutError};
use crate::state::{RunStatus, StateStore};
use crate::steps::{Step, StepContext};
use crate::sync::pool::{panic_message, run_all, SyncTask, DEFAULT_SYNC_LIMIT};

use super::events::{EventSink, RunEvent};
use super::plan::{ExecutionPlan, StepFilter};
use super::result::{CompletedStep, RunResult, SkipReason};
use super::rollback::{RollbackCoordinator, RollbackReport};

/// How planned steps are dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    /// One step at a time in topological order.
    #[default]
    Sequential,
    /// Each dependency level on the bounded pool.
    Parallel,
}

/// Options for running a workflow.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub mode: ExecutionMode,
    /// Worker cap for parallel levels.
    pub max_workers: usize,
    /// Skip steps already completed in the state file.
    pub resume: bool,
    /// With resume, rerun completed steps and ignore fingerprints.
    pub force: bool,
    /// Keep running independent steps after a required failure.
    pub continue_on_error: bool,
    /// Compensate completed steps if a required step fails.
    pub atomic: bool,
    pub filter: StepFilter,
    /// Deadline for the whole run.
    pub timeout: Option<Duration>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Sequential,
            max_workers: DEFAULT_SYNC_LIMIT,
            resume: false,
            force: false,
            continue_on_error: false,
            atomic: false,
            filter: StepFilter::default(),
            timeout: None,
        }
    }
}

impl RunOptions {
    fn skip_completed(&self) -> bool {
        self.resume && !self.force
    }
}

/// Mutable bookkeeping shared by the workers of a run.
#[derive(Debug, Default)]
struct Progress {
    results: Vec<CompletedStep>,
    /// Failed required steps and everything skipped because of them.
    blocked: HashSet<String>,
    /// Steps completed in this run, in completion order.
    applied: Vec<String>,
    aborted: bool,
    cancelled: bool,
    /// First state write failure; ends the run.
    fatal: Option<RolloutError>,
}

#[derive(Debug, Default)]
struct Tracker(Mutex<Progress>);

impl Tracker {
    fn lock(&self) -> MutexGuard<'_, Progress> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, result: Result<()>) {
        if let Err(e) = result {
            error!("Failed to write state: {}", e);
            let mut progress = self.lock();
            progress.aborted = true;
            progress.fatal.get_or_insert(e);
        }
    }

    fn is_aborted(&self) -> bool {
        self.lock().aborted
    }

    fn into_inner(self) -> Progress {
        self.0.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Executes steps according to their dependencies.
pub struct Scheduler {
    options: Arc<RunOptions>,
    events: EventSink,
    cancel: CancellationToken,
}

impl Scheduler {
    /// Create a scheduler. The run deadline starts counting now.
    pub fn new(options: RunOptions) -> Self {
        let cancel = match options.timeout {
            Some(timeout) => CancellationToken::with_timeout(timeout),
            None => CancellationToken::new(),
        };
        Self {
            options: Arc::new(options),
            events: EventSink::disabled(),
            cancel,
        }
    }

    /// Send progress events to `tx`.
    pub fn with_events(mut self, tx: Sender<RunEvent>) -> Self {
        self.events = EventSink::new(tx);
        self
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Token that cancels the run when tripped.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Build the plan for `steps` after applying the step filter.
    ///
    /// In sequential mode each step gets its own level.
    pub fn plan(&self, steps: &[Step]) -> Result<ExecutionPlan> {
        let excluded = self.options.filter.excluded(steps)?;
        let plan = ExecutionPlan::build_excluding(steps, &excluded)?;
        Ok(match self.options.mode {
            ExecutionMode::Sequential => plan.sequential(),
            ExecutionMode::Parallel => plan,
        })
    }

    /// Plan and execute `steps`, recording progress in `store`.
    ///
    /// Graph and state errors are returned before any step runs. Step
    /// failures are reported through the [`RunResult`].
    pub fn run(&self, steps: &[Step], store: &StateStore) -> Result<RunResult> {
        let plan = self.plan(steps)?;
        let index = index_steps(steps);

        if self.options.skip_completed() {
            store.verify_fingerprints(
                plan.steps()
                    .filter_map(|name| index.get(name))
                    .map(|step| (step.name.as_str(), step.fingerprint())),
            )?;
        }
        store.register(plan.steps())?;

        info!(
            steps = plan.len(),
            levels = plan.levels().len(),
            mode = ?self.options.mode,
            "Starting run"
        );

        match self.options.mode {
            ExecutionMode::Sequential => self.execute_sequential(&plan, steps, store),
            ExecutionMode::Parallel => self.execute_parallel(&plan, steps, store),
        }
    }

    /// Run planned steps one at a time.
    pub fn execute_sequential(
        &self,
        plan: &ExecutionPlan,
        steps: &[Step],
        store: &StateStore,
    ) -> Result<RunResult> {
        let start = Instant::now();
        let index = index_steps(steps);
        let tracker = Tracker::default();

        self.events.emit(RunEvent::PlanReady {
            total: plan.len(),
            levels: plan.levels().len(),
        });

        for name in plan.steps() {
            let step = lookup(&index, name)?;
            if let Err(e) = self.execute_step(step, store, &tracker) {
                debug!("{}", e);
            }
        }

        self.finish(tracker, &index, store, start)
    }

    /// Run each level on the pool, capped at `max_workers`.
    ///
    /// A level starts only after every step of the previous level finished.
    pub fn execute_parallel(
        &self,
        plan: &ExecutionPlan,
        steps: &[Step],
        store: &StateStore,
    ) -> Result<RunResult> {
        let start = Instant::now();
        let index = index_steps(steps);
        let tracker = Tracker::default();

        self.events.emit(RunEvent::PlanReady {
            total: plan.len(),
            levels: plan.levels().len(),
        });

        for (level, names) in plan.levels().iter().enumerate() {
            let level_steps = names
                .iter()
                .map(|name| lookup(&index, name))
                .collect::<Result<Vec<_>>>()?;

            if tracker.is_aborted() {
                for step in level_steps {
                    self.skip(step, SkipReason::Aborted, store, &tracker);
                }
                continue;
            }

            debug!(level, steps = names.len(), "Dispatching level");
            self.events.emit(RunEvent::LevelStarted {
                index: level,
                steps: names.clone(),
            });

            let outcome = run_all(
                SyncTask::batch(level_steps),
                |task| self.execute_step(task.payload, store, &tracker),
                self.options.max_workers,
                |_| {},
            );
            if let Err(failures) = outcome {
                debug!(level, failed = failures.len(), "Level finished with failures");
            }
        }

        self.finish(tracker, &index, store, start)
    }

    /// Decide, run and record one step. Returns the step error, if any.
    fn execute_step(&self, step: &Step, store: &StateStore, tracker: &Tracker) -> Result<()> {
        if self.options.skip_completed() && store.is_completed(&step.name) {
            debug!(step = %step.name, "Already completed; resuming past it");
            self.skip(step, SkipReason::Resumed, store, tracker);
            return Ok(());
        }

        let skip_reason = {
            let progress = tracker.lock();
            if progress.aborted {
                Some(SkipReason::Aborted)
            } else if step.dependencies.iter().any(|d| progress.blocked.contains(d)) {
                Some(SkipReason::DependencyFailed)
            } else if self.cancel.is_cancelled() {
                Some(SkipReason::Cancelled)
            } else {
                None
            }
        };
        if let Some(reason) = skip_reason {
            self.skip(step, reason, store, tracker);
            return Ok(());
        }

        tracker.persist(store.mark_running(&step.name, &step.fingerprint()));
        if tracker.lock().fatal.is_some() {
            return Ok(());
        }

        info!(step = %step.name, "Starting step");
        self.events.emit(RunEvent::StepStarted {
            name: step.name.clone(),
        });

        let ctx = StepContext::new(
            step.name.clone(),
            Arc::clone(&self.options),
            self.cancel.clone(),
            step.timeout,
        );
        let started = Instant::now();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| step.handler().run(&ctx)))
            .unwrap_or_else(|payload| {
                Err(RolloutError::Other(anyhow::anyhow!(
                    "step panicked: {}",
                    panic_message(&*payload)
                )))
            });
        let duration = started.elapsed();

        match outcome {
            Ok(()) => {
                tracker.persist(store.mark_completed(&step.name));
                info!(step = %step.name, duration_ms = duration.as_millis() as u64, "Step completed");
                {
                    let mut progress = tracker.lock();
                    progress
                        .results
                        .push(CompletedStep::completed(step, duration));
                    progress.applied.push(step.name.clone());
                }
                self.events.emit(RunEvent::StepCompleted {
                    name: step.name.clone(),
                    duration,
                });
                Ok(())
            }
            Err(e) => {
                let message = e.to_string();
                tracker.persist(store.mark_failed(&step.name, &message));
                if step.required {
                    error!(step = %step.name, "Required step failed: {}", message);
                } else {
                    warn!(step = %step.name, "Optional step failed: {}", message);
                }
                {
                    let mut progress = tracker.lock();
                    progress
                        .results
                        .push(CompletedStep::failed(step, duration, &message));
                    if matches!(e, RolloutError::Cancelled { .. }) && self.cancel.is_cancelled() {
                        progress.cancelled = true;
                    }
                    if step.required {
                        progress.blocked.insert(step.name.clone());
                        if !self.options.continue_on_error {
                            progress.aborted = true;
                        }
                    }
                }
                self.events.emit(RunEvent::StepFailed {
                    name: step.name.clone(),
                    error: message.clone(),
                    required: step.required,
                    duration,
                });
                Err(RolloutError::StepExecutionError {
                    step: step.name.clone(),
                    message,
                })
            }
        }
    }

    fn skip(&self, step: &Step, reason: SkipReason, store: &StateStore, tracker: &Tracker) {
        if reason != SkipReason::Resumed {
            tracker.persist(store.mark_skipped(&step.name));
            info!(step = %step.name, "Skipped: {}", reason);
        }

        let mut progress = tracker.lock();
        match reason {
            SkipReason::DependencyFailed => {
                progress.blocked.insert(step.name.clone());
            }
            SkipReason::Cancelled => progress.cancelled = true,
            SkipReason::Resumed | SkipReason::Aborted => {}
        }
        progress.results.push(CompletedStep::skipped(step, reason));
        drop(progress);

        self.events.emit(RunEvent::StepSkipped {
            name: step.name.clone(),
            reason,
        });
    }

    fn finish(
        &self,
        tracker: Tracker,
        index: &HashMap<&str, &Step>,
        store: &StateStore,
        start: Instant,
    ) -> Result<RunResult> {
        let progress = tracker.into_inner();

        if let Some(fatal) = progress.fatal {
            let _ = store.finish(RunStatus::Failed);
            return Err(fatal);
        }

        let required_failed = progress.results.iter().any(|s| s.failed && s.required);
        let rollback = if self.options.atomic && required_failed {
            Some(self.rollback(&progress.applied, index, store))
        } else {
            None
        };

        let result = RunResult::from_steps(
            progress.results,
            start.elapsed(),
            progress.aborted,
            progress.cancelled,
            rollback,
        );

        let status = if result.success() {
            RunStatus::Completed
        } else {
            RunStatus::Failed
        };
        store.finish(status)?;

        info!(
            completed = result.completed,
            failed = result.failed,
            skipped = result.skipped,
            "Run finished: {}",
            status
        );
        self.events.emit(RunEvent::RunFinished {
            success: result.success(),
            duration: result.duration,
        });

        Ok(result)
    }

    fn rollback(
        &self,
        applied: &[String],
        index: &HashMap<&str, &Step>,
        store: &StateStore,
    ) -> RollbackReport {
        let applied: Vec<&Step> = applied
            .iter()
            .filter_map(|name| index.get(name.as_str()).copied())
            .collect();

        // Compensations get a fresh token so an expired deadline cannot
        // prevent cleanup.
        let report = RollbackCoordinator::new(&self.events).rollback(&applied, |step| {
            StepContext::new(
                step.name.clone(),
                Arc::clone(&self.options),
                CancellationToken::new(),
                step.timeout,
            )
        });

        for name in &report.compensated {
            if let Err(e) = store.mark_rolled_back(name) {
                error!("Failed to record rollback of '{}': {}", name, e);
            }
        }
        report
    }
}

fn index_steps(steps: &[Step]) -> HashMap<&str, &Step> {
    steps.iter().map(|s| (s.name.as_str(), s)).collect()
}

fn lookup<'a>(index: &HashMap<&str, &'a Step>, name: &str) -> Result<&'a Step> {
    index
        .get(name)
        .copied()
        .ok_or_else(|| RolloutError::ConfigValidationError {
            message: format!("Step '{}' is planned but not defined", name),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::StepStatus;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn ok(name: &str) -> Step {
        Step::new(name, |_: &StepContext| Ok(()))
    }

    fn failing(name: &str) -> Step {
        Step::new(name, |_: &StepContext| {
            Err(RolloutError::Other(anyhow::anyhow!("exit status 1")))
        })
    }

    fn store(temp: &TempDir) -> StateStore {
        StateStore::open(temp.path().join("state.json"), "run", false).unwrap()
    }

    #[test]
    fn sequential_run_completes_all_steps() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        let steps = vec![ok("a"), ok("b").depends_on(["a"])];

        let result = Scheduler::new(RunOptions::default()).run(&steps, &store).unwrap();

        assert!(result.success());
        assert_eq!(result.completed, 2);
        let names: Vec<_> = result.steps.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(store.snapshot().status, RunStatus::Completed);
    }

    #[test]
    fn required_failure_aborts_remaining_steps() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        let steps = vec![failing("a"), ok("b"), ok("c").depends_on(["b"])];

        let result = Scheduler::new(RunOptions::default()).run(&steps, &store).unwrap();

        assert!(!result.success());
        assert!(result.aborted);
        assert_eq!(result.failed, 1);
        assert_eq!(result.skipped, 2);
        assert_eq!(result.step("b").unwrap().skip_reason, Some(SkipReason::Aborted));
        assert_eq!(store.snapshot().step("c").unwrap().status, StepStatus::Skipped);
    }

    #[test]
    fn continue_on_error_runs_independent_steps() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        let steps = vec![
            failing("a"),
            ok("b").depends_on(["a"]),
            ok("c").depends_on(["b"]),
            ok("d"),
        ];
        let options = RunOptions {
            continue_on_error: true,
            ..Default::default()
        };

        let result = Scheduler::new(options).run(&steps, &store).unwrap();

        assert_eq!(result.completed, 1);
        assert_eq!(result.step("d").unwrap().status(), StepStatus::Completed);
        assert_eq!(
            result.step("c").unwrap().skip_reason,
            Some(SkipReason::DependencyFailed)
        );
        assert!(!result.aborted);
    }

    #[test]
    fn optional_failure_does_not_block_dependents() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        let steps = vec![failing("a").optional(), ok("b").depends_on(["a"])];

        let result = Scheduler::new(RunOptions::default()).run(&steps, &store).unwrap();

        assert!(result.success());
        assert_eq!(result.step("b").unwrap().status(), StepStatus::Completed);
    }

    #[test]
    fn panicking_step_is_a_failure() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        let steps = vec![Step::new("a", |_: &StepContext| panic!("handler bug"))];

        let result = Scheduler::new(RunOptions::default()).run(&steps, &store).unwrap();

        let step = result.step("a").unwrap();
        assert!(step.failed);
        assert!(step.error.as_deref().unwrap().contains("handler bug"));
    }

    #[test]
    fn parallel_levels_respect_worker_cap() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let steps: Vec<Step> = (0..6)
            .map(|i| {
                let active = Arc::clone(&active);
                let peak = Arc::clone(&peak);
                Step::new(format!("s{i}"), move |_: &StepContext| {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(20));
                    active.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                })
            })
            .collect();
        let options = RunOptions {
            mode: ExecutionMode::Parallel,
            max_workers: 2,
            ..Default::default()
        };

        let result = Scheduler::new(options).run(&steps, &store).unwrap();

        assert_eq!(result.completed, 6);
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    fn counted(name: &str, calls: &Arc<AtomicUsize>) -> Step {
        let calls = Arc::clone(calls);
        Step::new(name, move |_: &StepContext| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    fn parallel(max_workers: usize) -> RunOptions {
        RunOptions {
            mode: ExecutionMode::Parallel,
            max_workers,
            ..Default::default()
        }
    }

    #[test]
    fn parallel_failure_aborts_later_levels() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        let later = Arc::new(AtomicUsize::new(0));
        let steps = vec![
            failing("a"),
            ok("b"),
            counted("c", &later).depends_on(["b"]),
            counted("d", &later).depends_on(["c"]),
        ];

        let result = Scheduler::new(parallel(4)).run(&steps, &store).unwrap();

        assert!(result.aborted);
        assert_eq!(later.load(Ordering::SeqCst), 0);
        for name in ["c", "d"] {
            assert_eq!(result.step(name).unwrap().skip_reason, Some(SkipReason::Aborted));
            assert_eq!(store.snapshot().step(name).unwrap().status, StepStatus::Skipped);
        }
    }

    #[test]
    fn parallel_continue_on_error_skips_transitive_dependents() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        let blocked = Arc::new(AtomicUsize::new(0));
        let steps = vec![
            failing("a"),
            ok("x"),
            counted("b", &blocked).depends_on(["a"]),
            ok("y").depends_on(["x"]),
            counted("c", &blocked).depends_on(["b"]),
            ok("z").depends_on(["y"]),
        ];
        let options = RunOptions {
            continue_on_error: true,
            ..parallel(4)
        };

        let result = Scheduler::new(options).run(&steps, &store).unwrap();

        assert!(!result.aborted);
        assert_eq!(blocked.load(Ordering::SeqCst), 0);
        for name in ["b", "c"] {
            assert_eq!(
                result.step(name).unwrap().skip_reason,
                Some(SkipReason::DependencyFailed)
            );
        }
        for name in ["x", "y", "z"] {
            assert_eq!(result.step(name).unwrap().status(), StepStatus::Completed);
        }
    }

    #[test]
    fn parallel_level_finishes_before_next_starts() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        let spans = Arc::new(Mutex::new(HashMap::<String, (Instant, Instant)>::new()));
        let timed = |name: &str| {
            let spans = Arc::clone(&spans);
            let key = name.to_string();
            Step::new(name, move |_: &StepContext| {
                let begin = Instant::now();
                std::thread::sleep(Duration::from_millis(25));
                spans.lock().unwrap().insert(key.clone(), (begin, Instant::now()));
                Ok(())
            })
        };
        let steps = vec![
            timed("a1"),
            timed("a2"),
            timed("b1").depends_on(["a1"]),
            timed("b2").depends_on(["a2"]),
            timed("c").depends_on(["b1", "b2"]),
        ];

        let scheduler = Scheduler::new(parallel(4));
        let plan = scheduler.plan(&steps).unwrap();
        let result = scheduler.run(&steps, &store).unwrap();
        assert!(result.success());

        let spans = spans.lock().unwrap();
        for pair in plan.levels().windows(2) {
            let last_end = pair[0].iter().map(|n| spans[n].1).max().unwrap();
            let first_start = pair[1].iter().map(|n| spans[n].0).min().unwrap();
            assert!(last_end <= first_start, "level {:?} overlapped {:?}", pair[0], pair[1]);
        }
    }

    #[test]
    fn step_timeout_fails_step_without_cancelling_run() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        let steps = vec![
            Step::new("deploy", |_: &StepContext| {
                Err(RolloutError::CommandTimedOut {
                    command: "helm upgrade".into(),
                    timeout_secs: 30,
                })
            }),
            Step::new("migrate", |_: &StepContext| {
                Err(RolloutError::Cancelled {
                    reason: "handler gave up".into(),
                })
            }),
        ];
        let options = RunOptions {
            continue_on_error: true,
            ..Default::default()
        };

        let result = Scheduler::new(options).run(&steps, &store).unwrap();

        assert_eq!(result.failed, 2);
        assert!(!result.cancelled);
        assert!(result.step("deploy").unwrap().error.as_deref().unwrap().contains("timed out"));
    }

    #[cfg(unix)]
    #[test]
    fn killed_command_is_not_a_run_cancellation() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        let workspace = temp.path().to_path_buf();
        let steps = vec![Step::new("slow", move |ctx: &StepContext| {
            crate::shell::execute("sleep 5", &ctx.command_options(&workspace))?;
            Ok(())
        })
        .with_timeout(Duration::from_millis(100))];

        let result = Scheduler::new(RunOptions::default()).run(&steps, &store).unwrap();

        assert_eq!(result.failed, 1);
        assert!(!result.cancelled);
    }

    #[test]
    fn expired_deadline_skips_steps_as_cancelled() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        let options = RunOptions {
            timeout: Some(Duration::ZERO),
            ..Default::default()
        };

        let result = Scheduler::new(options).run(&[ok("a")], &store).unwrap();

        assert!(result.cancelled);
        assert!(!result.success());
        assert_eq!(result.step("a").unwrap().skip_reason, Some(SkipReason::Cancelled));
    }

    #[test]
    fn events_describe_the_run() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        let (tx, rx) = std::sync::mpsc::channel();

        let scheduler = Scheduler::new(RunOptions::default()).with_events(tx);
        scheduler.run(&[ok("a")], &store).unwrap();
        drop(scheduler);

        let events: Vec<_> = rx.iter().collect();
        assert!(matches!(events[0], RunEvent::PlanReady { total: 1, .. }));
        assert!(events.contains(&RunEvent::StepStarted { name: "a".into() }));
        assert!(matches!(
            events.last(),
            Some(RunEvent::RunFinished { success: true, .. })
        ));
    }
}
