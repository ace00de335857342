//! Atomic rollback.
//!
//! When an atomic run fails, steps that completed during that run are
//! compensated in reverse completion order. A failing compensation is
//! logged and recorded; the remaining compensations still run.

use std::panic::{self, AssertUnwindSafe};

use tracing::{debug, error, info};

use crate::error::RolloutError;
use crate::steps::{Step, StepContext};
use crate::sync::pool::panic_message;

use super::events::{EventSink, RunEvent};

/// What rollback did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RollbackReport {
    /// Steps whose compensation succeeded, in the order they ran.
    pub compensated: Vec<String>,
    /// Steps whose compensation failed, with the error.
    pub failures: Vec<(String, String)>,
    /// Completed steps that have no compensating action.
    pub without_compensation: Vec<String>,
}

impl RollbackReport {
    /// Whether every compensation that ran succeeded.
    pub fn succeeded(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Runs compensations for applied steps.
pub struct RollbackCoordinator<'a> {
    events: &'a EventSink,
}

impl<'a> RollbackCoordinator<'a> {
    pub fn new(events: &'a EventSink) -> Self {
        Self { events }
    }

    /// Compensate `applied` (given in completion order) from last to first.
    ///
    /// `context` builds the handler context for each compensation.
    pub fn rollback(
        &self,
        applied: &[&Step],
        context: impl Fn(&Step) -> StepContext,
    ) -> RollbackReport {
        let mut report = RollbackReport::default();
        let order: Vec<&Step> = applied.iter().rev().copied().collect();

        self.events.emit(RunEvent::RollbackStarted {
            steps: order.iter().map(|s| s.name.clone()).collect(),
        });
        info!(steps = order.len(), "Rolling back applied steps");

        for step in order {
            let Some(compensation) = step.compensation() else {
                debug!(step = %step.name, "No compensation defined");
                report.without_compensation.push(step.name.clone());
                continue;
            };

            let ctx = context(step);
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| compensation.run(&ctx)))
                .unwrap_or_else(|payload| {
                    Err(RolloutError::Other(anyhow::anyhow!(
                        "compensation panicked: {}",
                        panic_message(&*payload)
                    )))
                });

            match outcome {
                Ok(()) => {
                    info!(step = %step.name, "Compensated");
                    report.compensated.push(step.name.clone());
                    self.events.emit(RunEvent::RollbackStep {
                        name: step.name.clone(),
                        error: None,
                    });
                }
                Err(e) => {
                    let err = RolloutError::RollbackError {
                        step: step.name.clone(),
                        message: e.to_string(),
                    };
                    error!("{}", err);
                    report.failures.push((step.name.clone(), e.to_string()));
                    self.events.emit(RunEvent::RollbackStep {
                        name: step.name.clone(),
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancellationToken;
    use crate::runner::RunOptions;
    use std::sync::{Arc, Mutex};

    fn ctx(step: &Step) -> StepContext {
        StepContext::new(
            step.name.clone(),
            Arc::new(RunOptions::default()),
            CancellationToken::new(),
            None,
        )
    }

    fn compensated(name: &str, log: &Arc<Mutex<Vec<String>>>) -> Step {
        let log = Arc::clone(log);
        let label = name.to_string();
        Step::new(name, |_: &StepContext| Ok(())).with_compensation(move |_: &StepContext| {
            log.lock().unwrap().push(label.clone());
            Ok(())
        })
    }

    #[test]
    fn compensates_in_reverse_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let a = compensated("a", &log);
        let b = compensated("b", &log);
        let sink = EventSink::disabled();

        let report = RollbackCoordinator::new(&sink).rollback(&[&a, &b], ctx);

        assert_eq!(*log.lock().unwrap(), vec!["b", "a"]);
        assert_eq!(report.compensated, vec!["b", "a"]);
        assert!(report.succeeded());
    }

    #[test]
    fn failing_compensation_does_not_stop_rollback() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let a = compensated("a", &log);
        let b = Step::new("b", |_: &StepContext| Ok(())).with_compensation(|_: &StepContext| {
            Err(RolloutError::Other(anyhow::anyhow!("cannot undo")))
        });
        let c = Step::new("c", |_: &StepContext| Ok(()));
        let sink = EventSink::disabled();

        let report = RollbackCoordinator::new(&sink).rollback(&[&a, &b, &c], ctx);

        assert_eq!(report.without_compensation, vec!["c"]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, "b");
        assert_eq!(report.compensated, vec!["a"]);
        assert!(!report.succeeded());
    }

    #[test]
    fn panicking_compensation_is_recorded() {
        let a = Step::new("a", |_: &StepContext| Ok(()))
            .with_compensation(|_: &StepContext| panic!("undo exploded"));
        let sink = EventSink::disabled();

        let report = RollbackCoordinator::new(&sink).rollback(&[&a], ctx);
        assert!(report.failures[0].1.contains("undo exploded"));
    }
}
