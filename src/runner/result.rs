//! Run results.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::state::StepStatus;
use crate::steps::Step;

use super::rollback::RollbackReport;

/// Why a step did not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    /// Completed by a previous run and resumed.
    Resumed,
    /// A required dependency failed or was itself skipped.
    DependencyFailed,
    /// An earlier required failure aborted the run.
    Aborted,
    /// The run was cancelled or hit its deadline.
    Cancelled,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Resumed => "already completed",
            Self::DependencyFailed => "dependency failed",
            Self::Aborted => "run aborted",
            Self::Cancelled => "run cancelled",
        })
    }
}

/// Outcome of one step.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedStep {
    pub name: String,
    pub description: String,
    pub required: bool,
    pub duration: Duration,
    pub failed: bool,
    pub skipped: bool,
    pub skip_reason: Option<SkipReason>,
    pub error: Option<String>,
}

impl CompletedStep {
    pub fn completed(step: &Step, duration: Duration) -> Self {
        Self::base(step, duration)
    }

    pub fn failed(step: &Step, duration: Duration, error: impl Into<String>) -> Self {
        Self {
            failed: true,
            error: Some(error.into()),
            ..Self::base(step, duration)
        }
    }

    pub fn skipped(step: &Step, reason: SkipReason) -> Self {
        Self {
            skipped: true,
            skip_reason: Some(reason),
            ..Self::base(step, Duration::ZERO)
        }
    }

    fn base(step: &Step, duration: Duration) -> Self {
        Self {
            name: step.name.clone(),
            description: step.description.clone(),
            required: step.required,
            duration,
            failed: false,
            skipped: false,
            skip_reason: None,
            error: None,
        }
    }

    /// Whether the step was satisfied by a previous run.
    pub fn resumed(&self) -> bool {
        self.skip_reason == Some(SkipReason::Resumed)
    }

    /// Status as recorded in the state file.
    ///
    /// A resumed step stays completed.
    pub fn status(&self) -> StepStatus {
        if self.failed {
            StepStatus::Failed
        } else if self.skipped && !self.resumed() {
            StepStatus::Skipped
        } else {
            StepStatus::Completed
        }
    }
}

/// Result of a whole run.
#[derive(Debug, Clone)]
pub struct RunResult {
    /// Planned steps.
    pub total: usize,
    /// Completed steps, including ones resumed from a previous run.
    pub completed: usize,
    pub skipped: usize,
    pub failed: usize,
    /// `completed / total` as a percentage.
    pub success_rate: f64,
    /// Step outcomes in the order they finished.
    pub steps: Vec<CompletedStep>,
    pub duration: Duration,
    /// A required failure stopped the run.
    pub aborted: bool,
    /// The run was cancelled or exceeded its deadline.
    pub cancelled: bool,
    /// Present when atomic rollback ran.
    pub rollback: Option<RollbackReport>,
}

impl RunResult {
    pub fn from_steps(
        steps: Vec<CompletedStep>,
        duration: Duration,
        aborted: bool,
        cancelled: bool,
        rollback: Option<RollbackReport>,
    ) -> Self {
        let count = |status| steps.iter().filter(|s| s.status() == status).count();
        let total = steps.len();
        let completed = count(StepStatus::Completed);
        let success_rate = if total == 0 {
            100.0
        } else {
            completed as f64 / total as f64 * 100.0
        };

        Self {
            total,
            completed,
            skipped: count(StepStatus::Skipped),
            failed: count(StepStatus::Failed),
            success_rate,
            steps,
            duration,
            aborted,
            cancelled,
            rollback,
        }
    }

    /// No required step failed and the run was not cancelled.
    pub fn success(&self) -> bool {
        !self.cancelled && !self.steps.iter().any(|s| s.failed && s.required)
    }

    /// Outcome of a step by name.
    pub fn step(&self, name: &str) -> Option<&CompletedStep> {
        self.steps.iter().find(|s| s.name == name)
    }

    /// First required step that failed.
    pub fn first_required_failure(&self) -> Option<&CompletedStep> {
        self.steps.iter().find(|s| s.failed && s.required)
    }
}
