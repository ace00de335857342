//! JSON run report.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::Result;
use crate::runner::{CompletedStep, RollbackReport, RunResult, SkipReason};
use crate::state::StepStatus;

/// Summary of a run, written once at the end.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub workflow: String,
    pub run_id: String,
    pub success: bool,
    pub total: usize,
    pub completed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub success_rate: f64,
    pub duration_ms: u64,
    pub aborted: bool,
    pub cancelled: bool,
    pub steps: Vec<StepReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rollback: Option<RollbackSummary>,
    pub generated_at: DateTime<Utc>,
}

/// Per-step detail.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepReport {
    pub name: String,
    pub description: String,
    pub required: bool,
    pub status: StepStatus,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<SkipReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackSummary {
    pub compensated: Vec<String>,
    pub failures: Vec<RollbackFailure>,
    pub without_compensation: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RollbackFailure {
    pub step: String,
    pub error: String,
}

impl From<&CompletedStep> for StepReport {
    fn from(step: &CompletedStep) -> Self {
        Self {
            name: step.name.clone(),
            description: step.description.clone(),
            required: step.required,
            status: step.status(),
            duration_ms: step.duration.as_millis() as u64,
            skip_reason: step.skip_reason,
            error: step.error.clone(),
        }
    }
}

impl From<&RollbackReport> for RollbackSummary {
    fn from(report: &RollbackReport) -> Self {
        Self {
            compensated: report.compensated.clone(),
            failures: report
                .failures
                .iter()
                .map(|(step, error)| RollbackFailure {
                    step: step.clone(),
                    error: error.clone(),
                })
                .collect(),
            without_compensation: report.without_compensation.clone(),
        }
    }
}

impl RunReport {
    pub fn new(workflow: &str, run_id: &str, result: &RunResult) -> Self {
        Self {
            workflow: workflow.to_string(),
            run_id: run_id.to_string(),
            success: result.success(),
            total: result.total,
            completed: result.completed,
            skipped: result.skipped,
            failed: result.failed,
            success_rate: result.success_rate,
            duration_ms: result.duration.as_millis() as u64,
            aborted: result.aborted,
            cancelled: result.cancelled,
            steps: result.steps.iter().map(StepReport::from).collect(),
            rollback: result.rollback.as_ref().map(RollbackSummary::from),
            generated_at: Utc::now(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| anyhow::Error::from(e).into())
    }

    /// Write the report to `path`, creating parent directories.
    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_json()?)?;
        Ok(())
    }
}
