//! Human-readable progress and summary.

use std::collections::HashMap;
use std::sync::mpsc::Receiver;

use crate::runner::{RunEvent, RunResult, SkipReason};
use crate::steps::Step;
use crate::ui::{format_duration, OutputMode, SpinnerHandle, UserInterface};

/// Renders run events through a [`UserInterface`].
///
/// With spinners enabled, each step gets a spinner from start to finish.
/// Spinners assume one step at a time, so parallel runs print plain lines.
pub struct Reporter<'a> {
    ui: &'a mut dyn UserInterface,
    spinners: bool,
    descriptions: HashMap<String, String>,
    active: Option<(String, Box<dyn SpinnerHandle>)>,
}

impl<'a> Reporter<'a> {
    pub fn new(ui: &'a mut dyn UserInterface, spinners: bool) -> Self {
        Self {
            ui,
            spinners,
            descriptions: HashMap::new(),
            active: None,
        }
    }

    /// Show step descriptions next to step names.
    pub fn with_descriptions(mut self, steps: &[Step]) -> Self {
        self.descriptions = steps
            .iter()
            .filter(|s| s.description != s.name)
            .map(|s| (s.name.clone(), s.description.clone()))
            .collect();
        self
    }

    /// Render events until every sender is dropped.
    pub fn drain(&mut self, events: Receiver<RunEvent>) {
        for event in events {
            self.handle(&event);
        }
    }

    pub fn handle(&mut self, event: &RunEvent) {
        let verbose = self.ui.output_mode() == OutputMode::Verbose;
        match event {
            RunEvent::PlanReady { total, levels } => {
                if verbose {
                    self.ui
                        .message(&format!("Planned {} steps in {} levels", total, levels));
                }
            }
            RunEvent::LevelStarted { index, steps } => {
                if verbose {
                    self.ui
                        .message(&format!("Level {}: {}", index + 1, steps.join(", ")));
                }
            }
            RunEvent::StepStarted { name } => {
                let label = self.label(name);
                if self.spinners {
                    let spinner = self.ui.start_spinner(&label);
                    self.active = Some((name.clone(), spinner));
                } else if verbose {
                    self.ui.message(&format!("→ {}", label));
                }
            }
            RunEvent::StepCompleted { name, duration } => {
                let line = format!("{} ({})", self.label(name), format_duration(*duration));
                match self.take_spinner(name) {
                    Some(mut spinner) => spinner.finish_success(&line),
                    None => self.ui.success(&line),
                }
            }
            RunEvent::StepFailed {
                name,
                error,
                required,
                ..
            } => {
                let line = if *required {
                    format!("{}: {}", name, error)
                } else {
                    format!("{} (optional): {}", name, error)
                };
                match self.take_spinner(name) {
                    Some(mut spinner) => spinner.finish_error(&line),
                    None if *required => self.ui.error(&line),
                    None => self.ui.warning(&line),
                }
            }
            RunEvent::StepSkipped { name, reason } => {
                let line = format!("{} ({})", name, reason);
                match self.take_spinner(name) {
                    Some(mut spinner) => spinner.finish_skipped(&line),
                    None if *reason == SkipReason::Resumed && !verbose => {}
                    None => self.ui.skipped(&line),
                }
            }
            RunEvent::RollbackStarted { steps } => {
                if !steps.is_empty() {
                    self.ui
                        .warning(&format!("Rolling back: {}", steps.join(", ")));
                }
            }
            RunEvent::RollbackStep { name, error } => match error {
                None => self.ui.message(&format!("  Rolled back {}", name)),
                Some(e) => self.ui.error(&format!("Rollback of {} failed: {}", name, e)),
            },
            RunEvent::RunFinished { .. } => {}
        }
    }

    /// Print the final summary of `result`.
    pub fn summary(&mut self, workflow: &str, result: &RunResult) {
        let counts = format!(
            "{}/{} completed, {} skipped, {} failed ({:.0}%) in {}",
            result.completed,
            result.total,
            result.skipped,
            result.failed,
            result.success_rate,
            format_duration(result.duration)
        );
        if result.success() {
            self.ui.success(&format!("{} finished: {}", workflow, counts));
        } else {
            self.ui.error(&format!("{} failed: {}", workflow, counts));
        }

        if let Some(step) = result.first_required_failure() {
            self.ui.error(&format!(
                "Failed step: {}: {}",
                step.name,
                step.error.as_deref().unwrap_or("unknown error")
            ));
        }
        if result.cancelled {
            self.ui.error("Run cancelled before all steps finished");
        }

        if let Some(rollback) = &result.rollback {
            if rollback.succeeded() {
                self.ui.warning(&format!(
                    "Rolled back {} step(s): {}",
                    rollback.compensated.len(),
                    rollback.compensated.join(", ")
                ));
            } else {
                for (step, error) in &rollback.failures {
                    self.ui
                        .error(&format!("Rollback incomplete: {}: {}", step, error));
                }
            }
            if !rollback.without_compensation.is_empty() {
                self.ui.warning(&format!(
                    "No rollback defined for: {}",
                    rollback.without_compensation.join(", ")
                ));
            }
        }

        if !result.success() {
            self.ui
                .show_hint("Fix the failure and rerun with --resume to continue from the last completed step");
        }
    }

    fn label(&self, name: &str) -> String {
        match self.descriptions.get(name) {
            Some(description) => format!("{} - {}", name, description),
            None => name.to_string(),
        }
    }

    fn take_spinner(&mut self, name: &str) -> Option<Box<dyn SpinnerHandle>> {
        match &self.active {
            Some((active, _)) if active == name => self.active.take().map(|(_, s)| s),
            _ => None,
        }
    }
}
