//! `install` and `deploy` command implementation.
//!
//! The scheduler runs on a scoped worker thread while this thread drains
//! its events into the [`Reporter`], so all terminal output happens here.

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, info};

use crate::cli::args::RunArgs;
use crate::config::validate;
use crate::error::{Result, RolloutError};
use crate::installer::{Installer, Workflow};
use crate::report::{Reporter, RunReport};
use crate::runner::{ExecutionMode, ExecutionPlan, RunOptions, RunResult, Scheduler, StepFilter};
use crate::shell::{CommandRunner, ShellRunner};
use crate::state::{RunId, StateStore};
use crate::ui::UserInterface;

use super::context::CommandContext;
use super::dispatcher::{Command, CommandResult};

/// Runs a workflow.
pub struct RunCommand {
    ctx: CommandContext,
    workflow: Workflow,
    args: RunArgs,
    runner: Arc<dyn CommandRunner>,
}

impl RunCommand {
    pub fn new(ctx: CommandContext, workflow: Workflow, args: RunArgs) -> Self {
        Self {
            ctx,
            workflow,
            args,
            runner: Arc::new(ShellRunner),
        }
    }

    /// Issue commands through `runner` instead of the shell.
    pub fn with_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = runner;
        self
    }

    /// Merge file settings with flags. Flags win.
    pub fn build_options(&self) -> RunOptions {
        let settings = &self.ctx.config.settings;
        RunOptions {
            mode: if self.args.parallel || settings.parallel {
                ExecutionMode::Parallel
            } else {
                ExecutionMode::Sequential
            },
            max_workers: self.args.max_workers.unwrap_or(settings.max_workers).max(1),
            resume: self.args.resume,
            force: self.args.force,
            continue_on_error: self.args.continue_on_error || settings.continue_on_error,
            atomic: self.workflow.atomic(),
            filter: StepFilter {
                only: self.args.steps_only.clone(),
                skip: self.args.skip_steps.clone(),
            },
            timeout: self
                .args
                .timeout
                .or(settings.timeout_secs)
                .map(Duration::from_secs),
        }
    }

    fn show_plan(&self, plan: &ExecutionPlan, ui: &mut dyn UserInterface) {
        ui.message(&format!(
            "Plan: {} steps in {} levels",
            plan.len(),
            plan.levels().len()
        ));
        for (index, level) in plan.levels().iter().enumerate() {
            ui.message(&format!("  {}. {}", index + 1, level.join(", ")));
        }
        if !plan.excluded().is_empty() {
            ui.skipped(&format!("Excluded: {}", plan.excluded().join(", ")));
        }
    }
}

impl Command for RunCommand {
    fn execute(&self, ui: &mut dyn UserInterface) -> Result<CommandResult> {
        validate(&self.ctx.config)?;

        let options = self.build_options();
        let spinners = ui.is_interactive()
            && !self.args.non_interactive
            && options.mode == ExecutionMode::Sequential;
        debug!(?options, "Run options");

        let installer = Installer::new(
            self.ctx.config.clone(),
            self.ctx.workspace.clone(),
            Arc::clone(&self.runner),
        );
        let steps = installer.steps(self.workflow)?;

        ui.show_header(&format!("{} · {} workflow", self.ctx.name(), self.workflow));

        if self.args.dry_run {
            let plan = Scheduler::new(options).plan(&steps)?;
            self.show_plan(&plan, ui);
            ui.show_hint("Dry run: nothing was executed and no state was written");
            return Ok(CommandResult::success());
        }

        let run_id = RunId::new(&self.ctx.workspace, self.workflow.name())?;
        let state_path = self.ctx.state_path(self.args.state_file.as_deref());
        let store = StateStore::open(&state_path, run_id.as_str(), self.args.resume)?;
        info!(run_id = %run_id, state = %state_path.display(), "Run starting");

        let (tx, rx) = mpsc::channel();
        let scheduler = Scheduler::new(options).with_events(tx);
        let mut reporter = Reporter::new(ui, spinners).with_descriptions(&steps);

        let outcome: Result<RunResult> = thread::scope(|s| {
            let steps = &steps;
            let store = &store;
            let worker = s.spawn(move || scheduler.run(steps, store));
            reporter.drain(rx);
            worker.join().unwrap_or_else(|_| {
                Err(RolloutError::Other(anyhow::anyhow!("scheduler thread panicked")))
            })
        });
        let result = outcome?;

        reporter.summary(self.workflow.name(), &result);
        drop(reporter);

        if let Some(path) = &self.args.report_file {
            let path = self.ctx.cwd.join(path);
            RunReport::new(self.workflow.name(), run_id.as_str(), &result).write(&path)?;
            ui.message(&format!("Report written to {}", path.display()));
        }

        if result.success() {
            Ok(CommandResult::success())
        } else {
            Ok(CommandResult::failure(1))
        }
    }
}
