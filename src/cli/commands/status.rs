//! Status command implementation.
//!
//! The `rollout status` command shows the persisted state of the last run.

use crate::cli::args::StatusArgs;
use crate::error::{Result, RolloutError};
use crate::state::{InstallState, RunStatus, StepStatus};
use crate::ui::{format_duration, format_relative_time, UserInterface};

use super::context::CommandContext;
use super::dispatcher::{Command, CommandResult};

/// The status command implementation.
pub struct StatusCommand {
    ctx: CommandContext,
    args: StatusArgs,
}

impl StatusCommand {
    pub fn new(ctx: CommandContext, args: StatusArgs) -> Self {
        Self { ctx, args }
    }
}

impl Command for StatusCommand {
    fn execute(&self, ui: &mut dyn UserInterface) -> Result<CommandResult> {
        let path = self.ctx.state_path(self.args.state_file.as_deref());
        let Some(state) = InstallState::load_if_exists(&path)? else {
            ui.message(&format!("No state recorded at {}", path.display()));
            return Ok(CommandResult::success());
        };

        if self.args.json {
            let json = serde_json::to_string_pretty(&state)
                .map_err(|e| RolloutError::Other(e.into()))?;
            ui.message(&json);
            return Ok(CommandResult::success());
        }

        ui.show_header(&format!("{} - Status", self.ctx.name()));
        ui.message(&format!(
            "Run {} · {} · started {}{}",
            state.run_id,
            state.status,
            format_relative_time(state.start_time),
            if state.resume { " (resumed)" } else { "" }
        ));

        for step in &state.steps {
            let mut line = step.name.clone();
            if let Some(duration) = step.duration().and_then(|d| d.to_std().ok()) {
                line.push_str(&format!(" ({})", format_duration(duration)));
            }
            if step.retries > 0 {
                line.push_str(&format!(" [retries: {}]", step.retries));
            }
            match step.status {
                StepStatus::Completed => ui.success(&line),
                StepStatus::Failed => ui.error(&format!(
                    "{}: {}",
                    line,
                    step.error.as_deref().unwrap_or("failed")
                )),
                StepStatus::Skipped => ui.skipped(&line),
                StepStatus::Pending | StepStatus::Running => {
                    ui.message(&format!("  [{}] {}", step.status, line))
                }
            }
        }

        if state.status != RunStatus::Completed {
            ui.show_hint("Run `rollout install --resume` to continue from the last completed step");
        }
        Ok(CommandResult::success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{StateStore, DEFAULT_STATE_FILE};
    use crate::ui::MockUI;
    use tempfile::TempDir;

    fn context(temp: &TempDir) -> CommandContext {
        CommandContext::load(None, None, temp.path()).unwrap()
    }

    fn record(temp: &TempDir) {
        let store = StateStore::open(temp.path().join(DEFAULT_STATE_FILE), "abc123", false).unwrap();
        store.register(["setup", "deploy", "e2e-test", "post-validate"]).unwrap();
        store.mark_running("setup", "fp1").unwrap();
        store.mark_completed("setup").unwrap();
        store.mark_running("deploy", "fp2").unwrap();
        store.mark_failed("deploy", "helm exited 1").unwrap();
        store.mark_skipped("e2e-test").unwrap();
        store.finish(RunStatus::Failed).unwrap();
    }

    #[test]
    fn status_without_state() {
        let temp = TempDir::new().unwrap();
        let mut ui = MockUI::new();
        let result = StatusCommand::new(context(&temp), StatusArgs::default())
            .execute(&mut ui)
            .unwrap();

        assert!(result.success);
        assert!(ui.has_message("No state recorded"));
    }

    #[test]
    fn status_lists_steps_by_outcome() {
        let temp = TempDir::new().unwrap();
        record(&temp);
        let mut ui = MockUI::new();
        StatusCommand::new(context(&temp), StatusArgs::default())
            .execute(&mut ui)
            .unwrap();

        assert!(ui.has_message("Run abc123 · failed"));
        assert!(ui.has_success("setup"));
        assert!(ui.has_error("deploy"));
        assert!(ui.has_error("helm exited 1"));
        assert!(ui.has_skipped("e2e-test"));
        assert!(ui.has_message("[pending] post-validate"));
        assert!(ui.has_hint("--resume"));
    }

    #[test]
    fn status_json_uses_camel_case() {
        let temp = TempDir::new().unwrap();
        record(&temp);
        let args = StatusArgs {
            json: true,
            ..Default::default()
        };
        let mut ui = MockUI::new();
        StatusCommand::new(context(&temp), args).execute(&mut ui).unwrap();

        let value: serde_json::Value = serde_json::from_str(&ui.messages()[0]).unwrap();
        assert_eq!(value["runId"], "abc123");
        assert_eq!(value["steps"][1]["status"], "failed");
        assert!(value.get("startTime").is_some());
    }
}
