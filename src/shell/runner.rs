//! Command runner seam.
//!
//! Steps, provisioning backends and the artifact copier issue commands
//! through [`CommandRunner`] so tests can record invocations instead of
//! spawning processes.

use tracing::{debug, warn};

use crate::error::{Result, RolloutError};

use super::command::{execute, CommandOptions, CommandResult};

/// Executes shell commands.
pub trait CommandRunner: Send + Sync {
    fn run(&self, command: &str, options: &CommandOptions) -> Result<CommandResult>;
}

/// Runs commands through the platform shell.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellRunner;

impl CommandRunner for ShellRunner {
    fn run(&self, command: &str, options: &CommandOptions) -> Result<CommandResult> {
        execute(command, options)
    }
}

/// Run a command and turn a non-zero exit into [`RolloutError::CommandFailed`].
pub fn run_checked(
    runner: &dyn CommandRunner,
    command: &str,
    options: &CommandOptions,
) -> Result<CommandResult> {
    debug!(cwd = ?options.cwd, "Running: {}", command);
    let result = runner.run(command, options)?;
    if result.success {
        return Ok(result);
    }

    if let Some(line) = result.last_output_line() {
        warn!("{}: {}", command, line);
    }
    Err(RolloutError::CommandFailed {
        command: command.to_string(),
        code: result.exit_code,
    })
}
