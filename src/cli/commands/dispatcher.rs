//! Command dispatching.
//!
//! This module provides the core command infrastructure:
//! - [`Command`] trait for implementing commands
//! - [`CommandResult`] for uniform result reporting
//! - [`CommandDispatcher`] for routing CLI subcommands

use std::path::{Path, PathBuf};

use crate::cli::args::{Cli, Commands, RunArgs};
use crate::error::Result;
use crate::installer::Workflow;
use crate::ui::UserInterface;

use super::completions::CompletionsCommand;
use super::context::CommandContext;
use super::install::RunCommand;
use super::reset::ResetCommand;
use super::status::StatusCommand;

/// Trait for command implementations.
///
/// Each CLI subcommand implements this trait to provide its execution logic.
pub trait Command {
    /// Execute the command.
    ///
    /// # Arguments
    ///
    /// * `ui` - User interface for displaying output
    ///
    /// # Returns
    ///
    /// A [`CommandResult`] indicating success/failure and exit code.
    fn execute(&self, ui: &mut dyn UserInterface) -> Result<CommandResult>;
}

/// Result of command execution.
#[derive(Debug)]
pub struct CommandResult {
    /// Whether the command succeeded.
    pub success: bool,

    /// Exit code to use (0 for success, non-zero for failure).
    pub exit_code: i32,
}

impl CommandResult {
    /// Create a successful result.
    pub fn success() -> Self {
        Self {
            success: true,
            exit_code: 0,
        }
    }

    /// Create a failure result.
    pub fn failure(exit_code: i32) -> Self {
        Self {
            success: false,
            exit_code,
        }
    }
}

/// Dispatches CLI commands to their implementations.
pub struct CommandDispatcher {
    cwd: PathBuf,
}

impl CommandDispatcher {
    /// Create a dispatcher resolving relative paths against `cwd`.
    pub fn new(cwd: PathBuf) -> Self {
        Self { cwd }
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// Dispatch and execute a command.
    ///
    /// Loads configuration for every command except `completions`.
    pub fn dispatch(&self, cli: &Cli, ui: &mut dyn UserInterface) -> Result<CommandResult> {
        if let Some(Commands::Completions(args)) = &cli.command {
            return CompletionsCommand::new(args.clone()).execute(ui);
        }

        let ctx = CommandContext::load(cli.config.as_deref(), cli.workspace.as_deref(), &self.cwd)?;
        match &cli.command {
            Some(Commands::Install(args)) => {
                RunCommand::new(ctx, Workflow::Install, args.clone()).execute(ui)
            }
            Some(Commands::Deploy(args)) => {
                RunCommand::new(ctx, Workflow::Deploy, args.clone()).execute(ui)
            }
            Some(Commands::Status(args)) => StatusCommand::new(ctx, args.clone()).execute(ui),
            Some(Commands::Reset(args)) => ResetCommand::new(ctx, args.clone()).execute(ui),
            Some(Commands::Completions(_)) => Ok(CommandResult::success()),
            // Default to install with default args
            None => RunCommand::new(ctx, Workflow::Install, RunArgs::default()).execute(ui),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui::MockUI;
    use clap::Parser;
    use tempfile::TempDir;

    #[test]
    fn command_result_success() {
        let result = CommandResult::success();
        assert!(result.success);
        assert_eq!(result.exit_code, 0);
    }

    #[test]
    fn command_result_failure() {
        let result = CommandResult::failure(1);
        assert!(!result.success);
        assert_eq!(result.exit_code, 1);
    }

    #[test]
    fn missing_explicit_config_is_an_error() {
        let temp = TempDir::new().unwrap();
        let cli = Cli::parse_from(["rollout", "--config", "nope.yml", "status"]);
        let mut ui = MockUI::new();

        let err = CommandDispatcher::new(temp.path().to_path_buf())
            .dispatch(&cli, &mut ui)
            .unwrap_err();
        assert!(err.to_string().contains("nope.yml"));
    }

    #[test]
    fn dispatches_status() {
        let temp = TempDir::new().unwrap();
        let cli = Cli::parse_from(["rollout", "status"]);
        let mut ui = MockUI::new();

        let result = CommandDispatcher::new(temp.path().to_path_buf())
            .dispatch(&cli, &mut ui)
            .unwrap();
        assert!(result.success);
        assert!(ui.has_message("No state recorded"));
    }
}
