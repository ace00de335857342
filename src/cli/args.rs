//! CLI argument definitions.
//!
//! This module defines all CLI arguments using clap's derive macros.
//! The main entry point is the [`Cli`] struct.

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// Rollout - resumable, dependency-aware installation orchestrator.
#[derive(Debug, Parser)]
#[command(name = "rollout")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to config file (defaults to <workspace>/rollout.yml, then ./rollout.yml)
    #[arg(short, long, global = true, env = "ROLLOUT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Workspace directory (overrides the configured workspace)
    #[arg(short, long, global = true, env = "ROLLOUT_WORKSPACE")]
    pub workspace: Option<PathBuf>,

    /// Show verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Minimal output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the installation workflow (default if no command specified)
    Install(RunArgs),

    /// Run the atomic deployment workflow
    Deploy(RunArgs),

    /// Show the persisted state of the last run
    Status(StatusArgs),

    /// Remove the persisted state
    Reset(ResetArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

/// Arguments for `install` and `deploy`.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct RunArgs {
    /// Skip steps completed by a previous run
    #[arg(long)]
    pub resume: bool,

    /// With --resume, rerun completed steps and ignore configuration changes
    #[arg(long)]
    pub force: bool,

    /// Skip specified steps (comma-separated)
    #[arg(long, value_delimiter = ',', value_name = "STEPS")]
    pub skip_steps: Vec<String>,

    /// Run only specified steps (comma-separated)
    #[arg(long, value_delimiter = ',', value_name = "STEPS")]
    pub steps_only: Vec<String>,

    /// Run independent steps concurrently
    #[arg(long)]
    pub parallel: bool,

    /// Maximum concurrent steps with --parallel
    #[arg(long, env = "ROLLOUT_MAX_WORKERS", value_name = "N")]
    pub max_workers: Option<usize>,

    /// Keep running independent steps after a required step fails
    #[arg(long)]
    pub continue_on_error: bool,

    /// Print the execution plan without running anything
    #[arg(long)]
    pub dry_run: bool,

    /// State file location
    #[arg(long, env = "ROLLOUT_STATE_FILE", value_name = "PATH")]
    pub state_file: Option<PathBuf>,

    /// Write a JSON report of the run
    #[arg(long, value_name = "PATH")]
    pub report_file: Option<PathBuf>,

    /// Deadline for the whole run, in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Never draw spinners
    #[arg(long)]
    pub non_interactive: bool,
}

/// Arguments for the `status` command.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct StatusArgs {
    /// Output the raw state as JSON
    #[arg(long)]
    pub json: bool,

    /// State file location
    #[arg(long, env = "ROLLOUT_STATE_FILE", value_name = "PATH")]
    pub state_file: Option<PathBuf>,
}

/// Arguments for the `reset` command.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct ResetArgs {
    /// State file location
    #[arg(long, env = "ROLLOUT_STATE_FILE", value_name = "PATH")]
    pub state_file: Option<PathBuf>,
}

/// Arguments for the `completions` command.
#[derive(Debug, Clone, clap::Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}
