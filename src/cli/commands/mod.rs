//! CLI command implementations.
//!
//! Each command implements the [`Command`] trait, which provides a uniform
//! interface for executing commands and reporting results.
//!
//! # Architecture
//!
//! Commands are dispatched via [`CommandDispatcher`], which routes CLI
//! subcommands to their implementations. This allows:
//! - Single binary with subcommands (`rollout install`, `rollout status`)
//! - Shared configuration and workspace resolution in [`CommandContext`]
//! - Consistent global flag handling

pub mod completions;
pub mod context;
pub mod dispatcher;
pub mod install;
pub mod reset;
pub mod status;

pub use context::CommandContext;
pub use dispatcher::{Command, CommandDispatcher, CommandResult};
