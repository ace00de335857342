//! Shell command execution.

pub mod command;
pub mod runner;

pub use command::{execute, CommandOptions, CommandResult};
pub use runner::{run_checked, CommandRunner, ShellRunner};
