//! Reset command implementation.
//!
//! The `rollout reset` command removes the persisted state so the next run
//! starts from scratch.

use crate::cli::args::ResetArgs;
use crate::error::Result;
use crate::state::StateStore;
use crate::ui::UserInterface;

use super::context::CommandContext;
use super::dispatcher::{Command, CommandResult};

pub struct ResetCommand {
    ctx: CommandContext,
    args: ResetArgs,
}

impl ResetCommand {
    pub fn new(ctx: CommandContext, args: ResetArgs) -> Self {
        Self { ctx, args }
    }
}

impl Command for ResetCommand {
    fn execute(&self, ui: &mut dyn UserInterface) -> Result<CommandResult> {
        let path = self.ctx.state_path(self.args.state_file.as_deref());
        if StateStore::clear(&path)? {
            ui.success(&format!("Removed {}", path.display()));
        } else {
            ui.message(&format!("No state file at {}", path.display()));
        }
        Ok(CommandResult::success())
    }
}
