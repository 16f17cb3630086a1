use anyhow::Result;

use super::{Command, CommandDescriptor};
use crate::processor::CommandContext;

/// `quit`: leave the debugger, after confirming when `confirm` is on.
pub struct QuitCommand {
    descriptor: CommandDescriptor,
}

impl QuitCommand {
    pub fn new() -> Self {
        Self {
            descriptor: CommandDescriptor {
                name: "quit",
                aliases: &["q", "exit"],
                category: "support",
                min_args: 0,
                max_args: Some(1),
                needs_running_program: false,
                min_abbrev: 4,
                short_help: "Terminate the program and the debugger",
            },
        }
    }
}

impl Default for QuitCommand {
    fn default() -> Self {
        Self::new()
    }
}

impl Command for QuitCommand {
    fn descriptor(&self) -> &CommandDescriptor {
        &self.descriptor
    }

    fn run(&self, ctx: &mut CommandContext<'_>, args: &[&str]) -> Result<()> {
        let forced = args.first().is_some_and(|a| *a == "!");
        if !forced && ctx.settings.confirm && !ctx.interface.confirm("Really quit?", false)? {
            ctx.msg("Quit not confirmed.")?;
            return Ok(());
        }
        ctx.request_quit();
        Ok(())
    }
}
