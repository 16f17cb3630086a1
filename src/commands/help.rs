use anyhow::{bail, Result};

use super::{Command, CommandDescriptor};
use crate::processor::CommandContext;

/// `help [COMMAND [SUBCOMMAND]]`
pub struct HelpCommand {
    descriptor: CommandDescriptor,
}

impl HelpCommand {
    pub fn new() -> Self {
        Self {
            descriptor: CommandDescriptor {
                name: "help",
                aliases: &["?"],
                category: "support",
                min_args: 0,
                max_args: Some(2),
                needs_running_program: false,
                min_abbrev: 1,
                short_help: "Print commands or give help for command(s)",
            },
        }
    }
}

impl Default for HelpCommand {
    fn default() -> Self {
        Self::new()
    }
}

impl Command for HelpCommand {
    fn descriptor(&self) -> &CommandDescriptor {
        &self.descriptor
    }

    fn run(&self, ctx: &mut CommandContext<'_>, args: &[&str]) -> Result<()> {
        let commands = ctx.commands;
        let Some((&name, rest)) = args.split_first() else {
            ctx.msg("List of commands:")?;
            for command in commands.iter() {
                let desc = command.descriptor();
                ctx.msg(&format!("  {:<12} -- {}", desc.name, desc.short_help))?;
            }
            return Ok(());
        };

        let Some(command) = commands.lookup_with(name, &*ctx.settings) else {
            bail!("Undefined command: \"{}\". Try \"help\".", name);
        };
        let desc = command.descriptor();

        match (rest.first(), command.subcommands()) {
            (None, subcommands) => {
                ctx.msg(&format!("{} -- {}", desc.name, desc.short_help))?;
                if !desc.aliases.is_empty() {
                    ctx.msg(&format!("Aliases: {}", desc.aliases.join(", ")))?;
                }
                if let Some(subcommands) = subcommands {
                    ctx.msg(&format!("List of {} subcommands:", desc.name))?;
                    for sub in subcommands.iter().filter(|s| s.descriptor().in_list) {
                        let sub = sub.descriptor();
                        ctx.msg(&format!("  {} {:<10} -- {}", desc.name, sub.name, sub.short_help))?;
                    }
                }
            }
            (Some(token), Some(subcommands)) => match subcommands.lookup_with(token, &*ctx.settings) {
                Some(sub) => {
                    let sub = sub.descriptor();
                    ctx.msg(&format!("{} {} -- {}", desc.name, sub.name, sub.short_help))?;
                }
                None => bail!("Undefined \"{}\" subcommand: \"{}\".", desc.name, token),
            },
            (Some(_), None) => bail!("Command \"{}\" has no subcommands.", desc.name),
        }
        Ok(())
    }
}
