//! Built-in debugger commands.
//!
//! Each command describes itself with a [`CommandDescriptor`]; the processor
//! uses it for lookup, argument-count checks and help. Commands with
//! subcommands keep them in their own [`Registry`].

mod disassemble;
mod help;
mod list;
mod quit;
mod set;

pub use self::disassemble::DisassembleCommand;
pub use self::help::HelpCommand;
pub use self::list::ListCommand;
pub use self::quit::QuitCommand;
pub use self::set::{SetCommand, ShowCommand};

use anyhow::Result;

use crate::processor::CommandContext;
use crate::registry::{Registry, RegistryEntry, RegistryError};

/// Static description of a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandDescriptor {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub category: &'static str,
    pub min_args: usize,
    /// `None` for no limit.
    pub max_args: Option<usize>,
    pub needs_running_program: bool,
    pub min_abbrev: usize,
    pub short_help: &'static str,
}

/// Static description of a subcommand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubcommandDescriptor {
    pub name: &'static str,
    pub min_abbrev: usize,
    pub in_list: bool,
    pub short_help: &'static str,
}

/// A top-level debugger command.
pub trait Command {
    fn descriptor(&self) -> &CommandDescriptor;

    /// Run with the words after the command name.
    fn run(&self, ctx: &mut CommandContext<'_>, args: &[&str]) -> Result<()>;

    /// Subcommands, for commands that have them.
    fn subcommands(&self) -> Option<&Registry<Box<dyn Subcommand>>> {
        None
    }
}

/// A subcommand owned by one parent command.
pub trait Subcommand {
    fn descriptor(&self) -> &SubcommandDescriptor;

    /// Run with the words after the subcommand name.
    fn run(&self, ctx: &mut CommandContext<'_>, args: &[&str]) -> Result<()>;
}

impl RegistryEntry for dyn Command {
    fn name(&self) -> &str {
        self.descriptor().name
    }

    fn aliases(&self) -> &[&'static str] {
        self.descriptor().aliases
    }

    fn min_abbrev(&self) -> usize {
        self.descriptor().min_abbrev
    }
}

impl RegistryEntry for dyn Subcommand {
    fn name(&self) -> &str {
        self.descriptor().name
    }

    fn min_abbrev(&self) -> usize {
        self.descriptor().min_abbrev
    }

    fn in_list(&self) -> bool {
        self.descriptor().in_list
    }
}

/// The built-in command set.
pub fn default_commands() -> Result<Vec<Box<dyn Command>>, RegistryError> {
    let commands: Vec<Box<dyn Command>> = vec![
        Box::new(DisassembleCommand::new()),
        Box::new(HelpCommand::new()),
        Box::new(ListCommand::new()),
        Box::new(QuitCommand::new()),
        Box::new(SetCommand::new()?),
        Box::new(ShowCommand::new()?),
    ];
    Ok(commands)
}

/// Run the subcommand of `parent` named by `args[0]`.
fn run_subcommand(
    parent: &str,
    subcommands: &Registry<Box<dyn Subcommand>>,
    ctx: &mut CommandContext<'_>,
    args: &[&str],
) -> Result<()> {
    let Some((&token, rest)) = args.split_first() else {
        ctx.msg(&format!("List of {} subcommands:", parent))?;
        ctx.msg(&subcommands.list().join(" "))?;
        return Ok(());
    };
    match subcommands.lookup_with(token, &*ctx.settings) {
        Some(sub) => sub.run(ctx, rest),
        None => anyhow::bail!(
            "Undefined \"{}\" subcommand: \"{}\". Try \"help {}\".",
            parent,
            token,
            parent
        ),
    }
}

/// Parse an on/off style word.
fn parse_on_off(word: &str) -> Result<bool> {
    match word.to_lowercase().as_str() {
        "on" | "1" | "yes" | "true" => Ok(true),
        "off" | "0" | "no" | "false" => Ok(false),
        _ => anyhow::bail!("Expecting 'on', 1, 'off', or 0. Got: {}.", word),
    }
}
