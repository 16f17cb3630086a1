use anyhow::{anyhow, Result};

use super::{parse_on_off, run_subcommand, Command, CommandDescriptor, Subcommand, SubcommandDescriptor};
use crate::format::OutputFormat;
use crate::processor::CommandContext;
use crate::registry::{Registry, RegistryError};
use crate::render::HighlightStyle;
use crate::settings::SettingsProvider;

const SKIP: SubcommandDescriptor = SubcommandDescriptor {
    name: "skip",
    min_abbrev: 2,
    in_list: true,
    short_help: "Set stopping before def or class statements",
};

const DIFFERENT: SubcommandDescriptor = SubcommandDescriptor {
    name: "different",
    min_abbrev: 3,
    in_list: true,
    short_help: "Set consecutive stops must be on different positions",
};

const HIGHLIGHT: SubcommandDescriptor = SubcommandDescriptor {
    name: "highlight",
    min_abbrev: 2,
    in_list: true,
    short_help: "Set the colour scheme of listings",
};

const FORMAT: SubcommandDescriptor = SubcommandDescriptor {
    name: "format",
    min_abbrev: 3,
    in_list: true,
    short_help: "Set the output format of disassembly",
};

/// `set NAME [on|off]` for a boolean setting.
struct SetBool {
    descriptor: SubcommandDescriptor,
}

impl Subcommand for SetBool {
    fn descriptor(&self) -> &SubcommandDescriptor {
        &self.descriptor
    }

    fn run(&self, ctx: &mut CommandContext<'_>, args: &[&str]) -> Result<()> {
        let value = match args.first() {
            Some(word) => parse_on_off(word)?,
            None => true,
        };
        ctx.settings.set_bool(self.descriptor.name, value)?;
        Ok(())
    }
}

struct SetHighlight;

impl Subcommand for SetHighlight {
    fn descriptor(&self) -> &SubcommandDescriptor {
        &HIGHLIGHT
    }

    fn run(&self, ctx: &mut CommandContext<'_>, args: &[&str]) -> Result<()> {
        let word = args
            .first()
            .ok_or_else(|| anyhow!("Expecting one of: plain, light, dark."))?;
        ctx.settings.highlight = word.parse::<HighlightStyle>().map_err(|e| anyhow!(e))?;
        Ok(())
    }
}

struct SetFormat;

impl Subcommand for SetFormat {
    fn descriptor(&self) -> &SubcommandDescriptor {
        &FORMAT
    }

    fn run(&self, ctx: &mut CommandContext<'_>, args: &[&str]) -> Result<()> {
        let word = args
            .first()
            .ok_or_else(|| anyhow!("Expecting one of: text, json, jsonl."))?;
        ctx.settings.format = word.parse::<OutputFormat>().map_err(|e| anyhow!(e))?;
        Ok(())
    }
}

/// `show NAME`: print a setting's value.
struct ShowSetting {
    descriptor: SubcommandDescriptor,
}

impl Subcommand for ShowSetting {
    fn descriptor(&self) -> &SubcommandDescriptor {
        &self.descriptor
    }

    fn run(&self, ctx: &mut CommandContext<'_>, _args: &[&str]) -> Result<()> {
        let name = self.descriptor.name;
        let value = ctx
            .settings
            .get(name)
            .ok_or_else(|| anyhow!("{} is not set.", name))?;
        ctx.msg(&format!("{} is {}.", name, value))?;
        Ok(())
    }
}

fn show_descriptor(set: &SubcommandDescriptor) -> SubcommandDescriptor {
    SubcommandDescriptor {
        short_help: match set.name {
            "skip" => "Show stopping before def or class statements",
            "different" => "Show whether consecutive stops differ in position",
            "highlight" => "Show the colour scheme of listings",
            _ => "Show the output format of disassembly",
        },
        ..set.clone()
    }
}

/// `set SUBCOMMAND ...`
pub struct SetCommand {
    descriptor: CommandDescriptor,
    subcommands: Registry<Box<dyn Subcommand>>,
}

impl SetCommand {
    pub fn new() -> Result<Self, RegistryError> {
        let mut subcommands: Registry<Box<dyn Subcommand>> = Registry::new();
        subcommands.register(Box::new(SetBool { descriptor: SKIP }))?;
        subcommands.register(Box::new(SetBool { descriptor: DIFFERENT }))?;
        subcommands.register(Box::new(SetHighlight))?;
        subcommands.register(Box::new(SetFormat))?;
        Ok(Self {
            descriptor: CommandDescriptor {
                name: "set",
                aliases: &[],
                category: "data",
                min_args: 0,
                max_args: None,
                needs_running_program: false,
                min_abbrev: 3,
                short_help: "Modify parts of the debugger environment",
            },
            subcommands,
        })
    }
}

impl Command for SetCommand {
    fn descriptor(&self) -> &CommandDescriptor {
        &self.descriptor
    }

    fn run(&self, ctx: &mut CommandContext<'_>, args: &[&str]) -> Result<()> {
        run_subcommand("set", &self.subcommands, ctx, args)
    }

    fn subcommands(&self) -> Option<&Registry<Box<dyn Subcommand>>> {
        Some(&self.subcommands)
    }
}

/// `show [SUBCOMMAND]`
pub struct ShowCommand {
    descriptor: CommandDescriptor,
    subcommands: Registry<Box<dyn Subcommand>>,
}

impl ShowCommand {
    pub fn new() -> Result<Self, RegistryError> {
        let mut subcommands: Registry<Box<dyn Subcommand>> = Registry::new();
        for set in [&SKIP, &DIFFERENT, &HIGHLIGHT, &FORMAT] {
            subcommands.register(Box::new(ShowSetting {
                descriptor: show_descriptor(set),
            }))?;
        }
        Ok(Self {
            descriptor: CommandDescriptor {
                name: "show",
                aliases: &[],
                category: "status",
                min_args: 0,
                max_args: Some(1),
                needs_running_program: false,
                min_abbrev: 2,
                short_help: "Generic command for showing things about the debugger",
            },
            subcommands,
        })
    }
}

impl Command for ShowCommand {
    fn descriptor(&self) -> &CommandDescriptor {
        &self.descriptor
    }

    fn run(&self, ctx: &mut CommandContext<'_>, args: &[&str]) -> Result<()> {
        if args.is_empty() {
            for sub in self.subcommands.iter() {
                sub.run(ctx, &[])?;
            }
            return Ok(());
        }
        run_subcommand("show", &self.subcommands, ctx, args)
    }

    fn subcommands(&self) -> Option<&Registry<Box<dyn Subcommand>>> {
        Some(&self.subcommands)
    }
}
