use anyhow::{anyhow, bail, Context, Result};

use super::{Command, CommandDescriptor};
use crate::code::Disassemblable;
use crate::decoder::DecodeSession;
use crate::format::OutputFormat;
use crate::processor::CommandContext;
use crate::render::{self, EndLine, FormattingPolicy};
use crate::Offset;

/// `disassemble [NAME] [FIRST [LAST | +COUNT]] [@START [@END]]`
pub struct DisassembleCommand {
    descriptor: CommandDescriptor,
}

impl DisassembleCommand {
    pub fn new() -> Self {
        Self {
            descriptor: CommandDescriptor {
                name: "disassemble",
                aliases: &["disasm"],
                category: "data",
                min_args: 0,
                max_args: Some(5),
                needs_running_program: false,
                min_abbrev: 6,
                short_help: "Disassemble the current frame or a named object",
            },
        }
    }
}

impl Default for DisassembleCommand {
    fn default() -> Self {
        Self::new()
    }
}

/// Apply the position arguments to `policy`.
fn parse_bounds(args: &[&str], policy: &mut FormattingPolicy) -> Result<()> {
    let mut lines_seen = 0;
    let mut offsets_seen = 0;
    for arg in args {
        if let Some(offset) = arg.strip_prefix('@') {
            let offset: Offset = offset
                .parse()
                .with_context(|| format!("Bad offset {:?}", arg))?;
            match offsets_seen {
                0 => policy.start_offset = offset,
                1 => policy.end_offset = Some(offset),
                _ => bail!("Too many offsets: {}", arg),
            }
            offsets_seen += 1;
        } else if let Some(count) = arg.strip_prefix('+') {
            let count = count
                .parse()
                .with_context(|| format!("Bad line count {:?}", arg))?;
            if lines_seen != 1 {
                bail!("A line count must follow a start line: {}", arg);
            }
            policy.end_line = Some(EndLine::Relative(count));
            lines_seen += 1;
        } else {
            let line = arg
                .parse()
                .with_context(|| format!("Expecting a line number, got {:?}", arg))?;
            match lines_seen {
                0 => policy.start_line = Some(line),
                1 => policy.end_line = Some(EndLine::Absolute(line)),
                _ => bail!("Too many line numbers: {}", arg),
            }
            lines_seen += 1;
        }
    }
    Ok(())
}

fn is_position(arg: &str) -> bool {
    arg.starts_with('@') || arg.starts_with('+') || arg.bytes().all(|b| b.is_ascii_digit())
}

impl Command for DisassembleCommand {
    fn descriptor(&self) -> &CommandDescriptor {
        &self.descriptor
    }

    fn run(&self, ctx: &mut CommandContext<'_>, args: &[&str]) -> Result<()> {
        let (named, positions) = match args.split_first() {
            Some((&first, rest)) if !is_position(first) && first != "." => (Some(first), rest),
            Some((&".", rest)) => (None, rest),
            _ => (None, args),
        };

        let (target, current) = match named {
            Some(name) => {
                let target = ctx
                    .debuggee
                    .targets
                    .get(name)
                    .cloned()
                    .ok_or_else(|| anyhow!("Don't know how to disassemble {:?}", name))?;
                (target, None)
            }
            None => {
                if !ctx.debuggee.running {
                    bail!("The program being debugged is not being run.");
                }
                let frame = ctx
                    .debuggee
                    .frame
                    .as_ref()
                    .ok_or_else(|| anyhow!("No frame selected."))?;
                (Disassemblable::Code(frame.code.clone()), Some(frame.offset))
            }
        };

        let mut policy = ctx.settings.formatting_policy();
        parse_bounds(positions, &mut policy)?;
        let table = ctx.debuggee.table();

        match ctx.settings.format {
            OutputFormat::Text => {
                render::disassemble(ctx.interface.as_sink(), &target, table, &policy, current)
                    .with_context(|| format!("cannot disassemble {}", target.name()))?;
            }
            format => {
                let formatter = format.get_formatter();
                for code in target.code_objects() {
                    let session = DecodeSession::new(code, table).with_current(current);
                    let text = formatter.format(&session, &policy)?;
                    for line in text.lines() {
                        ctx.interface.msg(line)?;
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::{CodeObject, Constant, LineTable};
    use crate::processor::tests::{stopped_debuggee, ScriptedInterface};
    use crate::processor::{CommandProcessor, DebuggeeState};
    use crate::render::HighlightStyle;
    use crate::settings::Settings;
    use rstest::rstest;
    use std::collections::BTreeMap;

    fn run(line: &str, settings: Settings) -> String {
        let mut debuggee = stopped_debuggee();
        let mut helper = CodeObject::new("helper", vec![100, 0, 0, 83]);
        helper.consts = vec![Constant::Str("x".into())];
        helper.line_table = LineTable::from_pairs(vec![(0, 10)]);
        let mut members = BTreeMap::new();
        members.insert("helper".to_string(), helper.clone());
        debuggee.targets.insert("helper".into(), Disassemblable::Code(helper));
        debuggee.targets.insert(
            "Module".into(),
            Disassemblable::Container {
                name: "Module".into(),
                members,
            },
        );

        let mut p = CommandProcessor::with_default_commands(settings, debuggee).unwrap();
        let mut intf = ScriptedInterface::default();
        p.execute_line(&mut intf, line).unwrap();
        intf.output
    }

    fn plain() -> Settings {
        Settings {
            highlight: HighlightStyle::Plain,
            ..Settings::default()
        }
    }

    #[rstest]
    #[case(&["3"], Some(3), None, 0, None)]
    #[case(&["3", "7"], Some(3), Some(EndLine::Absolute(7)), 0, None)]
    #[case(&["3", "+2"], Some(3), Some(EndLine::Relative(2)), 0, None)]
    #[case(&["@4", "@10"], None, None, 4, Some(10))]
    #[case(&["2", "@6"], Some(2), None, 6, None)]
    fn test_parse_bounds(
        #[case] args: &[&str],
        #[case] start_line: Option<u32>,
        #[case] end_line: Option<EndLine>,
        #[case] start_offset: usize,
        #[case] end_offset: Option<usize>,
    ) {
        let mut policy = FormattingPolicy::default();
        parse_bounds(args, &mut policy).unwrap();
        assert_eq!(policy.start_line, start_line);
        assert_eq!(policy.end_line, end_line);
        assert_eq!(policy.start_offset, start_offset);
        assert_eq!(policy.end_offset, end_offset);
    }

    #[rstest]
    #[case(&["+2"])]
    #[case(&["x1"])]
    #[case(&["1", "2", "3"])]
    #[case(&["@1", "@2", "@3"])]
    fn test_parse_bounds_rejects(#[case] args: &[&str]) {
        assert!(parse_bounds(args, &mut FormattingPolicy::default()).is_err());
    }

    #[test]
    fn test_current_frame() {
        let out = run("disassemble", plain());
        let lines: Vec<_> = out.lines().collect();
        assert!(lines[0].starts_with("Disassembly of <code object main"));
        assert!(lines.iter().any(|l| l.starts_with("  2-->") && l.contains("LOAD_FAST")));
    }

    #[test]
    fn test_named_target_with_bounds() {
        let out = run("disasm helper 10 10", plain());
        assert!(out.starts_with("Disassembly of <code object helper>: from line 10 to line 10\n"));
        assert!(out.contains("('x')"));
    }

    #[test]
    fn test_container_target() {
        let out = run("disassemble Module", plain());
        assert!(out.starts_with("Disassembly of Module:\n"));
        assert!(out.ends_with("\n\n"));
        assert!(out.trim_end().ends_with("RETURN_VALUE"));
    }

    #[test]
    fn test_named_target_without_running_program() {
        let mut debuggee = DebuggeeState::default();
        let mut helper = CodeObject::new("helper", vec![100, 0, 0, 83]);
        helper.consts = vec![Constant::Int(1)];
        helper.line_table = LineTable::from_pairs(vec![(0, 1)]);
        debuggee.targets.insert("helper".into(), Disassemblable::Code(helper));
        let mut p = CommandProcessor::with_default_commands(plain(), debuggee).unwrap();

        let mut intf = ScriptedInterface::default();
        p.execute_line(&mut intf, "disassemble helper").unwrap();
        assert!(intf.output.starts_with("Disassembly of <code object helper>:\n"));

        let mut intf = ScriptedInterface::default();
        p.execute_line(&mut intf, "disassemble").unwrap();
        assert_eq!(intf.output, "** The program being debugged is not being run.\n");
    }

    #[test]
    fn test_unknown_target() {
        let out = run("disassemble nothing", plain());
        assert_eq!(out, "** Don't know how to disassemble \"nothing\"\n");
    }

    #[test]
    fn test_json_lines_output() {
        let settings = Settings {
            format: OutputFormat::JsonLines,
            ..plain()
        };
        let out = run("disassemble", settings);
        let records: Vec<serde_json::Value> = out.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(records.len(), 4);
        assert_eq!(records[2]["is_current"], true);
    }
}
