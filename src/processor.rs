//! Command processor: reads command lines, resolves them in the command
//! registry and runs them against the debuggee.

use std::collections::BTreeMap;

use crate::code::{CodeObject, Disassemblable};
use crate::commands::{self, Command};
use crate::opcodes::{OpcodeTable, RuntimeVersion};
use crate::registry::{Registry, RegistryError};
use crate::render::{BreakpointMarker, ListingSink, MemorySources};
use crate::settings::Settings;
use crate::transport::ConnectError;
use crate::{LineNumber, Offset};

/// What commands talk to: the user, wherever they are.
pub trait DebuggerInterface: ListingSink {
    fn msg(&mut self, text: &str) -> Result<(), ConnectError>;

    fn errmsg(&mut self, text: &str) -> Result<(), ConnectError>;

    /// Yes/no question; end of input answers `default`.
    fn confirm(&mut self, prompt: &str, default: bool) -> Result<bool, ConnectError>;

    /// Next command line, `None` at end of input.
    fn read_command(&mut self, prompt: &str) -> Result<Option<String>, ConnectError>;

    fn as_sink(&mut self) -> &mut dyn ListingSink;
}

/// The frame the debugger has stopped in.
#[derive(Debug, Clone, PartialEq)]
pub struct StoppedFrame {
    pub code: CodeObject,
    pub offset: Offset,
}

impl StoppedFrame {
    pub fn line(&self) -> Option<LineNumber> {
        self.code.line_table.line_at(self.offset)
    }
}

/// What the debugger knows about the program under control.
#[derive(Debug, Default)]
pub struct DebuggeeState {
    pub running: bool,
    pub frame: Option<StoppedFrame>,
    /// Objects `disassemble` accepts by name.
    pub targets: BTreeMap<String, Disassemblable>,
    pub sources: MemorySources,
    pub breakpoints: BTreeMap<(String, LineNumber), BreakpointMarker>,
    pub runtime: RuntimeVersion,
    /// Replaces the built-in table of `runtime` when set.
    pub opcode_table: Option<OpcodeTable>,
    /// Where a bare `list` continues.
    pub list_next: Option<(String, LineNumber)>,
}

impl DebuggeeState {
    pub fn table(&self) -> &OpcodeTable {
        match &self.opcode_table {
            Some(table) => table,
            None => self.runtime.table(),
        }
    }

    /// Stop in `code` at `offset`.
    pub fn stop_at(&mut self, code: CodeObject, offset: Offset) {
        self.running = true;
        self.list_next = None;
        self.frame = Some(StoppedFrame { code, offset });
    }

    pub fn current_line(&self) -> Option<LineNumber> {
        self.frame.as_ref()?.line()
    }
}

/// Whether the command loop keeps going.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Everything a command may touch while it runs.
pub struct CommandContext<'a> {
    pub interface: &'a mut dyn DebuggerInterface,
    pub settings: &'a mut Settings,
    pub debuggee: &'a mut DebuggeeState,
    pub commands: &'a Registry<Box<dyn Command>>,
    quit: bool,
}

impl CommandContext<'_> {
    /// End the command loop once the current command returns.
    pub fn request_quit(&mut self) {
        self.quit = true;
    }

    pub fn msg(&mut self, text: &str) -> Result<(), ConnectError> {
        self.interface.msg(text)
    }

    pub fn errmsg(&mut self, text: &str) -> Result<(), ConnectError> {
        self.interface.errmsg(text)
    }
}

pub const DEFAULT_PROMPT: &str = "(vmdbg) ";

/// Reads, resolves and runs commands.
pub struct CommandProcessor {
    commands: Registry<Box<dyn Command>>,
    pub settings: Settings,
    pub debuggee: DebuggeeState,
    pub prompt: String,
}

impl CommandProcessor {
    /// Processor with no commands.
    pub fn new(settings: Settings, debuggee: DebuggeeState) -> Self {
        Self {
            commands: Registry::new(),
            settings,
            debuggee,
            prompt: DEFAULT_PROMPT.to_string(),
        }
    }

    /// Processor with the built-in command set.
    pub fn with_default_commands(settings: Settings, debuggee: DebuggeeState) -> Result<Self, RegistryError> {
        let mut processor = Self::new(settings, debuggee);
        for command in commands::default_commands()? {
            processor.register(command)?;
        }
        Ok(processor)
    }

    pub fn register(&mut self, command: Box<dyn Command>) -> Result<(), RegistryError> {
        self.commands.register(command)
    }

    pub fn commands(&self) -> &Registry<Box<dyn Command>> {
        &self.commands
    }

    /// Run one command line. Command failures are reported to the user;
    /// only a broken connection is returned.
    pub fn execute_line(
        &mut self,
        interface: &mut dyn DebuggerInterface,
        line: &str,
    ) -> Result<Flow, ConnectError> {
        let words: Vec<&str> = line.split_whitespace().collect();
        let Some((&name, args)) = words.split_first() else {
            return Ok(Flow::Continue);
        };

        let Some(command) = self.commands.lookup_with(name, &self.settings) else {
            interface.errmsg(&format!("Undefined command: \"{}\". Try \"help\".", name))?;
            return Ok(Flow::Continue);
        };
        let desc = command.descriptor();

        if args.len() < desc.min_args {
            interface.errmsg(&format!(
                "Command '{}' needs at least {} argument(s); got {}.",
                desc.name,
                desc.min_args,
                args.len()
            ))?;
            return Ok(Flow::Continue);
        }
        if let Some(max) = desc.max_args.filter(|&max| args.len() > max) {
            interface.errmsg(&format!(
                "Command '{}' can take at most {} argument(s); got {}.",
                desc.name,
                max,
                args.len()
            ))?;
            return Ok(Flow::Continue);
        }
        if desc.needs_running_program && !self.debuggee.running {
            interface.errmsg("The program being debugged is not being run.")?;
            return Ok(Flow::Continue);
        }

        log::debug!("running {} {:?}", desc.name, args);
        let mut ctx = CommandContext {
            interface: &mut *interface,
            settings: &mut self.settings,
            debuggee: &mut self.debuggee,
            commands: &self.commands,
            quit: false,
        };
        let result = command.run(&mut ctx, args);
        let quit = ctx.quit;

        if let Err(err) = result {
            match err.downcast::<ConnectError>() {
                Ok(broken) => return Err(broken),
                Err(err) => interface.errmsg(&format!("{:#}", err))?,
            }
        }
        Ok(if quit { Flow::Quit } else { Flow::Continue })
    }

    /// Read and run commands until end of input or a quit.
    pub fn run(&mut self, interface: &mut dyn DebuggerInterface) -> Result<(), ConnectError> {
        loop {
            let prompt = self.prompt.clone();
            let Some(line) = interface.read_command(&prompt)? else {
                log::info!("end of command input");
                return Ok(());
            };
            if self.execute_line(interface, &line)? == Flow::Quit {
                log::info!("quit requested");
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::code::{Constant, LineTable};
    use crate::commands::CommandDescriptor;
    use std::collections::VecDeque;

    /// Interface that replays canned input and records output.
    #[derive(Default)]
    pub(crate) struct ScriptedInterface {
        pub input: VecDeque<String>,
        pub output: String,
        pub confirms: Vec<String>,
    }

    impl ScriptedInterface {
        pub fn with_input(lines: &[&str]) -> Self {
            Self {
                input: lines.iter().map(|s| s.to_string()).collect(),
                ..Self::default()
            }
        }
    }

    impl ListingSink for ScriptedInterface {
        fn write_fragment(&mut self, text: &str) -> Result<(), ConnectError> {
            self.output.push_str(text);
            Ok(())
        }

        fn write_line(&mut self, text: &str) -> Result<(), ConnectError> {
            self.output.push_str(text);
            self.output.push('\n');
            Ok(())
        }
    }

    impl DebuggerInterface for ScriptedInterface {
        fn msg(&mut self, text: &str) -> Result<(), ConnectError> {
            self.write_line(text)
        }

        fn errmsg(&mut self, text: &str) -> Result<(), ConnectError> {
            self.write_line(&format!("** {}", text))
        }

        fn confirm(&mut self, prompt: &str, default: bool) -> Result<bool, ConnectError> {
            self.confirms.push(prompt.to_string());
            Ok(match self.input.pop_front() {
                Some(answer) => answer.trim().eq_ignore_ascii_case("y"),
                None => default,
            })
        }

        fn read_command(&mut self, _prompt: &str) -> Result<Option<String>, ConnectError> {
            Ok(self.input.pop_front())
        }

        fn as_sink(&mut self) -> &mut dyn ListingSink {
            self
        }
    }

    /// Two-line function stopped at its second statement.
    pub(crate) fn stopped_debuggee() -> DebuggeeState {
        let mut code = CodeObject::new("main", vec![100, 0, 0, 125, 0, 0, 124, 0, 0, 83]);
        code.filename = "main.py".into();
        code.consts = vec![Constant::Int(42)];
        code.varnames = vec!["answer".into()];
        code.line_table = LineTable::from_pairs(vec![(0, 1), (6, 2)]);

        let mut debuggee = DebuggeeState::default();
        debuggee.sources.insert("main.py", "answer = 42\nreturn answer\n");
        debuggee.stop_at(code, 6);
        debuggee
    }

    fn processor(debuggee: DebuggeeState) -> CommandProcessor {
        let settings = Settings {
            highlight: crate::render::HighlightStyle::Plain,
            ..Settings::default()
        };
        CommandProcessor::with_default_commands(settings, debuggee).unwrap()
    }

    #[test]
    fn test_undefined_command() {
        let mut p = processor(DebuggeeState::default());
        let mut intf = ScriptedInterface::default();
        assert_eq!(p.execute_line(&mut intf, "frobnicate 1").unwrap(), Flow::Continue);
        assert_eq!(intf.output, "** Undefined command: \"frobnicate\". Try \"help\".\n");
    }

    #[test]
    fn test_blank_line_is_ignored() {
        let mut p = processor(DebuggeeState::default());
        let mut intf = ScriptedInterface::default();
        assert_eq!(p.execute_line(&mut intf, "   ").unwrap(), Flow::Continue);
        assert!(intf.output.is_empty());
    }

    #[test]
    fn test_argument_count_checked() {
        let mut p = processor(DebuggeeState::default());
        let mut intf = ScriptedInterface::default();
        p.execute_line(&mut intf, "quit now please").unwrap();
        assert!(intf.output.starts_with("** Command 'quit' can take at most"));
    }

    struct StepCommand(CommandDescriptor);

    impl Command for StepCommand {
        fn descriptor(&self) -> &CommandDescriptor {
            &self.0
        }

        fn run(&self, ctx: &mut CommandContext<'_>, _args: &[&str]) -> anyhow::Result<()> {
            ctx.msg("stepped")?;
            Ok(())
        }
    }

    fn step_command() -> Box<dyn Command> {
        Box::new(StepCommand(CommandDescriptor {
            name: "step",
            aliases: &["s"],
            category: "running",
            min_args: 0,
            max_args: Some(1),
            needs_running_program: true,
            min_abbrev: 1,
            short_help: "Step one statement",
        }))
    }

    #[test]
    fn test_needs_running_program() {
        let mut p = processor(DebuggeeState::default());
        p.register(step_command()).unwrap();
        let mut intf = ScriptedInterface::default();
        p.execute_line(&mut intf, "step").unwrap();
        assert_eq!(intf.output, "** The program being debugged is not being run.\n");

        let mut p = processor(stopped_debuggee());
        p.register(step_command()).unwrap();
        let mut intf = ScriptedInterface::default();
        p.execute_line(&mut intf, "s").unwrap();
        assert_eq!(intf.output, "stepped\n");
    }

    #[test]
    fn test_abbreviated_command_runs() {
        let mut p = processor(stopped_debuggee());
        let mut intf = ScriptedInterface::default();
        p.execute_line(&mut intf, "disas").unwrap();
        assert!(intf.output.contains("Undefined command"));

        intf.output.clear();
        p.execute_line(&mut intf, "disasm").unwrap();
        assert!(intf.output.starts_with("Disassembly of <code object main"));
        assert!(intf.output.contains("-->"));
    }

    #[test]
    fn test_command_error_reported_on_one_line() {
        let mut p = processor(stopped_debuggee());
        let mut intf = ScriptedInterface::default();
        p.execute_line(&mut intf, "disassemble 40").unwrap();
        assert_eq!(intf.output.lines().count(), 1);
        assert!(intf.output.starts_with("** "));
        assert!(intf.output.contains("Bad start line 40"));
    }

    #[test]
    fn test_run_until_quit() {
        let mut p = processor(stopped_debuggee());
        let mut intf = ScriptedInterface::with_input(&["show skip", "quit", "y", "show skip"]);
        p.run(&mut intf).unwrap();
        assert_eq!(intf.confirms, vec!["Really quit?".to_string()]);
        assert_eq!(intf.output, "skip is on.\n");
        assert_eq!(intf.input.len(), 1);
    }

    #[test]
    fn test_run_until_end_of_input() {
        let mut p = processor(stopped_debuggee());
        let mut intf = ScriptedInterface::with_input(&["set different off", "show different"]);
        p.run(&mut intf).unwrap();
        assert!(!p.settings.different);
        assert_eq!(intf.output, "different is off.\n");
    }
}
