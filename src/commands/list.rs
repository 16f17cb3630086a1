use anyhow::{anyhow, Context, Result};

use super::{Command, CommandDescriptor};
use crate::processor::CommandContext;
use crate::render::{render_source, SourceContext, SourceRequest};
use crate::LineNumber;

/// `list [FILE:]LINE [LAST | COUNT]`
pub struct ListCommand {
    descriptor: CommandDescriptor,
}

impl ListCommand {
    pub fn new() -> Self {
        Self {
            descriptor: CommandDescriptor {
                name: "list",
                aliases: &["l"],
                category: "files",
                min_args: 0,
                max_args: Some(2),
                needs_running_program: false,
                min_abbrev: 2,
                short_help: "List source code",
            },
        }
    }
}

impl Default for ListCommand {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_line(word: &str) -> Result<LineNumber> {
    word.parse()
        .with_context(|| format!("Expecting a line number, got {:?}", word))
}

/// Split `FILE:LINE`, `FILE` or `LINE`.
fn parse_location(word: &str) -> Result<(Option<String>, Option<LineNumber>)> {
    if let Some((file, line)) = word.rsplit_once(':') {
        return Ok((Some(file.to_string()), Some(parse_line(line)?)));
    }
    if word.bytes().all(|b| b.is_ascii_digit()) {
        Ok((None, Some(parse_line(word)?)))
    } else {
        Ok((Some(word.to_string()), None))
    }
}

/// First line of a window of `size` lines centred on `line`.
fn centred(line: LineNumber, size: LineNumber) -> LineNumber {
    line.saturating_sub(size / 2).max(1)
}

/// Last line of a window of `size` lines starting at `first`.
fn window_end(first: LineNumber, size: LineNumber) -> LineNumber {
    first.saturating_add(size.saturating_sub(1))
}

impl Command for ListCommand {
    fn descriptor(&self) -> &CommandDescriptor {
        &self.descriptor
    }

    fn run(&self, ctx: &mut CommandContext<'_>, args: &[&str]) -> Result<()> {
        let size = ctx.settings.listsize.max(1);
        let debuggee = &mut *ctx.debuggee;
        let frame_file = debuggee
            .frame
            .as_ref()
            .map(|f| f.code.filename.clone())
            .filter(|f| !f.is_empty());

        let (filename, first, last) = match args {
            [] => match (&debuggee.list_next, &frame_file) {
                (Some((file, next)), _) => (Some(file.clone()), *next, window_end(*next, size)),
                (None, _) => {
                    let line = debuggee.current_line().unwrap_or(1);
                    let first = centred(line, size);
                    (frame_file.clone(), first, window_end(first, size))
                }
            },
            [location] => {
                let (file, line) = parse_location(location)?;
                let first = line.map_or(1, |l| centred(l, size));
                (file.or(frame_file.clone()), first, window_end(first, size))
            }
            [location, end, ..] => {
                let (file, line) = parse_location(location)?;
                let first = line.unwrap_or(1);
                let mut last = parse_line(end)?;
                if last < first {
                    last = window_end(first, last);
                }
                (file.or(frame_file.clone()), first, last)
            }
        };
        let filename = filename.ok_or_else(|| anyhow!("No default source file; use list FILE:LINE"))?;

        let current = match &frame_file {
            Some(file) if *file == filename => debuggee.current_line(),
            _ => None,
        };
        let request = SourceRequest {
            filename: filename.clone(),
            first,
            last,
        };
        let source_ctx = SourceContext {
            sources: &debuggee.sources,
            breakpoints: &debuggee.breakpoints,
            frame: &current,
        };
        let shown = render_source(ctx.interface.as_sink(), &request, &source_ctx, ctx.settings.highlight)?;
        if let Some(shown) = shown {
            debuggee.list_next = Some((filename, shown.saturating_add(1)));
        }
        Ok(())
    }
}
