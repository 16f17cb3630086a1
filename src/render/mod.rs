//! Listing renderer: decoded instructions to annotated text.
//!
//! Nothing here performs I/O directly. Output goes to a [`ListingSink`]
//! supplied by the caller, and every call takes an explicit
//! [`FormattingPolicy`].

mod highlight;
mod source;

pub use self::highlight::*;
pub use self::source::*;

use serde::{Deserialize, Serialize};

use crate::code::{CodeObject, Disassemblable};
use crate::decoder::{DecodeError, DecodeSession, DecodedInstruction, ResolvedOperand};
use crate::opcodes::OpcodeTable;
use crate::transport::ConnectError;
use crate::{LineNumber, Offset};

/// Destination for rendered text.
pub trait ListingSink {
    /// Write text without a line separator.
    fn write_fragment(&mut self, text: &str) -> Result<(), ConnectError>;

    /// Write text followed by a line separator.
    fn write_line(&mut self, text: &str) -> Result<(), ConnectError>;

    /// Heading for a block of output.
    fn section(&mut self, title: &str) -> Result<(), ConnectError> {
        self.write_line(title)
    }

    /// Diagnostic line.
    fn error_line(&mut self, text: &str) -> Result<(), ConnectError> {
        self.write_line(&format!("** {}", text))
    }
}

/// Sink that accumulates everything in memory.
#[derive(Debug, Default, Clone)]
pub struct StringSink {
    buffer: String,
}

impl StringSink {
    pub fn as_str(&self) -> &str {
        &self.buffer
    }

    pub fn into_string(self) -> String {
        self.buffer
    }

    pub fn lines(&self) -> Vec<&str> {
        self.buffer.lines().collect()
    }
}

impl ListingSink for StringSink {
    fn write_fragment(&mut self, text: &str) -> Result<(), ConnectError> {
        self.buffer.push_str(text);
        Ok(())
    }

    fn write_line(&mut self, text: &str) -> Result<(), ConnectError> {
        self.buffer.push_str(text);
        self.buffer.push('\n');
        Ok(())
    }
}

/// Last line of a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndLine {
    Absolute(LineNumber),
    /// Count of lines starting at `start_line`.
    Relative(LineNumber),
}

/// Bounds and presentation of one listing request.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FormattingPolicy {
    pub highlight: HighlightStyle,
    pub start_line: Option<LineNumber>,
    pub end_line: Option<EndLine>,
    pub start_offset: Offset,
    pub end_offset: Option<Offset>,
    /// Stop after this many statements have been listed.
    pub statement_cap: Option<usize>,
}

impl FormattingPolicy {
    /// `end_line` as an absolute line number.
    pub fn resolved_end_line(&self) -> Option<LineNumber> {
        match self.end_line? {
            EndLine::Absolute(line) => Some(line),
            EndLine::Relative(count) => Some(
                self.start_line
                    .unwrap_or(1)
                    .saturating_add(count)
                    .saturating_sub(1),
            ),
        }
    }

    /// Human-readable description of the bounds, for section headings.
    pub fn describe_bounds(&self) -> String {
        let mut mess = String::new();
        if let Some(start) = self.start_line.filter(|&l| l > 1) {
            mess.push_str(&format!(" from line {}", start));
        }
        if let Some(end) = self.resolved_end_line() {
            mess.push_str(&format!(" to line {}", end));
        }
        if self.start_offset > 1 {
            mess.push_str(&format!(" from offset {}", self.start_offset));
        }
        if let Some(end) = self.end_offset {
            mess.push_str(&format!(" to offset {}", end));
        }
        mess
    }
}

/// Errors that abort a listing.
#[derive(Debug, thiserror::Error)]
pub enum ListingError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("Bad start line {line} - code has only {max} lines")]
    StartLineOutOfRange { line: LineNumber, max: LineNumber },

    #[error("No file {0} found")]
    NoSource(String),

    #[error("Bad start line {line} - file \"{filename}\" has only {max} lines")]
    SourceLineOutOfRange {
        line: LineNumber,
        filename: String,
        max: LineNumber,
    },

    #[error(transparent)]
    Sink(#[from] ConnectError),
}

/// What a listing emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ListingSummary {
    /// Instruction rows written.
    pub rows: usize,
    /// Line-table entries written.
    pub statements: usize,
    /// True when the statement cap ended the listing early.
    pub capped: bool,
}

/// Render the instructions of `session` under `policy`.
pub fn render_listing(
    sink: &mut dyn ListingSink,
    session: &DecodeSession<'_>,
    policy: &FormattingPolicy,
) -> Result<ListingSummary, ListingError> {
    check_start_line(session.code(), policy)?;
    let end_line = policy.resolved_end_line();
    let style = policy.highlight;
    let mut summary = ListingSummary::default();

    for insn in session.instructions() {
        let insn = insn?;
        if policy.end_offset.is_some_and(|end| insn.offset > end) {
            break;
        }
        if insn.starts_line
            && end_line.is_some_and(|end| insn.line_number.is_some_and(|l| l > end))
        {
            break;
        }

        let in_lines = match policy.start_line {
            Some(start) => insn.line_number.is_some_and(|l| l >= start),
            None => true,
        };
        let in_offsets = insn.offset >= policy.start_offset;
        if !(in_lines && in_offsets) {
            continue;
        }

        if insn.starts_line {
            if policy.statement_cap.is_some_and(|cap| summary.statements >= cap) {
                summary.capped = true;
                break;
            }
            if summary.rows > 0 {
                sink.write_line("")?;
            }
            summary.statements += 1;
        }

        sink.write_fragment(&gutter(&insn, style))?;
        sink.write_line(&body(&insn, style))?;
        summary.rows += 1;
    }

    Ok(summary)
}

/// Fail when the policy starts past the last line of `code`.
pub(crate) fn check_start_line(code: &CodeObject, policy: &FormattingPolicy) -> Result<(), ListingError> {
    if let Some(start) = policy.start_line {
        let max = code.line_table.max_line().unwrap_or(0);
        if start > max {
            return Err(ListingError::StartLineOutOfRange { line: start, max });
        }
    }
    Ok(())
}

/// Line number and marker columns.
fn gutter(insn: &DecodedInstruction, style: HighlightStyle) -> String {
    let mut out = String::new();
    match insn.line_number.filter(|_| insn.starts_line) {
        Some(line) => out.push_str(&format_token(TokenKind::LineNumber, &format!("{:>3}", line), style)),
        None => out.push_str("   "),
    }
    if insn.is_current {
        out.push_str(&format_token(TokenKind::Arrow, "-->", style));
    } else {
        out.push_str("   ");
    }
    if insn.is_jump_target {
        out.push_str(&format_token(TokenKind::Arrow, ">>", style));
    } else {
        out.push_str("  ");
    }
    out
}

/// Offset, opcode name and operand columns.
fn body(insn: &DecodedInstruction, style: HighlightStyle) -> String {
    let mut out = format!("{:>4} ", insn.offset);
    out.push_str(&format_token(TokenKind::Opcode, &format!("{:<20}", insn.name), style));
    if let Some(value) = insn.operand_value {
        out.push_str(&format!("{:>5} ", value));
        if let Some(operand) = &insn.resolved_operand {
            out.push_str(&operand_text(operand, style));
        }
    }
    out
}

fn operand_text(operand: &ResolvedOperand, style: HighlightStyle) -> String {
    let wrap = |kind, text: &str| format!("({})", format_token(kind, text, style));
    match operand {
        ResolvedOperand::Const(text) => wrap(TokenKind::Const, text),
        ResolvedOperand::Name(text) => wrap(TokenKind::Name, text),
        ResolvedOperand::Local(text) => wrap(TokenKind::Var, text),
        ResolvedOperand::Compare(text) => wrap(TokenKind::Compare, text),
        ResolvedOperand::Free(text) => format!("({})", text),
        ResolvedOperand::Jump(_) => format_token(TokenKind::Label, &operand.to_string(), style),
    }
}

/// Disassemble `target`: a section heading, then one listing per code object.
///
/// Members of a container are listed in name order, each followed by a blank
/// line. A member that fails to decode is reported and skipped; only sink
/// failures abort the whole request.
pub fn disassemble(
    sink: &mut dyn ListingSink,
    target: &Disassemblable,
    table: &OpcodeTable,
    policy: &FormattingPolicy,
    current: Option<Offset>,
) -> Result<(), ListingError> {
    let bounds = policy.describe_bounds();
    match target {
        Disassemblable::Code(code) => {
            check_start_line(code, policy)?;
            sink.section(&format!("Disassembly of {}:{}", code, bounds))?;
            let session = DecodeSession::new(code, table).with_current(current);
            render_listing(sink, &session, policy)?;
        }
        Disassemblable::Container { name, members } => {
            sink.section(&format!("Disassembly of {}:{}", name, bounds))?;
            for (member, code) in members {
                let session = DecodeSession::new(code, table);
                match render_listing(sink, &session, policy) {
                    Ok(_) => {}
                    Err(ListingError::Sink(e)) => return Err(ListingError::Sink(e)),
                    Err(e) => {
                        log::debug!("skipping member {} of {}: {}", member, name, e);
                        sink.error_line(&format!("Sorry: {}: {}", member, e))?;
                    }
                }
                sink.write_line("")?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::{Constant, LineTable};
    use crate::opcodes::RuntimeVersion;
    use std::collections::BTreeMap;

    fn plain() -> FormattingPolicy {
        FormattingPolicy {
            highlight: HighlightStyle::Plain,
            ..FormattingPolicy::default()
        }
    }

    // line 1: 0 LOAD_CONST 0 (1); 3 STORE_FAST 0 (x)
    // line 2: 6 LOAD_FAST 0 (x); 9 POP_JUMP_IF_FALSE 16
    // line 3: 12 LOAD_CONST 1 (None); 15 RETURN_VALUE
    // line 4: 16 LOAD_FAST 0 (x); 19 RETURN_VALUE
    fn code() -> CodeObject {
        let mut code = CodeObject::new(
            "f",
            vec![100, 0, 0, 125, 0, 0, 124, 0, 0, 114, 16, 0, 100, 1, 0, 83, 124, 0, 0, 83],
        );
        code.consts = vec![Constant::Int(1), Constant::None];
        code.varnames = vec!["x".into()];
        code.line_table = LineTable::from_pairs(vec![(0, 1), (6, 2), (12, 3), (16, 4)]);
        code
    }

    fn render(code: &CodeObject, policy: &FormattingPolicy, current: Option<usize>) -> (String, ListingSummary) {
        let session = DecodeSession::new(code, RuntimeVersion::Classic.table()).with_current(current);
        let mut sink = StringSink::default();
        let summary = render_listing(&mut sink, &session, policy).unwrap();
        (sink.into_string(), summary)
    }

    #[test]
    fn test_row_layout() {
        let (out, summary) = render(&code(), &plain(), Some(9));
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(lines[0], format!("  1        0 {:<20}    0 (1)", "LOAD_CONST"));
        assert_eq!(lines[1], format!("           3 {:<20}    0 (x)", "STORE_FAST"));
        assert_eq!(lines[2], "");
        assert_eq!(lines[4], format!("   -->     9 {:<20}   16 (to 16)", "POP_JUMP_IF_FALSE"));
        assert!(lines.iter().any(|l| l.starts_with("  4   >>  16 LOAD_FAST")));
        assert_eq!(lines[7].trim_end(), "          15 RETURN_VALUE");
        assert_eq!(summary.statements, 4);
        assert_eq!(summary.rows, 8);
    }

    #[test]
    fn test_single_blank_between_statements() {
        let (out, _) = render(&code(), &plain(), None);
        assert!(!out.starts_with('\n'));
        assert!(!out.contains("\n\n\n"));
        assert_eq!(out.lines().filter(|l| l.is_empty()).count(), 3);
    }

    #[test]
    fn test_single_line_bounds() {
        let policy = FormattingPolicy {
            start_line: Some(3),
            end_line: Some(EndLine::Absolute(3)),
            ..plain()
        };
        let (out, summary) = render(&code(), &policy, None);
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("  3"));
        assert!(lines[1].contains("RETURN_VALUE"));
        assert_eq!(summary.statements, 1);
    }

    #[test]
    fn test_relative_end_line() {
        let policy = FormattingPolicy {
            start_line: Some(2),
            end_line: Some(EndLine::Relative(2)),
            ..plain()
        };
        assert_eq!(policy.resolved_end_line(), Some(3));
        let (out, summary) = render(&code(), &policy, None);
        assert_eq!(summary.statements, 2);
        assert!(out.contains("POP_JUMP_IF_FALSE"));
        assert!(!out.contains("  16 LOAD_FAST"));
    }

    #[test]
    fn test_start_line_beyond_code() {
        let code = code();
        let session = DecodeSession::new(&code, RuntimeVersion::Classic.table());
        let mut sink = StringSink::default();
        let policy = FormattingPolicy {
            start_line: Some(40),
            ..plain()
        };
        let err = render_listing(&mut sink, &session, &policy).unwrap_err();
        assert!(matches!(err, ListingError::StartLineOutOfRange { line: 40, max: 4 }));
        assert!(sink.as_str().is_empty());
    }

    #[test]
    fn test_offset_bounds() {
        let policy = FormattingPolicy {
            start_offset: 4,
            end_offset: Some(12),
            ..plain()
        };
        let (out, _) = render(&code(), &policy, None);
        let offsets: Vec<_> = out
            .lines()
            .filter(|l| !l.is_empty())
            .map(|l| l[8..12].trim().parse::<usize>().unwrap())
            .collect();
        assert_eq!(offsets, vec![6, 9, 12]);
    }

    #[test]
    fn test_line_and_offset_bounds_combine() {
        let policy = FormattingPolicy {
            start_line: Some(2),
            start_offset: 9,
            ..plain()
        };
        let (out, _) = render(&code(), &policy, None);
        assert!(out.lines().next().unwrap().contains("    9 POP_JUMP_IF_FALSE"));
        // the first statement start inside the bounds is preceded by one blank
        assert_eq!(out.lines().nth(1), Some(""));
    }

    #[test]
    fn test_statement_cap() {
        let policy = FormattingPolicy {
            statement_cap: Some(2),
            ..plain()
        };
        let (out, summary) = render(&code(), &policy, None);
        assert!(summary.capped);
        assert_eq!(summary.statements, 2);
        assert!(!out.contains("RETURN_VALUE"));
    }

    #[test]
    fn test_highlight_wraps_tokens() {
        let policy = FormattingPolicy {
            highlight: HighlightStyle::Dark,
            ..FormattingPolicy::default()
        };
        let (out, _) = render(&code(), &policy, None);
        assert!(out.contains('\x1b'));
    }

    #[test]
    fn test_disassemble_container_reports_bad_member() {
        let mut broken = CodeObject::new("broken", vec![100, 7, 0]);
        broken.line_table = LineTable::from_pairs(vec![(0, 1)]);
        let mut members = BTreeMap::new();
        members.insert("b_broken".to_string(), broken);
        members.insert("a_good".to_string(), code());
        let target = Disassemblable::Container {
            name: "K".into(),
            members,
        };

        let mut sink = StringSink::default();
        disassemble(&mut sink, &target, RuntimeVersion::Classic.table(), &plain(), None).unwrap();
        let out = sink.into_string();
        assert!(out.starts_with("Disassembly of K:\n"));
        let good = out.find("RETURN_VALUE").unwrap();
        let sorry = out.find("** Sorry: b_broken: offset 0").unwrap();
        assert!(good < sorry);
        assert!(out.ends_with("\n\n"));
    }

    #[test]
    fn test_disassemble_heading_mentions_bounds() {
        let policy = FormattingPolicy {
            start_line: Some(2),
            end_line: Some(EndLine::Absolute(3)),
            ..plain()
        };
        let mut sink = StringSink::default();
        disassemble(
            &mut sink,
            &Disassemblable::Code(code()),
            RuntimeVersion::Classic.table(),
            &policy,
            None,
        )
        .unwrap();
        assert!(sink.lines()[0].ends_with(": from line 2 to line 3"));
    }
}
