//! Output formats for disassembly listings

mod json;

pub use self::json::*;

use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::decoder::{DecodeSession, DecodedInstruction};
use crate::render::{check_start_line, render_listing, FormattingPolicy, StringSink};
use crate::DebuggerError;

/// Supported output formats for disassembly results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// Annotated listing (default)
    #[default]
    Text,
    /// JSON format (one document per code object)
    Json,
    /// JSON Lines format (one JSON object per instruction)
    JsonLines,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::JsonLines => write!(f, "jsonl"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "jsonl" | "jsonlines" | "json_lines" => Ok(OutputFormat::JsonLines),
            _ => Err(format!("Unknown output format: {}", s)),
        }
    }
}

impl OutputFormat {
    /// Get all available output formats
    pub fn available_formats() -> &'static [Self] {
        &[OutputFormat::Text, OutputFormat::Json, OutputFormat::JsonLines]
    }

    /// Get a formatter for this output format
    pub fn get_formatter(&self) -> Box<dyn ListingFormatter> {
        match self {
            OutputFormat::Text => Box::new(TextFormatter),
            OutputFormat::Json => Box::new(JsonFormatter),
            OutputFormat::JsonLines => Box::new(JsonLinesFormatter),
        }
    }
}

/// Formatter trait for decoded code objects
pub trait ListingFormatter {
    /// Format the instructions of `session` selected by `policy`
    fn format(&self, session: &DecodeSession<'_>, policy: &FormattingPolicy) -> Result<String, DebuggerError>;
}

/// Annotated text listing
pub struct TextFormatter;

/// Pretty-printed JSON document
pub struct JsonFormatter;

/// One JSON object per line
pub struct JsonLinesFormatter;

impl ListingFormatter for TextFormatter {
    fn format(&self, session: &DecodeSession<'_>, policy: &FormattingPolicy) -> Result<String, DebuggerError> {
        let mut sink = StringSink::default();
        render_listing(&mut sink, session, policy)?;
        Ok(sink.into_string())
    }
}

/// Instructions of `session` inside the line and offset bounds of `policy`.
///
/// Unlike the text listing this ignores the statement cap.
pub fn selected_instructions(
    session: &DecodeSession<'_>,
    policy: &FormattingPolicy,
) -> Result<Vec<DecodedInstruction>, DebuggerError> {
    check_start_line(session.code(), policy)?;
    let end_line = policy.resolved_end_line();
    let mut out = Vec::new();
    for insn in session.instructions() {
        let insn = insn?;
        if policy.end_offset.is_some_and(|end| insn.offset > end) {
            break;
        }
        let line_ok = match (insn.line_number, policy.start_line, end_line) {
            (_, None, None) => true,
            (Some(l), start, end) => start.map_or(true, |s| l >= s) && end.map_or(true, |e| l <= e),
            (None, _, _) => false,
        };
        if line_ok && insn.offset >= policy.start_offset {
            out.push(insn);
        }
    }
    Ok(out)
}
