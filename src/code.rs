//! Compiled code objects and what can be disassembled.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{LineNumber, Offset};

/// A constant referenced by `ConstIndex` operands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Constant {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// A nested code object, identified by name.
    Code(String),
}

impl fmt::Display for Constant {
    /// Source-like representation, as shown inside listing parentheses.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::None => write!(f, "None"),
            Constant::Bool(true) => write!(f, "True"),
            Constant::Bool(false) => write!(f, "False"),
            Constant::Int(v) => write!(f, "{}", v),
            Constant::Float(v) => write!(f, "{:?}", v),
            Constant::Str(s) => {
                write!(f, "'")?;
                for c in s.chars() {
                    match c {
                        '\'' => write!(f, "\\'")?,
                        '\\' => write!(f, "\\\\")?,
                        '\n' => write!(f, "\\n")?,
                        '\t' => write!(f, "\\t")?,
                        '\r' => write!(f, "\\r")?,
                        c => write!(f, "{}", c)?,
                    }
                }
                write!(f, "'")
            }
            Constant::Code(name) => write!(f, "<code object {}>", name),
        }
    }
}

/// Offset-to-line mapping of a code object.
///
/// Entries are kept sorted by offset with at most one entry per offset; each
/// entry marks the first instruction of a statement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<(Offset, LineNumber)>", into = "Vec<(Offset, LineNumber)>")]
pub struct LineTable {
    entries: Vec<(Offset, LineNumber)>,
}

impl From<Vec<(Offset, LineNumber)>> for LineTable {
    fn from(pairs: Vec<(Offset, LineNumber)>) -> Self {
        Self::from_pairs(pairs)
    }
}

impl From<LineTable> for Vec<(Offset, LineNumber)> {
    fn from(table: LineTable) -> Self {
        table.entries
    }
}

impl LineTable {
    /// Build from `(offset, line)` pairs in any order. A later pair for the
    /// same offset replaces an earlier one.
    pub fn from_pairs(mut pairs: Vec<(Offset, LineNumber)>) -> Self {
        pairs.sort_by_key(|&(offset, _)| offset);
        let mut entries: Vec<(Offset, LineNumber)> = Vec::with_capacity(pairs.len());
        for (offset, line) in pairs {
            match entries.last_mut() {
                Some(last) if last.0 == offset => last.1 = line,
                _ => entries.push((offset, line)),
            }
        }
        Self { entries }
    }

    pub fn entries(&self) -> &[(Offset, LineNumber)] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Line of the statement starting exactly at `offset`.
    pub fn line_start(&self, offset: Offset) -> Option<LineNumber> {
        self.entries
            .binary_search_by_key(&offset, |&(o, _)| o)
            .ok()
            .map(|i| self.entries[i].1)
    }

    /// Line in effect at `offset`.
    pub fn line_at(&self, offset: Offset) -> Option<LineNumber> {
        let idx = self.entries.partition_point(|&(o, _)| o <= offset);
        idx.checked_sub(1).map(|i| self.entries[i].1)
    }

    /// Largest line number in the table.
    pub fn max_line(&self) -> Option<LineNumber> {
        self.entries.iter().map(|&(_, line)| line).max()
    }

    /// Offset span `[start, end)` covering every statement whose line lies
    /// in `first..=last`. `code_len` closes the final statement.
    pub fn offset_span(
        &self,
        first: LineNumber,
        last: LineNumber,
        code_len: usize,
    ) -> Option<(Offset, Offset)> {
        let mut span: Option<(Offset, Offset)> = None;
        for (i, &(offset, line)) in self.entries.iter().enumerate() {
            if line < first || line > last {
                continue;
            }
            let end = self
                .entries
                .get(i + 1)
                .map_or(code_len, |&(next, _)| next);
            span = Some(match span {
                None => (offset, end),
                Some((s, e)) => (s.min(offset), e.max(end)),
            });
        }
        span
    }
}

/// A compiled unit: instruction stream plus its resolution tables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodeObject {
    pub name: String,
    pub filename: String,
    pub first_line: LineNumber,
    pub code: Vec<u8>,
    pub consts: Vec<Constant>,
    pub names: Vec<String>,
    pub varnames: Vec<String>,
    pub cellvars: Vec<String>,
    pub freevars: Vec<String>,
    pub line_table: LineTable,
}

impl CodeObject {
    /// Code object with just a name and a stream; tables start empty.
    pub fn new(name: impl Into<String>, code: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            code,
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }
}

impl fmt::Display for CodeObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.filename.is_empty() {
            write!(f, "<code object {}>", self.name)
        } else {
            write!(
                f,
                "<code object {}, file \"{}\", line {}>",
                self.name, self.filename, self.first_line
            )
        }
    }
}

/// What a disassembly request targets, resolved before any decoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disassemblable {
    /// One instruction stream.
    Code(CodeObject),
    /// A named collection of streams, e.g. the methods of a class.
    Container {
        name: String,
        members: BTreeMap<String, CodeObject>,
    },
}

impl Disassemblable {
    pub fn name(&self) -> &str {
        match self {
            Disassemblable::Code(code) => &code.name,
            Disassemblable::Container { name, .. } => name,
        }
    }

    /// Every code object, members in name order.
    pub fn code_objects(&self) -> Vec<&CodeObject> {
        match self {
            Disassemblable::Code(code) => vec![code],
            Disassemblable::Container { members, .. } => members.values().collect(),
        }
    }
}
