//! Instruction decoder: turns a code object's stream into [`DecodedInstruction`]s.
//!
//! A [`DecodeSession`] is built once per code object. Building it performs a
//! pre-pass that collects every jump destination, so each decoded instruction
//! already knows whether something jumps to it. The session hands out fresh,
//! lazy iterators on demand; each one decodes from the start of the stream.

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

use crate::code::CodeObject;
use crate::opcodes::{OpcodeTable, OperandKind};
use crate::{LineNumber, Offset};

/// Errors raised while decoding a stream.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("offset {offset}: {kind} index {index} out of range (table has {len} entries)")]
    OperandOutOfRange {
        offset: Offset,
        kind: OperandKind,
        index: u64,
        len: usize,
    },

    #[error("offset {offset}: stream truncated, instruction needs {needed} bytes but {available} remain")]
    Truncated {
        offset: Offset,
        needed: usize,
        available: usize,
    },

    #[error("offset {offset}: extended operand overflows 64 bits")]
    OperandOverflow { offset: Offset },
}

impl DecodeError {
    /// Offset of the instruction that failed to decode.
    pub fn offset(&self) -> Offset {
        match self {
            DecodeError::OperandOutOfRange { offset, .. }
            | DecodeError::Truncated { offset, .. }
            | DecodeError::OperandOverflow { offset } => *offset,
        }
    }
}

/// An operand resolved against the code object's tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ResolvedOperand {
    Const(String),
    Name(String),
    Local(String),
    Compare(String),
    Free(String),
    Jump(Offset),
}

impl fmt::Display for ResolvedOperand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolvedOperand::Const(text)
            | ResolvedOperand::Name(text)
            | ResolvedOperand::Local(text)
            | ResolvedOperand::Compare(text)
            | ResolvedOperand::Free(text) => write!(f, "({})", text),
            ResolvedOperand::Jump(target) => write!(f, "(to {})", target),
        }
    }
}

/// One decoded instruction.
///
/// `offset` is where the instruction starts, including any extended-argument
/// prefixes folded into it; `size` covers those prefixes too.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecodedInstruction {
    pub offset: Offset,
    pub size: usize,
    pub opcode: u8,
    pub name: String,
    pub operand_value: Option<u64>,
    pub resolved_operand: Option<ResolvedOperand>,
    /// Line in effect, if the line table covers this offset.
    pub line_number: Option<LineNumber>,
    /// True when a line-table entry begins at this instruction.
    pub starts_line: bool,
    pub is_jump_target: bool,
    pub is_current: bool,
}

impl DecodedInstruction {
    /// Offset just past this instruction.
    pub fn end(&self) -> Offset {
        self.offset + self.size
    }
}

/// Which instructions an iterator yields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecodeRange {
    #[default]
    All,
    /// Instructions starting in `start..=end`; `end = None` runs to the end.
    Offsets { start: Offset, end: Option<Offset> },
    /// Instructions whose line lies in `first..=last`.
    Lines { first: LineNumber, last: LineNumber },
}

/// Per-code-object decoding state shared by every iterator it hands out.
#[derive(Debug)]
pub struct DecodeSession<'a> {
    code: &'a CodeObject,
    table: &'a OpcodeTable,
    free_vars: Vec<&'a str>,
    jump_targets: BTreeSet<Offset>,
    current: Option<Offset>,
}

impl<'a> DecodeSession<'a> {
    pub fn new(code: &'a CodeObject, table: &'a OpcodeTable) -> Self {
        let free_vars = code
            .cellvars
            .iter()
            .chain(code.freevars.iter())
            .map(String::as_str)
            .collect();
        let jump_targets = collect_jump_targets(code, table);
        log::debug!(
            "decode session for {}: {} bytes, {} jump targets",
            code.name,
            code.code.len(),
            jump_targets.len()
        );
        Self {
            code,
            table,
            free_vars,
            jump_targets,
            current: None,
        }
    }

    /// Mark the instruction containing `offset` as the current one.
    pub fn with_current(mut self, offset: Option<Offset>) -> Self {
        self.current = offset;
        self
    }

    pub fn code(&self) -> &'a CodeObject {
        self.code
    }

    pub fn table(&self) -> &'a OpcodeTable {
        self.table
    }

    pub fn jump_targets(&self) -> &BTreeSet<Offset> {
        &self.jump_targets
    }

    /// Decode the whole stream.
    pub fn instructions(&self) -> Instructions<'_, 'a> {
        self.instructions_in(DecodeRange::All)
    }

    /// Decode only the instructions selected by `range`.
    pub fn instructions_in(&self, range: DecodeRange) -> Instructions<'_, 'a> {
        let (start, end, lines) = match range {
            DecodeRange::All => (0, None, None),
            DecodeRange::Offsets { start, end } => (start, end, None),
            DecodeRange::Lines { first, last } => {
                match self
                    .code
                    .line_table
                    .offset_span(first, last, self.code.code.len())
                {
                    Some((start, end)) => (start, Some(end.saturating_sub(1)), Some((first, last))),
                    None => (usize::MAX, Some(0), Some((first, last))),
                }
            }
        };
        Instructions {
            session: self,
            raw: RawSteps::new(self.code, self.table),
            start,
            end,
            lines,
            line: None,
            done: false,
        }
    }

    fn resolve(
        &self,
        kind: OperandKind,
        value: u64,
        offset: Offset,
        next: Offset,
    ) -> Result<Option<ResolvedOperand>, DecodeError> {
        fn pick<T: ToString>(
            items: &[T],
            kind: OperandKind,
            value: u64,
            offset: Offset,
        ) -> Result<String, DecodeError> {
            usize::try_from(value)
                .ok()
                .and_then(|i| items.get(i))
                .map(ToString::to_string)
                .ok_or(DecodeError::OperandOutOfRange {
                    offset,
                    kind,
                    index: value,
                    len: items.len(),
                })
        }

        let code = self.code;
        let resolved = match kind {
            OperandKind::None | OperandKind::Immediate => return Ok(None),
            OperandKind::ConstIndex => ResolvedOperand::Const(pick(&code.consts, kind, value, offset)?),
            OperandKind::NameIndex => ResolvedOperand::Name(pick(&code.names, kind, value, offset)?),
            OperandKind::LocalIndex => ResolvedOperand::Local(pick(&code.varnames, kind, value, offset)?),
            OperandKind::CompareIndex => {
                ResolvedOperand::Compare(pick(self.table.compare_ops(), kind, value, offset)?)
            }
            OperandKind::FreeIndex => ResolvedOperand::Free(pick(&self.free_vars, kind, value, offset)?),
            OperandKind::JumpRelative | OperandKind::JumpAbsolute => {
                ResolvedOperand::Jump(jump_target(kind, value, next).ok_or(
                    DecodeError::OperandOverflow { offset },
                )?)
            }
        };
        Ok(Some(resolved))
    }
}

fn jump_target(kind: OperandKind, value: u64, next: Offset) -> Option<Offset> {
    let value = usize::try_from(value).ok()?;
    match kind {
        OperandKind::JumpRelative => next.checked_add(value),
        _ => Some(value),
    }
}

fn collect_jump_targets(code: &CodeObject, table: &OpcodeTable) -> BTreeSet<Offset> {
    let mut targets = BTreeSet::new();
    for step in RawSteps::new(code, table) {
        let Ok(step) = step else { break };
        let kind = table.kind(step.opcode);
        if !kind.is_jump() {
            continue;
        }
        if let Some(target) = step.value.and_then(|v| jump_target(kind, v, step.end)) {
            targets.insert(target);
        }
    }
    targets
}

/// An instruction with extended-argument prefixes already folded in.
#[derive(Debug, Clone, Copy)]
struct RawStep {
    start: Offset,
    end: Offset,
    opcode: u8,
    value: Option<u64>,
    line_start: Option<LineNumber>,
}

/// Walks the stream unit by unit, accumulating extended arguments.
struct RawSteps<'a> {
    code: &'a CodeObject,
    table: &'a OpcodeTable,
    pos: Offset,
    failed: bool,
}

impl<'a> RawSteps<'a> {
    fn new(code: &'a CodeObject, table: &'a OpcodeTable) -> Self {
        Self {
            code,
            table,
            pos: 0,
            failed: false,
        }
    }

    fn next_step(&mut self) -> Result<RawStep, DecodeError> {
        let bytes = &self.code.code;
        let format = self.table.format();
        let multiplier = format.extend_multiplier();
        let start = self.pos;
        let mut extended: u64 = 0;
        let mut line_start = None;

        loop {
            let at = self.pos;
            if let Some(line) = self.code.line_table.line_start(at) {
                line_start = Some(line);
            }
            let opcode = bytes[at];
            let kind = self.table.kind(opcode);
            let size = format.instruction_size(kind);
            let available = bytes.len() - at;
            if size > available {
                return Err(DecodeError::Truncated {
                    offset: at,
                    needed: size,
                    available,
                });
            }
            self.pos = at + size;

            if !kind.has_operand() {
                return Ok(RawStep {
                    start,
                    end: self.pos,
                    opcode,
                    value: None,
                    line_start,
                });
            }

            let unit = bytes[at + 1..at + size]
                .iter()
                .rev()
                .fold(0u64, |acc, &b| (acc << 8) | b as u64);
            let value = unit
                .checked_add(extended)
                .ok_or(DecodeError::OperandOverflow { offset: at })?;

            if opcode == self.table.extended_arg() {
                extended = value
                    .checked_mul(multiplier)
                    .ok_or(DecodeError::OperandOverflow { offset: at })?;
                if self.pos >= bytes.len() {
                    // dangling prefix at the end of the stream
                    return Ok(RawStep {
                        start,
                        end: self.pos,
                        opcode,
                        value: Some(value),
                        line_start,
                    });
                }
                continue;
            }

            return Ok(RawStep {
                start,
                end: self.pos,
                opcode,
                value: Some(value),
                line_start,
            });
        }
    }
}

impl Iterator for RawSteps<'_> {
    type Item = Result<RawStep, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.pos >= self.code.code.len() {
            return None;
        }
        let step = self.next_step();
        if step.is_err() {
            self.failed = true;
        }
        Some(step)
    }
}

/// Lazy iterator over decoded instructions.
pub struct Instructions<'s, 'a> {
    session: &'s DecodeSession<'a>,
    raw: RawSteps<'a>,
    start: Offset,
    end: Option<Offset>,
    lines: Option<(LineNumber, LineNumber)>,
    line: Option<LineNumber>,
    done: bool,
}

impl Instructions<'_, '_> {
    fn selected(&self, offset: Offset) -> bool {
        if offset < self.start {
            return false;
        }
        match self.lines {
            Some((first, last)) => self.line.is_some_and(|l| l >= first && l <= last),
            None => true,
        }
    }
}

impl Iterator for Instructions<'_, '_> {
    type Item = Result<DecodedInstruction, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            let step = match self.raw.next() {
                None => {
                    self.done = true;
                    return None;
                }
                Some(Err(e)) => {
                    self.done = true;
                    log::debug!("decode of {} failed: {}", self.session.code.name, e);
                    return Some(Err(e));
                }
                Some(Ok(step)) => step,
            };

            if self.end.is_some_and(|end| step.start > end) {
                self.done = true;
                return None;
            }
            if let Some(line) = step.line_start {
                self.line = Some(line);
            } else if self.line.is_none() {
                self.line = self.session.code.line_table.line_at(step.start);
            }
            if !self.selected(step.start) {
                continue;
            }

            let session = self.session;
            let kind = session.table.kind(step.opcode);
            let resolved = match step.value {
                Some(value) => match session.resolve(kind, value, step.start, step.end) {
                    Ok(resolved) => resolved,
                    Err(e) => {
                        self.done = true;
                        return Some(Err(e));
                    }
                },
                None => None,
            };

            let is_jump_target = session
                .jump_targets
                .range(step.start..step.end)
                .next()
                .is_some();
            let is_current = session
                .current
                .is_some_and(|c| c >= step.start && c < step.end);

            return Some(Ok(DecodedInstruction {
                offset: step.start,
                size: step.end - step.start,
                opcode: step.opcode,
                name: session.table.name(step.opcode),
                operand_value: step.value,
                resolved_operand: resolved,
                line_number: self.line,
                starts_line: step.line_start.is_some(),
                is_jump_target,
                is_current,
            }));
        }
    }
}
