//! Per-runtime-version opcode tables.
//!
//! A table maps every opcode byte to an [`OperandDescriptor`] and records how
//! instructions are laid out in the stream. Two runtime generations are built
//! in; anything else can be described in JSON and loaded with
//! [`OpcodeTable::from_json`].

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// How an instruction's operand is to be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperandKind {
    /// No operand follows the opcode.
    None,
    /// Raw integer operand (counts, flags); nothing to resolve.
    Immediate,
    /// Index into the constants table.
    ConstIndex,
    /// Index into the names table.
    NameIndex,
    /// Index into the local variable names.
    LocalIndex,
    /// Jump offset relative to the next instruction.
    JumpRelative,
    /// Jump to an absolute offset.
    JumpAbsolute,
    /// Index into the comparison operator names.
    CompareIndex,
    /// Index into cell variables followed by free variables.
    FreeIndex,
}

impl OperandKind {
    /// True when an operand unit follows the opcode.
    pub fn has_operand(self) -> bool {
        self != OperandKind::None
    }

    /// True for both jump flavours.
    pub fn is_jump(self) -> bool {
        matches!(self, OperandKind::JumpRelative | OperandKind::JumpAbsolute)
    }
}

impl fmt::Display for OperandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            OperandKind::None => "none",
            OperandKind::Immediate => "immediate",
            OperandKind::ConstIndex => "constant",
            OperandKind::NameIndex => "name",
            OperandKind::LocalIndex => "local",
            OperandKind::JumpRelative => "relative jump",
            OperandKind::JumpAbsolute => "absolute jump",
            OperandKind::CompareIndex => "compare operator",
            OperandKind::FreeIndex => "free variable",
        };
        write!(f, "{}", text)
    }
}

/// One opcode's name and operand interpretation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperandDescriptor {
    pub code: u8,
    pub name: String,
    pub kind: OperandKind,
}

/// Byte layout of an instruction stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstructionFormat {
    /// One opcode byte, followed by a little-endian operand of
    /// `operand_width` bytes when the opcode takes one.
    Variable { operand_width: u8 },
    /// Every instruction is an opcode byte plus one operand byte.
    Wordcode,
}

impl InstructionFormat {
    /// Width in bytes of the operand unit.
    pub fn operand_width(self) -> usize {
        match self {
            InstructionFormat::Variable { operand_width } => operand_width as usize,
            InstructionFormat::Wordcode => 1,
        }
    }

    /// Bytes occupied by one instruction of the given kind.
    pub fn instruction_size(self, kind: OperandKind) -> usize {
        match self {
            InstructionFormat::Variable { .. } if kind.has_operand() => 1 + self.operand_width(),
            InstructionFormat::Variable { .. } => 1,
            InstructionFormat::Wordcode => 2,
        }
    }

    /// Factor applied to a pending extended argument before it is added to
    /// the next operand.
    pub fn extend_multiplier(self) -> u64 {
        1u64 << (8 * self.operand_width())
    }
}

/// Errors raised while building an opcode table.
#[derive(Debug, thiserror::Error)]
pub enum OpcodeTableError {
    #[error("invalid opcode table JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("opcode {0} is described twice")]
    DuplicateCode(u8),

    #[error("extended-argument opcode {0} must be mapped to an operand-carrying descriptor")]
    BadExtendedArg(u8),

    #[error("operand width {0} is not supported (1 to 4 bytes)")]
    BadOperandWidth(u8),
}

/// Serialized form of an [`OpcodeTable`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpcodeTableDef {
    pub version: String,
    pub format: InstructionFormat,
    pub extended_arg: u8,
    pub compare_ops: Vec<String>,
    pub opcodes: Vec<OperandDescriptor>,
}

/// Opcode metadata for one runtime version.
#[derive(Debug, Clone)]
pub struct OpcodeTable {
    version: String,
    format: InstructionFormat,
    extended_arg: u8,
    compare_ops: Vec<String>,
    slots: Vec<Option<OperandDescriptor>>,
}

impl OpcodeTable {
    /// Build and validate a table.
    pub fn from_def(def: OpcodeTableDef) -> Result<Self, OpcodeTableError> {
        if let InstructionFormat::Variable { operand_width } = def.format {
            if !(1..=4).contains(&operand_width) {
                return Err(OpcodeTableError::BadOperandWidth(operand_width));
            }
        }

        let mut slots: Vec<Option<OperandDescriptor>> = vec![None; 256];
        for desc in def.opcodes {
            let slot = &mut slots[desc.code as usize];
            if slot.is_some() {
                return Err(OpcodeTableError::DuplicateCode(desc.code));
            }
            *slot = Some(desc);
        }

        match &slots[def.extended_arg as usize] {
            Some(desc) if desc.kind.has_operand() => {}
            _ => return Err(OpcodeTableError::BadExtendedArg(def.extended_arg)),
        }

        Ok(Self {
            version: def.version,
            format: def.format,
            extended_arg: def.extended_arg,
            compare_ops: def.compare_ops,
            slots,
        })
    }

    /// Parse a table from its JSON description.
    pub fn from_json(text: &str) -> Result<Self, OpcodeTableError> {
        let def: OpcodeTableDef = serde_json::from_str(text)?;
        Self::from_def(def)
    }

    /// Back to the serializable description.
    pub fn to_def(&self) -> OpcodeTableDef {
        OpcodeTableDef {
            version: self.version.clone(),
            format: self.format,
            extended_arg: self.extended_arg,
            compare_ops: self.compare_ops.clone(),
            opcodes: self.slots.iter().flatten().cloned().collect(),
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn format(&self) -> InstructionFormat {
        self.format
    }

    /// Opcode that widens the operand of the instruction after it.
    pub fn extended_arg(&self) -> u8 {
        self.extended_arg
    }

    pub fn compare_ops(&self) -> &[String] {
        &self.compare_ops
    }

    /// Descriptor for `code`, if the runtime defines it.
    pub fn get(&self, code: u8) -> Option<&OperandDescriptor> {
        self.slots[code as usize].as_ref()
    }

    /// Operand kind of `code`; unmapped opcodes carry no operand.
    pub fn kind(&self, code: u8) -> OperandKind {
        self.get(code).map_or(OperandKind::None, |d| d.kind)
    }

    /// Display name of `code`; unmapped opcodes render as `<N>`.
    pub fn name(&self, code: u8) -> String {
        match self.get(code) {
            Some(desc) => desc.name.clone(),
            None => format!("<{}>", code),
        }
    }

    /// Look an opcode up by name.
    pub fn code_of(&self, name: &str) -> Option<u8> {
        self.slots.iter().flatten().find(|d| d.name == name).map(|d| d.code)
    }

    /// Number of mapped opcodes.
    pub fn len(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Built-in runtime generations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeVersion {
    /// Variable-width stream with 16-bit operands.
    #[default]
    Classic,
    /// Fixed two-byte instructions with 8-bit operands.
    Wordcode,
}

impl fmt::Display for RuntimeVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeVersion::Classic => write!(f, "classic"),
            RuntimeVersion::Wordcode => write!(f, "wordcode"),
        }
    }
}

impl FromStr for RuntimeVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "classic" => Ok(RuntimeVersion::Classic),
            "wordcode" => Ok(RuntimeVersion::Wordcode),
            _ => Err(format!("Unknown runtime version: {}", s)),
        }
    }
}

impl RuntimeVersion {
    /// The shared, lazily built table for this version.
    pub fn table(self) -> &'static OpcodeTable {
        static CLASSIC: OnceLock<OpcodeTable> = OnceLock::new();
        static WORDCODE: OnceLock<OpcodeTable> = OnceLock::new();
        match self {
            RuntimeVersion::Classic => CLASSIC.get_or_init(|| builtin(self, CLASSIC_OPS)),
            RuntimeVersion::Wordcode => WORDCODE.get_or_init(|| builtin(self, WORDCODE_OPS)),
        }
    }
}

fn builtin(version: RuntimeVersion, ops: &[(u8, &str, OperandKind)]) -> OpcodeTable {
    let (format, extended_arg) = match version {
        RuntimeVersion::Classic => (InstructionFormat::Variable { operand_width: 2 }, 145),
        RuntimeVersion::Wordcode => (InstructionFormat::Wordcode, 144),
    };
    let mut slots: Vec<Option<OperandDescriptor>> = vec![None; 256];
    for &(code, name, kind) in ops {
        slots[code as usize] = Some(OperandDescriptor {
            code,
            name: name.to_string(),
            kind,
        });
    }
    OpcodeTable {
        version: version.to_string(),
        format,
        extended_arg,
        compare_ops: COMPARE_OPS.iter().map(|s| s.to_string()).collect(),
        slots,
    }
}

const COMPARE_OPS: &[&str] = &[
    "<", "<=", "==", "!=", ">", ">=", "in", "not in", "is", "is not", "exception match", "BAD",
];

use OperandKind as K;

#[rustfmt::skip]
const CLASSIC_OPS: &[(u8, &str, OperandKind)] = &[
    (0, "STOP_CODE", K::None),
    (1, "POP_TOP", K::None),
    (2, "ROT_TWO", K::None),
    (3, "ROT_THREE", K::None),
    (4, "DUP_TOP", K::None),
    (5, "ROT_FOUR", K::None),
    (9, "NOP", K::None),
    (10, "UNARY_POSITIVE", K::None),
    (11, "UNARY_NEGATIVE", K::None),
    (12, "UNARY_NOT", K::None),
    (13, "UNARY_CONVERT", K::None),
    (15, "UNARY_INVERT", K::None),
    (19, "BINARY_POWER", K::None),
    (20, "BINARY_MULTIPLY", K::None),
    (21, "BINARY_DIVIDE", K::None),
    (22, "BINARY_MODULO", K::None),
    (23, "BINARY_ADD", K::None),
    (24, "BINARY_SUBTRACT", K::None),
    (25, "BINARY_SUBSCR", K::None),
    (26, "BINARY_FLOOR_DIVIDE", K::None),
    (27, "BINARY_TRUE_DIVIDE", K::None),
    (28, "INPLACE_FLOOR_DIVIDE", K::None),
    (29, "INPLACE_TRUE_DIVIDE", K::None),
    (30, "SLICE+0", K::None),
    (31, "SLICE+1", K::None),
    (32, "SLICE+2", K::None),
    (33, "SLICE+3", K::None),
    (40, "STORE_SLICE+0", K::None),
    (41, "STORE_SLICE+1", K::None),
    (42, "STORE_SLICE+2", K::None),
    (43, "STORE_SLICE+3", K::None),
    (50, "DELETE_SLICE+0", K::None),
    (51, "DELETE_SLICE+1", K::None),
    (52, "DELETE_SLICE+2", K::None),
    (53, "DELETE_SLICE+3", K::None),
    (54, "STORE_MAP", K::None),
    (55, "INPLACE_ADD", K::None),
    (56, "INPLACE_SUBTRACT", K::None),
    (57, "INPLACE_MULTIPLY", K::None),
    (58, "INPLACE_DIVIDE", K::None),
    (59, "INPLACE_MODULO", K::None),
    (60, "STORE_SUBSCR", K::None),
    (61, "DELETE_SUBSCR", K::None),
    (62, "BINARY_LSHIFT", K::None),
    (63, "BINARY_RSHIFT", K::None),
    (64, "BINARY_AND", K::None),
    (65, "BINARY_XOR", K::None),
    (66, "BINARY_OR", K::None),
    (67, "INPLACE_POWER", K::None),
    (68, "GET_ITER", K::None),
    (70, "PRINT_EXPR", K::None),
    (71, "PRINT_ITEM", K::None),
    (72, "PRINT_NEWLINE", K::None),
    (73, "PRINT_ITEM_TO", K::None),
    (74, "PRINT_NEWLINE_TO", K::None),
    (75, "INPLACE_LSHIFT", K::None),
    (76, "INPLACE_RSHIFT", K::None),
    (77, "INPLACE_AND", K::None),
    (78, "INPLACE_XOR", K::None),
    (79, "INPLACE_OR", K::None),
    (80, "BREAK_LOOP", K::None),
    (81, "WITH_CLEANUP", K::None),
    (82, "LOAD_LOCALS", K::None),
    (83, "RETURN_VALUE", K::None),
    (84, "IMPORT_STAR", K::None),
    (85, "EXEC_STMT", K::None),
    (86, "YIELD_VALUE", K::None),
    (87, "POP_BLOCK", K::None),
    (88, "END_FINALLY", K::None),
    (89, "BUILD_CLASS", K::None),
    (90, "STORE_NAME", K::NameIndex),
    (91, "DELETE_NAME", K::NameIndex),
    (92, "UNPACK_SEQUENCE", K::Immediate),
    (93, "FOR_ITER", K::JumpRelative),
    (94, "LIST_APPEND", K::Immediate),
    (95, "STORE_ATTR", K::NameIndex),
    (96, "DELETE_ATTR", K::NameIndex),
    (97, "STORE_GLOBAL", K::NameIndex),
    (98, "DELETE_GLOBAL", K::NameIndex),
    (99, "DUP_TOPX", K::Immediate),
    (100, "LOAD_CONST", K::ConstIndex),
    (101, "LOAD_NAME", K::NameIndex),
    (102, "BUILD_TUPLE", K::Immediate),
    (103, "BUILD_LIST", K::Immediate),
    (104, "BUILD_SET", K::Immediate),
    (105, "BUILD_MAP", K::Immediate),
    (106, "LOAD_ATTR", K::NameIndex),
    (107, "COMPARE_OP", K::CompareIndex),
    (108, "IMPORT_NAME", K::NameIndex),
    (109, "IMPORT_FROM", K::NameIndex),
    (110, "JUMP_FORWARD", K::JumpRelative),
    (111, "JUMP_IF_FALSE_OR_POP", K::JumpAbsolute),
    (112, "JUMP_IF_TRUE_OR_POP", K::JumpAbsolute),
    (113, "JUMP_ABSOLUTE", K::JumpAbsolute),
    (114, "POP_JUMP_IF_FALSE", K::JumpAbsolute),
    (115, "POP_JUMP_IF_TRUE", K::JumpAbsolute),
    (116, "LOAD_GLOBAL", K::NameIndex),
    (119, "CONTINUE_LOOP", K::JumpAbsolute),
    (120, "SETUP_LOOP", K::JumpRelative),
    (121, "SETUP_EXCEPT", K::JumpRelative),
    (122, "SETUP_FINALLY", K::JumpRelative),
    (124, "LOAD_FAST", K::LocalIndex),
    (125, "STORE_FAST", K::LocalIndex),
    (126, "DELETE_FAST", K::LocalIndex),
    (130, "RAISE_VARARGS", K::Immediate),
    (131, "CALL_FUNCTION", K::Immediate),
    (132, "MAKE_FUNCTION", K::Immediate),
    (133, "BUILD_SLICE", K::Immediate),
    (134, "MAKE_CLOSURE", K::Immediate),
    (135, "LOAD_CLOSURE", K::FreeIndex),
    (136, "LOAD_DEREF", K::FreeIndex),
    (137, "STORE_DEREF", K::FreeIndex),
    (140, "CALL_FUNCTION_VAR", K::Immediate),
    (141, "CALL_FUNCTION_KW", K::Immediate),
    (142, "CALL_FUNCTION_VAR_KW", K::Immediate),
    (143, "SETUP_WITH", K::JumpRelative),
    (145, "EXTENDED_ARG", K::Immediate),
    (146, "SET_ADD", K::Immediate),
    (147, "MAP_ADD", K::Immediate),
];

#[rustfmt::skip]
const WORDCODE_OPS: &[(u8, &str, OperandKind)] = &[
    (1, "POP_TOP", K::None),
    (2, "ROT_TWO", K::None),
    (3, "ROT_THREE", K::None),
    (4, "DUP_TOP", K::None),
    (9, "NOP", K::None),
    (10, "UNARY_POSITIVE", K::None),
    (11, "UNARY_NEGATIVE", K::None),
    (12, "UNARY_NOT", K::None),
    (15, "UNARY_INVERT", K::None),
    (19, "BINARY_POWER", K::None),
    (20, "BINARY_MULTIPLY", K::None),
    (22, "BINARY_MODULO", K::None),
    (23, "BINARY_ADD", K::None),
    (24, "BINARY_SUBTRACT", K::None),
    (25, "BINARY_SUBSCR", K::None),
    (26, "BINARY_FLOOR_DIVIDE", K::None),
    (27, "BINARY_TRUE_DIVIDE", K::None),
    (55, "INPLACE_ADD", K::None),
    (56, "INPLACE_SUBTRACT", K::None),
    (57, "INPLACE_MULTIPLY", K::None),
    (60, "STORE_SUBSCR", K::None),
    (61, "DELETE_SUBSCR", K::None),
    (68, "GET_ITER", K::None),
    (70, "PRINT_EXPR", K::None),
    (83, "RETURN_VALUE", K::None),
    (84, "IMPORT_STAR", K::None),
    (86, "YIELD_VALUE", K::None),
    (87, "POP_BLOCK", K::None),
    (88, "END_FINALLY", K::None),
    (89, "POP_EXCEPT", K::None),
    (90, "STORE_NAME", K::NameIndex),
    (91, "DELETE_NAME", K::NameIndex),
    (92, "UNPACK_SEQUENCE", K::Immediate),
    (93, "FOR_ITER", K::JumpRelative),
    (95, "STORE_ATTR", K::NameIndex),
    (96, "DELETE_ATTR", K::NameIndex),
    (97, "STORE_GLOBAL", K::NameIndex),
    (98, "DELETE_GLOBAL", K::NameIndex),
    (100, "LOAD_CONST", K::ConstIndex),
    (101, "LOAD_NAME", K::NameIndex),
    (102, "BUILD_TUPLE", K::Immediate),
    (103, "BUILD_LIST", K::Immediate),
    (104, "BUILD_SET", K::Immediate),
    (105, "BUILD_MAP", K::Immediate),
    (106, "LOAD_ATTR", K::NameIndex),
    (107, "COMPARE_OP", K::CompareIndex),
    (108, "IMPORT_NAME", K::NameIndex),
    (109, "IMPORT_FROM", K::NameIndex),
    (110, "JUMP_FORWARD", K::JumpRelative),
    (111, "JUMP_IF_FALSE_OR_POP", K::JumpAbsolute),
    (112, "JUMP_IF_TRUE_OR_POP", K::JumpAbsolute),
    (113, "JUMP_ABSOLUTE", K::JumpAbsolute),
    (114, "POP_JUMP_IF_FALSE", K::JumpAbsolute),
    (115, "POP_JUMP_IF_TRUE", K::JumpAbsolute),
    (116, "LOAD_GLOBAL", K::NameIndex),
    (120, "SETUP_LOOP", K::JumpRelative),
    (121, "SETUP_EXCEPT", K::JumpRelative),
    (122, "SETUP_FINALLY", K::JumpRelative),
    (124, "LOAD_FAST", K::LocalIndex),
    (125, "STORE_FAST", K::LocalIndex),
    (126, "DELETE_FAST", K::LocalIndex),
    (130, "RAISE_VARARGS", K::Immediate),
    (131, "CALL_FUNCTION", K::Immediate),
    (132, "MAKE_FUNCTION", K::Immediate),
    (133, "BUILD_SLICE", K::Immediate),
    (135, "LOAD_CLOSURE", K::FreeIndex),
    (136, "LOAD_DEREF", K::FreeIndex),
    (137, "STORE_DEREF", K::FreeIndex),
    (141, "CALL_FUNCTION_KW", K::Immediate),
    (143, "SETUP_WITH", K::JumpRelative),
    (144, "EXTENDED_ARG", K::Immediate),
    (145, "LIST_APPEND", K::Immediate),
    (146, "SET_ADD", K::Immediate),
    (147, "MAP_ADD", K::Immediate),
];
