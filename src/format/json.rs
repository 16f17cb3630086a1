//! JSON and JSON Lines output formatters

use serde::Serialize;
use serde_json::json;

use super::{selected_instructions, ListingFormatter};
use crate::decoder::{DecodeSession, DecodedInstruction};
use crate::render::FormattingPolicy;
use crate::DebuggerError;

/// Serializable code object listing for JSON output
#[derive(Serialize)]
struct ListingJson<'a> {
    /// Name of the code object
    name: &'a str,
    /// Source file, if known
    #[serde(skip_serializing_if = "str::is_empty")]
    filename: &'a str,
    /// Runtime version of the opcode table
    version: &'a str,
    /// Offsets something jumps to
    jump_targets: Vec<usize>,
    instructions: Vec<DecodedInstruction>,
}

impl ListingFormatter for super::JsonFormatter {
    fn format(&self, session: &DecodeSession<'_>, policy: &FormattingPolicy) -> Result<String, DebuggerError> {
        let code = session.code();
        let result = ListingJson {
            name: &code.name,
            filename: &code.filename,
            version: session.table().version(),
            jump_targets: session.jump_targets().iter().copied().collect(),
            instructions: selected_instructions(session, policy)?,
        };
        Ok(serde_json::to_string_pretty(&result)?)
    }
}

impl ListingFormatter for super::JsonLinesFormatter {
    fn format(&self, session: &DecodeSession<'_>, policy: &FormattingPolicy) -> Result<String, DebuggerError> {
        let mut output = String::new();
        let code_name = &session.code().name;

        for insn in selected_instructions(session, policy)? {
            let mut record = serde_json::to_value(&insn)?;
            if let Some(object) = record.as_object_mut() {
                object.insert("type".into(), json!("instruction"));
                object.insert("code".into(), json!(code_name));
            }
            output.push_str(&serde_json::to_string(&record)?);
            output.push('\n');
        }

        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::{CodeObject, Constant, LineTable};
    use crate::format::{JsonFormatter, JsonLinesFormatter};
    use crate::opcodes::RuntimeVersion;
    use crate::render::ListingError;
    use serde_json::Value;

    fn code() -> CodeObject {
        let mut code = CodeObject::new("h", vec![100, 0, 0, 113, 0, 0]);
        code.consts = vec![Constant::Str("hi".into())];
        code.line_table = LineTable::from_pairs(vec![(0, 5)]);
        code
    }

    #[test]
    fn test_json_document() {
        let code = code();
        let session = DecodeSession::new(&code, RuntimeVersion::Classic.table());
        let out = JsonFormatter.format(&session, &FormattingPolicy::default()).unwrap();
        let doc: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(doc["name"], "h");
        assert_eq!(doc["jump_targets"], json!([0]));
        let insns = doc["instructions"].as_array().unwrap();
        assert_eq!(insns.len(), 2);
        assert_eq!(insns[0]["name"], "LOAD_CONST");
        assert_eq!(insns[0]["is_jump_target"], true);
        assert_eq!(insns[1]["resolved_operand"], json!({"kind": "jump", "value": 0}));
    }

    #[test]
    fn test_json_lines_one_record_per_instruction() {
        let code = code();
        let session = DecodeSession::new(&code, RuntimeVersion::Classic.table());
        let out = JsonLinesFormatter.format(&session, &FormattingPolicy::default()).unwrap();
        let records: Vec<Value> = out.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r["type"] == "instruction" && r["code"] == "h"));
        assert_eq!(records[1]["offset"], 3);
    }

    #[test]
    fn test_start_line_past_end_is_an_error() {
        let code = code();
        let session = DecodeSession::new(&code, RuntimeVersion::Classic.table());
        let policy = FormattingPolicy {
            start_line: Some(6),
            ..FormattingPolicy::default()
        };
        for formatter in [&JsonFormatter as &dyn ListingFormatter, &JsonLinesFormatter] {
            match formatter.format(&session, &policy) {
                Err(DebuggerError::Listing(ListingError::StartLineOutOfRange { line, max })) => {
                    assert_eq!((line, max), (6, 5));
                }
                other => panic!("expected a bounds error, got {:?}", other.map(|_| ())),
            }
        }
    }
}
