use std::io::Write;

use rstest::rstest;
use tempfile::NamedTempFile;
use vmdbg::code::{CodeObject, Disassemblable};
use vmdbg::decoder::{DecodeRange, DecodeSession};
use vmdbg::opcodes::{OpcodeTable, RuntimeVersion};
use vmdbg::render::{disassemble, render_listing, EndLine, FormattingPolicy, HighlightStyle, StringSink};

const FUNCTION_JSON: &str = r#"{
    "name": "clamp",
    "filename": "clamp.py",
    "first_line": 1,
    "code": [124, 0, 0, 100, 0, 0, 107, 0, 0, 114, 16, 0, 100, 0, 0, 83, 124, 0, 0, 83],
    "consts": [{"type": "int", "value": 0}],
    "varnames": ["x"],
    "line_table": [[0, 2], [12, 3], [16, 4]]
}"#;

const TOY_TABLE_JSON: &str = r#"{
    "version": "toy",
    "format": "wordcode",
    "extended_arg": 144,
    "compare_ops": [],
    "opcodes": [
        {"code": 144, "name": "EXTENDED_ARG", "kind": "immediate"},
        {"code": 1, "name": "PUSH_INT", "kind": "immediate"},
        {"code": 2, "name": "RETURN", "kind": "none"}
    ]
}"#;

fn plain() -> FormattingPolicy {
    FormattingPolicy {
        highlight: HighlightStyle::Plain,
        ..FormattingPolicy::default()
    }
}

fn load_function() -> CodeObject {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(FUNCTION_JSON.as_bytes()).unwrap();
    let text = std::fs::read_to_string(file.path()).unwrap();
    serde_json::from_str(&text).unwrap()
}

#[test]
fn instructions_tile_the_stream() {
    let code = load_function();
    let session = DecodeSession::new(&code, RuntimeVersion::Classic.table());
    let insns: Vec<_> = session.instructions().collect::<Result<_, _>>().unwrap();

    assert_eq!(insns.first().map(|i| i.offset), Some(0));
    for pair in insns.windows(2) {
        assert!(pair[0].offset < pair[1].offset);
        assert_eq!(pair[0].end(), pair[1].offset);
    }
    assert_eq!(insns.last().map(|i| i.end()), Some(code.len()));

    let jump = insns.iter().find(|i| i.name == "POP_JUMP_IF_FALSE").unwrap();
    assert_eq!(jump.resolved_operand.as_ref().unwrap().to_string(), "(to 16)");
    assert!(insns.iter().find(|i| i.offset == 16).unwrap().is_jump_target);
}

#[test]
fn iterators_restart_from_the_beginning() {
    let code = load_function();
    let session = DecodeSession::new(&code, RuntimeVersion::Classic.table());
    let first: Vec<_> = session.instructions().map(|i| i.unwrap().offset).collect();
    let second: Vec<_> = session.instructions().map(|i| i.unwrap().offset).collect();
    assert_eq!(first, second);

    let line3: Vec<_> = session
        .instructions_in(DecodeRange::Lines { first: 3, last: 3 })
        .map(|i| i.unwrap().offset)
        .collect();
    assert_eq!(line3, vec![12, 15]);
}

#[test]
fn extended_arguments_fold_into_one_instruction() {
    let table = OpcodeTable::from_json(TOY_TABLE_JSON).unwrap();
    let code = CodeObject::new("toy", vec![144, 1, 144, 2, 1, 3, 2, 0]);
    let session = DecodeSession::new(&code, &table);
    let insns: Vec<_> = session.instructions().collect::<Result<_, _>>().unwrap();

    assert_eq!(insns.len(), 2);
    assert_eq!(insns[0].name, "PUSH_INT");
    assert_eq!(insns[0].offset, 0);
    assert_eq!(insns[0].size, 6);
    assert_eq!(insns[0].operand_value, Some(256 * 256 + 2 * 256 + 3));
    assert_eq!(insns[1].offset, 6);
    assert_eq!(insns[1].end(), code.len());
}

#[rstest]
#[case(2, 2, &["LOAD_FAST", "LOAD_CONST", "COMPARE_OP", "POP_JUMP_IF_FALSE"])]
#[case(3, 3, &["LOAD_CONST", "RETURN_VALUE"])]
#[case(4, 4, &["LOAD_FAST", "RETURN_VALUE"])]
fn single_line_listing(#[case] first: u32, #[case] last: u32, #[case] names: &[&str]) {
    let code = load_function();
    let session = DecodeSession::new(&code, RuntimeVersion::Classic.table());
    let policy = FormattingPolicy {
        start_line: Some(first),
        end_line: Some(EndLine::Absolute(last)),
        ..plain()
    };
    let mut sink = StringSink::default();
    render_listing(&mut sink, &session, &policy).unwrap();

    let listed: Vec<_> = sink
        .lines()
        .iter()
        .map(|l| l[13..].split_whitespace().next().unwrap_or_default().to_string())
        .collect();
    assert_eq!(listed, names);
}

#[test]
fn container_from_json() {
    let function: CodeObject = serde_json::from_str(FUNCTION_JSON).unwrap();
    let container = Disassemblable::Container {
        name: "Clamp".into(),
        members: [("clamp".to_string(), function)].into_iter().collect(),
    };
    let text = serde_json::to_string(&container).unwrap();
    let target: Disassemblable = serde_json::from_str(&text).unwrap();

    let mut sink = StringSink::default();
    disassemble(&mut sink, &target, RuntimeVersion::Classic.table(), &plain(), None).unwrap();
    let out = sink.into_string();
    assert!(out.starts_with("Disassembly of Clamp:\n"));
    assert!(out.contains("(x)"));
    assert!(out.contains("(<)"));
}
