//! Tests for Program encoding and ProgramBuilder

use bytecode_system::format::{kind, section, HEADER_LEN, MAGIC, VERSION};
use bytecode_system::{Constant, Opcode, ProgramBuilder};

fn answer_program() -> bytecode_system::Program {
    let mut builder = ProgramBuilder::new();
    let answer = builder.add_constant(Constant::Int(42));
    let main = builder.add_function("main", 0, 0, vec![Opcode::LoadConst(answer), Opcode::Halt]);
    builder.set_entry(main);
    builder.build()
}

#[test]
fn test_header_layout() {
    let bytes = answer_program().to_bytes();
    assert_eq!(&bytes[0..4], &MAGIC);
    assert_eq!(u16::from_le_bytes([bytes[4], bytes[5]]), VERSION);
    assert_eq!(u16::from_le_bytes([bytes[6], bytes[7]]), 0);
}

#[test]
fn test_entry_section_is_last() {
    let bytes = answer_program().to_bytes();
    let tail = &bytes[bytes.len() - 9..];
    assert_eq!(tail[0], section::ENTRY);
    assert_eq!(u32::from_le_bytes([tail[1], tail[2], tail[3], tail[4]]), 4);
    // int at 0, "main" at 1, code at 2
    assert_eq!(u32::from_le_bytes([tail[5], tail[6], tail[7], tail[8]]), 2);
}

#[test]
fn test_constants_section_follows_header() {
    let bytes = answer_program().to_bytes();
    assert_eq!(bytes[HEADER_LEN], section::CONSTANTS);
    let count_at = HEADER_LEN + 5;
    let count = u32::from_le_bytes(bytes[count_at..count_at + 4].try_into().unwrap());
    assert_eq!(count, 3);
    assert_eq!(bytes[count_at + 4], kind::INT);
}

#[test]
fn test_name_section_precedes_constants() {
    let program = ProgramBuilder::new().with_name("demo").build();
    let bytes = program.to_bytes();
    assert_eq!(bytes[HEADER_LEN], section::NAME);
    assert_eq!(&bytes[HEADER_LEN + 5..HEADER_LEN + 9], b"demo");
}

#[test]
fn test_intern_reuses_existing_string() {
    let mut builder = ProgramBuilder::new();
    let a = builder.add_constant(Constant::Str("print".into()));
    let b = builder.intern("print");
    assert_eq!(a, b);
    assert_eq!(builder.constant_count(), 1);
}

#[test]
fn test_locals_cover_arguments() {
    let mut builder = ProgramBuilder::new();
    let f = builder.add_function("f", 3, 1, vec![Opcode::Return]);
    let program = builder.build();
    match &program.constants[f as usize] {
        Constant::Code(code) => assert_eq!(code.locals, 3),
        other => panic!("expected code, got {:?}", other),
    }
}

#[test]
fn test_define_function_rejects_non_code() {
    let mut builder = ProgramBuilder::new();
    let n = builder.add_constant(Constant::Nil);
    assert!(!builder.define_function(n, vec![Opcode::Halt]));
}

#[test]
fn test_debug_sections_are_written() {
    let mut builder = ProgramBuilder::new();
    builder.add_function("main", 0, 0, vec![Opcode::Halt]);
    builder.add_debug(vec![1, 2, 3]);
    let with_debug = builder.build().to_bytes();
    let plain = {
        let mut b = ProgramBuilder::new();
        b.add_function("main", 0, 0, vec![Opcode::Halt]);
        b.build().to_bytes()
    };
    assert_eq!(with_debug.len(), plain.len() + 5 + 3);
}

#[test]
fn test_default_entry_is_first_code_object() {
    let mut builder = ProgramBuilder::new();
    builder.add_constant(Constant::Int(1));
    let main = builder.add_function("main", 0, 0, vec![Opcode::Halt]);
    assert_eq!(builder.build().entry, main);
}
