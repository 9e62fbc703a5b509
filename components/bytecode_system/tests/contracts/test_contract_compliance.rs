//! Public surface used by the loader and the command line

use bytecode_system::format::{self, kind, section};
use bytecode_system::{assemble, AssembleError, CodeSpec, Constant, DecodeError, Opcode, Program, ProgramBuilder};

#[test]
fn test_contract_section_tags() {
    assert_eq!(section::CONSTANTS, 0x01);
    assert_eq!(section::NAME, 0x02);
    assert_eq!(section::DEBUG, 0x03);
    assert_eq!(section::ENTRY, 0xFF);
}

#[test]
fn test_contract_constant_kinds() {
    let kinds = [
        kind::NIL,
        kind::FALSE,
        kind::TRUE,
        kind::INT,
        kind::FLOAT,
        kind::STR,
        kind::TUPLE,
        kind::CODE,
    ];
    for (expected, actual) in kinds.iter().enumerate() {
        assert_eq!(*actual as usize, expected);
    }
}

#[test]
fn test_contract_header() {
    assert_eq!(&format::MAGIC, b"EMBR");
    assert_eq!(format::VERSION, 1);
    assert_eq!(format::HEADER_LEN, 8);
    assert_eq!(format::SECTION_HEADER_LEN, 5);
}

#[test]
fn test_contract_types_exist() {
    let _: Program = ProgramBuilder::new().build();
    let _ = CodeSpec {
        name: 0,
        arity: 0,
        locals: 0,
        instructions: vec![Opcode::Halt],
    };
    let _: Result<Program, AssembleError> = assemble("");
    let _ = DecodeError::new(0, "x");
}

#[test]
fn test_contract_assembler_matches_builder() {
    let assembled = assemble("const n int 42\nfunc main 0 0\n const n\n halt\nend\nentry main").unwrap();

    let mut builder = ProgramBuilder::new();
    let n = builder.add_constant(Constant::Int(42));
    let main = builder.add_function("main", 0, 0, vec![Opcode::LoadConst(n), Opcode::Halt]);
    builder.set_entry(main);

    assert_eq!(assembled.to_bytes(), builder.build().to_bytes());
}
