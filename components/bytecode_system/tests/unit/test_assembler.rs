//! Tests for the text assembler

use bytecode_system::{assemble, Constant, Opcode};

const COUNTDOWN: &str = r#"
.name "countdown"
const limit int 3

func main 0 1
    const limit
    store 0
loop:
    load 0
    jump_if_false done
    load 0
    intrinsic print 1
    pop
    load 0
    push 1
    sub
    store 0
    jump loop
done:
    nil
    halt
end

entry main
"#;

fn entry_code(program: &bytecode_system::Program) -> &bytecode_system::CodeSpec {
    match &program.constants[program.entry as usize] {
        Constant::Code(code) => code,
        other => panic!("entry is not code: {:?}", other),
    }
}

#[test]
fn test_countdown_assembles() {
    let program = assemble(COUNTDOWN).unwrap();
    assert_eq!(program.name.as_deref(), Some("countdown"));
    let code = entry_code(&program);
    assert_eq!(code.locals, 1);
    assert_eq!(code.instructions[3], Opcode::JumpIfFalse(12));
    assert_eq!(code.instructions[11], Opcode::Jump(2));
    match code.instructions[5] {
        Opcode::CallIntrinsic { name, argc } => {
            assert_eq!(program.string_at(name), Some("print"));
            assert_eq!(argc, 1);
        }
        other => panic!("expected intrinsic call, got {}", other),
    }
}

#[test]
fn test_globals_are_interned_once() {
    let src = "func main 0 0\n push 1\n store_global x\n load_global x\n halt\nend\nentry main";
    let program = assemble(src).unwrap();
    let code = entry_code(&program);
    assert_eq!(code.instructions[1].constant_operand(), code.instructions[2].constant_operand());
}

#[test]
fn test_string_escapes() {
    let program = assemble("const s str \"a\\nb\"\nfunc main 0 0\n halt\nend\nentry main").unwrap();
    assert_eq!(program.constants[0], Constant::Str("a\nb".into()));
}

#[test]
fn test_tuple_of_earlier_constants() {
    let src = "const a int 1\nconst b float 2.5\nconst t tuple a b\nfunc main 0 0\n const t\n halt\nend\nentry main";
    let program = assemble(src).unwrap();
    assert_eq!(program.constants[2], Constant::Tuple(vec![0, 1]));
}

#[test]
fn test_function_as_constant_value() {
    let src = "func main 0 0\n const f\n call_indirect 0\n halt\nend\nfunc f 0 0\n push 7\n ret\nend\nentry main";
    let program = assemble(src).unwrap();
    let code = entry_code(&program);
    let Opcode::LoadConst(f) = code.instructions[0] else {
        panic!("expected const");
    };
    assert!(matches!(program.constants[f as usize], Constant::Code(_)));
}

#[test]
fn test_duplicate_symbol() {
    let err = assemble("const a int 1\nconst a int 2\n").unwrap_err();
    assert_eq!(err.line, 2);
}

#[test]
fn test_unknown_label() {
    let err = assemble("func main 0 0\n jump nowhere\nend\nentry main").unwrap_err();
    assert_eq!(err.line, 2);
    assert!(err.message.contains("nowhere"));
}

#[test]
fn test_bad_number() {
    let err = assemble("func main 0 0\n push lots\nend\nentry main").unwrap_err();
    assert!(err.to_string().starts_with("line 2:"));
}

#[test]
fn test_unknown_entry() {
    let err = assemble("func main 0 0\n halt\nend\nentry start").unwrap_err();
    assert_eq!(err.line, 4);
}
