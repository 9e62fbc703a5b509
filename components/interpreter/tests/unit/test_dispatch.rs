//! Opcode semantics

use bytecode_system::{Opcode, ProgramBuilder};
use core_types::{ErrorKind, Fault, Value, VmError};
use interpreter::{ExecutionState, InterpreterConfig, RuntimeConfig};

use super::{boot, main_with, run, run_with};

fn fault_of(error: &VmError) -> Fault {
    assert_eq!(error.kind(), ErrorKind::InvalidOperation, "{}", error);
    error.as_fault().cloned().unwrap()
}

#[test]
fn test_push_42_halt() {
    let program = bytecode_system::assemble(&main_with(0, "push 42\nhalt")).unwrap();
    let (mut universe, _) = boot(&program, RuntimeConfig::default());

    assert_eq!(universe.run().unwrap(), Value::Int(42));
    let interpreter = universe.interpreter().unwrap();
    assert_eq!(
        interpreter.transitions(),
        &[
            ExecutionState::Ready,
            ExecutionState::Running,
            ExecutionState::Halted
        ]
    );
    assert_eq!(interpreter.stack(), &[Value::Int(42)]);
}

#[test]
fn test_return_from_entry_halts() {
    assert_eq!(run(&main_with(0, "push 9\nret")).unwrap(), Value::Int(9));
}

#[test]
fn test_halt_on_empty_stack_is_nil() {
    assert_eq!(run(&main_with(0, "halt")).unwrap(), Value::Nil);
}

#[test]
fn test_halt_result_ignores_locals() {
    assert_eq!(run(&main_with(1, "push 7\nstore 0\nhalt")).unwrap(), Value::Nil);
    assert_eq!(
        run(&main_with(1, "push 7\nstore 0\npush 8\nhalt")).unwrap(),
        Value::Int(8)
    );

    let source = "
        func leaf 0 1
            push 5
            store 0
            halt
        end
        func main 0 0
            push 1
            call leaf 0
        end
        entry main";
    assert_eq!(run(source).unwrap(), Value::Nil);
}

#[test]
fn test_constant_index_equal_to_pool_size() {
    let mut builder = ProgramBuilder::new();
    let main = builder.declare_function("main", 0, 0);
    let pool_size = builder.constant_count() as u32;
    builder.define_function(main, vec![Opcode::LoadConst(pool_size), Opcode::Halt]);
    builder.set_entry(main);
    let (mut universe, _) = boot(&builder.build(), RuntimeConfig::default());

    let error = universe.run().unwrap_err();
    assert_eq!(
        fault_of(&error),
        Fault::ConstantIndexOutOfBounds {
            index: pool_size,
            pool_size: pool_size as usize,
        }
    );
    let location = error.location().unwrap();
    assert_eq!(location.function, "main");
    assert_eq!(location.ip, 0);
    assert_eq!(universe.state(), Some(ExecutionState::Faulted));
}

#[test]
fn test_primitive_constants_are_unboxed() {
    let source = "const answer int 40\nconst half float 0.5\n".to_string()
        + &main_with(0, "const answer\npush 2\nadd\nconst half\nadd\nhalt");
    assert_eq!(run(&source).unwrap(), Value::Float(42.5));
}

#[test]
fn test_integer_arithmetic() {
    assert_eq!(run(&main_with(0, "push 7\npush 2\ndiv\nhalt")).unwrap(), Value::Int(3));
    assert_eq!(run(&main_with(0, "push -7\npush 3\nrem\nhalt")).unwrap(), Value::Int(-1));
    assert_eq!(run(&main_with(0, "push 6\npush 7\nmul\nneg\nhalt")).unwrap(), Value::Int(-42));
    assert_eq!(run(&main_with(0, "push 12\npush 10\nbxor\nhalt")).unwrap(), Value::Int(6));
    assert_eq!(run(&main_with(0, "push 1\npush 4\nshl\nhalt")).unwrap(), Value::Int(16));
    assert_eq!(run(&main_with(0, "push -16\npush 2\nshr\nhalt")).unwrap(), Value::Int(-4));
}

#[test]
fn test_division_by_zero_location() {
    let error = run(&main_with(0, "push 1\npush 0\ndiv\nhalt")).unwrap_err();
    assert_eq!(fault_of(&error), Fault::DivisionByZero);
    assert_eq!(error.location().unwrap().ip, 2);
    assert_eq!(error.location().unwrap().depth, 1);
}

#[test]
fn test_float_division_by_zero_is_infinite() {
    let source = "const one float 1.0\n".to_string() + &main_with(0, "const one\npush 0\ndiv\nhalt");
    assert_eq!(run(&source).unwrap(), Value::Float(f64::INFINITY));
}

#[test]
fn test_overflow_faults() {
    let source = "const max int 9223372036854775807\n".to_string()
        + &main_with(0, "const max\npush 1\nadd\nhalt");
    assert_eq!(
        fault_of(&run(&source).unwrap_err()),
        Fault::ArithmeticOverflow { op: "add" }
    );

    let error = run(&main_with(0, "push 1\npush 64\nshl\nhalt")).unwrap_err();
    assert_eq!(fault_of(&error), Fault::ArithmeticOverflow { op: "shl" });
}

#[test]
fn test_shl_rejects_lost_bits() {
    let error = run(&main_with(0, "push 3\npush 63\nshl\nhalt")).unwrap_err();
    assert_eq!(fault_of(&error), Fault::ArithmeticOverflow { op: "shl" });

    assert_eq!(
        run(&main_with(0, "push 1\npush 62\nshl\nhalt")).unwrap(),
        Value::Int(1 << 62)
    );
    assert_eq!(
        run(&main_with(0, "push -1\npush 63\nshl\nhalt")).unwrap(),
        Value::Int(i64::MIN)
    );
    assert_eq!(
        run(&main_with(0, "push -8\npush 2\nshr\nhalt")).unwrap(),
        Value::Int(-2)
    );
}

#[test]
fn test_type_mismatch() {
    let error = run(&main_with(0, "push 1\ntrue\nadd\nhalt")).unwrap_err();
    assert_eq!(
        fault_of(&error),
        Fault::TypeMismatch {
            expected: "number",
            found: "bool".to_string(),
        }
    );
}

#[test]
fn test_string_concat_and_equality() {
    let source = "const a str \"foo\"\nconst b str \"bar\"\nconst c str \"foobar\"\n".to_string()
        + &main_with(0, "const a\nconst b\nadd\nconst c\neq\nhalt");
    assert_eq!(run(&source).unwrap(), Value::Bool(true));
}

#[test]
fn test_comparisons() {
    assert_eq!(run(&main_with(0, "push 1\npush 2\nlt\nhalt")).unwrap(), Value::Bool(true));
    assert_eq!(run(&main_with(0, "push 2\npush 2\nge\nhalt")).unwrap(), Value::Bool(true));
    let source = "const one float 1.0\n".to_string() + &main_with(0, "push 1\nconst one\neq\nhalt");
    assert_eq!(run(&source).unwrap(), Value::Bool(true));
    let source = "const a str \"apple\"\nconst b str \"banana\"\n".to_string()
        + &main_with(0, "const a\nconst b\ngt\nhalt");
    assert_eq!(run(&source).unwrap(), Value::Bool(false));
}

#[test]
fn test_distinct_tuples_are_not_equal() {
    let body = "push 1\ntuple 1\npush 1\ntuple 1\neq\nhalt";
    assert_eq!(run(&main_with(0, body)).unwrap(), Value::Bool(false));
    let body = "push 1\ntuple 1\ndup\neq\nhalt";
    assert_eq!(run(&main_with(0, body)).unwrap(), Value::Bool(true));
}

#[test]
fn test_locals_start_nil() {
    let body = "push 5\nstore 0\nload 1\nhalt";
    assert_eq!(run(&main_with(2, body)).unwrap(), Value::Nil);
    let body = "push 5\nstore 0\nload 0\nhalt";
    assert_eq!(run(&main_with(2, body)).unwrap(), Value::Int(5));
}

#[test]
fn test_local_index_out_of_bounds() {
    let error = run(&main_with(1, "load 3\nhalt")).unwrap_err();
    assert_eq!(
        fault_of(&error),
        Fault::LocalIndexOutOfBounds {
            index: 3,
            locals: 1
        }
    );
}

#[test]
fn test_pop_cannot_reach_locals() {
    let error = run(&main_with(1, "pop\nhalt")).unwrap_err();
    assert_eq!(fault_of(&error), Fault::StackUnderflow);
}

#[test]
fn test_running_off_the_end() {
    let error = run(&main_with(0, "push 1")).unwrap_err();
    assert_eq!(
        fault_of(&error),
        Fault::InstructionPointerOutOfBounds { ip: 1, len: 1 }
    );
    assert_eq!(error.location().unwrap().ip, 1);
}

#[test]
fn test_countdown_loop() {
    let source = "
        func main 0 2
            push 10
            store 0
            push 0
            store 1
        loop:
            load 0
            jump_if_false done
            load 1
            load 0
            add
            store 1
            load 0
            push 1
            sub
            store 0
            jump loop
        done:
            load 1
            halt
        end
        entry main";
    assert_eq!(run(source).unwrap(), Value::Int(55));
}

#[test]
fn test_call_and_return() {
    let source = "
        func main 0 0
            push 2
            push 3
            call add 2
            halt
        end
        func add 2 2
            load 0
            load 1
            add
            ret
        end
        entry main";
    let program = bytecode_system::assemble(source).unwrap();
    let (mut universe, _) = boot(&program, RuntimeConfig::default());
    assert_eq!(universe.run().unwrap(), Value::Int(5));
    assert_eq!(universe.interpreter().unwrap().stack(), &[Value::Int(5)]);
}

#[test]
fn test_recursive_factorial() {
    let source = "
        func fact 1 1
            load 0
            push 2
            lt
            jump_if_false recurse
            push 1
            ret
        recurse:
            load 0
            load 0
            push 1
            sub
            call fact 1
            mul
            ret
        end
        func main 0 0
            push 10
            call fact 1
            halt
        end
        entry main";
    assert_eq!(run(source).unwrap(), Value::Int(3_628_800));
}

#[test]
fn test_arity_mismatch() {
    let source = "
        func id 1 1
            load 0
            ret
        end
        func main 0 0
            call id 0
            halt
        end
        entry main";
    assert_eq!(
        fault_of(&run(source).unwrap_err()),
        Fault::ArityMismatch {
            callee: "id".to_string(),
            expected: 1,
            found: 0,
        }
    );
}

#[test]
fn test_call_depth_limit() {
    let source = "
        func forever 0 0
            call forever 0
            ret
        end
        entry forever";
    let config = RuntimeConfig::default()
        .with_interpreter(InterpreterConfig::default().with_max_call_depth(64));
    let error = run_with(source, config).unwrap_err();
    assert_eq!(fault_of(&error), Fault::CallDepthExceeded { limit: 64 });
    assert_eq!(error.location().unwrap().depth, 64);
}

#[test]
fn test_operand_stack_limit() {
    let body = "top:\npush 1\njump top";
    let config = RuntimeConfig::default()
        .with_interpreter(InterpreterConfig::default().with_max_operand_stack(16));
    let error = run_with(&main_with(0, body), config).unwrap_err();
    assert_eq!(fault_of(&error), Fault::StackOverflow { limit: 16 });
}

#[test]
fn test_call_indirect() {
    let source = "
        func add 2 2
            load 0
            load 1
            add
            ret
        end
        func main 0 0
            const add
            push 2
            push 3
            call_indirect 2
            halt
        end
        entry main";
    let program = bytecode_system::assemble(source).unwrap();
    let (mut universe, _) = boot(&program, RuntimeConfig::default());
    assert_eq!(universe.run().unwrap(), Value::Int(5));
    assert_eq!(universe.interpreter().unwrap().stack(), &[Value::Int(5)]);
}

#[test]
fn test_call_indirect_on_non_code() {
    let error = run(&main_with(0, "push 1\ncall_indirect 0\nhalt")).unwrap_err();
    assert_eq!(
        fault_of(&error),
        Fault::TypeMismatch {
            expected: "code",
            found: "int".to_string(),
        }
    );
}

#[test]
fn test_records_are_mutable() {
    let body = "push 1\npush 2\nrecord 2\ndup\npush 10\nset_field 0\nget_field 0\nhalt";
    assert_eq!(run(&main_with(0, body)).unwrap(), Value::Int(10));
}

#[test]
fn test_tuples_are_immutable() {
    let body = "push 1\ntuple 1\npush 10\nset_field 0\nhalt";
    assert_eq!(
        fault_of(&run(&main_with(0, body)).unwrap_err()),
        Fault::TypeMismatch {
            expected: "record",
            found: "tuple".to_string(),
        }
    );
}

#[test]
fn test_field_out_of_range() {
    let body = "push 1\ntuple 1\nget_field 1\nhalt";
    assert_eq!(
        fault_of(&run(&main_with(0, body)).unwrap_err()),
        Fault::IndexOutOfBounds { index: 1, len: 1 }
    );
}

#[test]
fn test_arrays_grow() {
    let body = "array 0\npush 4\npush_elem\npush 5\npush_elem\ndup\npush 1\nget_index\nswap\nlen\nadd\nhalt";
    assert_eq!(run(&main_with(0, body)).unwrap(), Value::Int(7));
}

#[test]
fn test_set_index_and_bounds() {
    let body = "push 1\npush 2\narray 2\ndup\npush 0\npush 9\nset_index\npush 0\nget_index\nhalt";
    assert_eq!(run(&main_with(0, body)).unwrap(), Value::Int(9));

    let body = "push 1\npush 2\narray 2\npush 5\nget_index\nhalt";
    assert_eq!(
        fault_of(&run(&main_with(0, body)).unwrap_err()),
        Fault::IndexOutOfBounds { index: 5, len: 2 }
    );
}

#[test]
fn test_string_indexing() {
    let source = "const s str \"abc\"\nconst b str \"b\"\n".to_string()
        + &main_with(0, "const s\npush 1\nget_index\nconst b\neq\nhalt");
    assert_eq!(run(&source).unwrap(), Value::Bool(true));
}

#[test]
fn test_box_round_trip() {
    assert_eq!(run(&main_with(0, "push 5\nbox\nunbox\nhalt")).unwrap(), Value::Int(5));
    let error = run(&main_with(0, "push 5\ntuple 1\nbox\nhalt")).unwrap_err();
    assert_eq!(
        fault_of(&error),
        Fault::TypeMismatch {
            expected: "primitive",
            found: "ref".to_string(),
        }
    );
}

#[test]
fn test_globals() {
    let body = "push 3\nstore_global x\nload_global x\nload_global x\nmul\nhalt";
    assert_eq!(run(&main_with(0, body)).unwrap(), Value::Int(9));

    let error = run(&main_with(0, "load_global missing\nhalt")).unwrap_err();
    assert_eq!(
        fault_of(&error),
        Fault::UndefinedGlobal {
            name: "missing".to_string()
        }
    );
}

#[test]
fn test_rerun_starts_fresh() {
    let program = bytecode_system::assemble(&main_with(0, "push 1\npush 2\nhalt")).unwrap();
    let (mut universe, _) = boot(&program, RuntimeConfig::default());
    universe.run().unwrap();
    universe.run().unwrap();
    assert_eq!(
        universe.interpreter().unwrap().stack(),
        &[Value::Int(1), Value::Int(2)]
    );
}
