//! Human-readable listing of a program image

use std::fmt::Write;

use bytecode_system::{Constant, Program};

/// List the constant pool, with each code object's instructions indented
/// beneath it
pub fn disassemble(program: &Program) -> String {
    let mut out = String::new();
    let name = program.name.as_deref().unwrap_or("<unnamed>");
    let _ = writeln!(
        out,
        "program {:?}: {} constants, entry #{}",
        name,
        program.constant_count(),
        program.entry
    );

    for (index, constant) in program.constants.iter().enumerate() {
        let _ = write!(out, "#{:<4} {:<6}", index, constant.kind_name());
        match constant {
            Constant::Nil => {}
            Constant::Bool(b) => {
                let _ = write!(out, " {}", b);
            }
            Constant::Int(n) => {
                let _ = write!(out, " {}", n);
            }
            Constant::Float(n) => {
                let _ = write!(out, " {:?}", n);
            }
            Constant::Str(s) => {
                let _ = write!(out, " {:?}", s);
            }
            Constant::Tuple(items) => {
                let items: Vec<String> = items.iter().map(|i| format!("#{}", i)).collect();
                let _ = write!(out, " ({})", items.join(", "));
            }
            Constant::Code(code) => {
                let _ = write!(
                    out,
                    " {} arity={} locals={}",
                    program.string_at(code.name).unwrap_or("?"),
                    code.arity,
                    code.locals
                );
                for (ip, op) in code.instructions.iter().enumerate() {
                    let _ = write!(out, "\n      {:>4}  {}", ip, op);
                }
            }
        }
        out.push('\n');
    }
    out
}
