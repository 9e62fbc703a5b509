//! Text assembler for program images
//!
//! A line-oriented source format that compiles straight into a [`Program`].
//! `;` starts a comment.
//!
//! ```text
//! .name "countdown"
//! const limit int 3
//!
//! func main 0 1
//!     const limit
//!     store 0
//! loop:
//!     load 0
//!     jump_if_false done
//!     load 0
//!     intrinsic print 1
//!     pop
//!     load 0
//!     push 1
//!     sub
//!     store 0
//!     jump loop
//! done:
//!     nil
//!     halt
//! end
//!
//! entry main
//! ```
//!
//! Functions may call each other in any order; constants may only refer to
//! constants declared above them.

use std::collections::HashMap;

use thiserror::Error;

use crate::constant::Constant;
use crate::program::{Program, ProgramBuilder};
use crate::Opcode;

/// An assembly error, with the 1-based source line
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: {message}")]
pub struct AssembleError {
    /// Source line
    pub line: usize,
    /// What was wrong
    pub message: String,
}

impl AssembleError {
    fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

type Result<T> = std::result::Result<T, AssembleError>;

struct FuncDecl {
    name: String,
    arity: u8,
    locals: u16,
    line: usize,
    body: Vec<(usize, Vec<String>)>,
}

enum Item {
    Const {
        name: String,
        tokens: Vec<String>,
        line: usize,
    },
    Func(FuncDecl),
}

/// Assemble source text into a program
pub fn assemble(source: &str) -> Result<Program> {
    let mut name = None;
    let mut entry: Option<(String, usize)> = None;
    let mut items = Vec::new();
    let mut current: Option<FuncDecl> = None;

    for (idx, raw) in source.lines().enumerate() {
        let line = idx + 1;
        let tokens = tokenize(raw, line)?;
        if tokens.is_empty() {
            continue;
        }

        if let Some(func) = current.as_mut() {
            if tokens[0] == "end" && tokens.len() == 1 {
                if let Some(func) = current.take() {
                    items.push(Item::Func(func));
                }
            } else {
                func.body.push((line, tokens));
            }
            continue;
        }

        match tokens[0].as_str() {
            ".name" => {
                expect_len(&tokens, 2, line)?;
                name = Some(tokens[1].clone());
            }
            "const" => {
                if tokens.len() < 3 {
                    return Err(AssembleError::new(line, "expected: const NAME KIND VALUE..."));
                }
                items.push(Item::Const {
                    name: tokens[1].clone(),
                    tokens: tokens[2..].to_vec(),
                    line,
                });
            }
            "func" => {
                expect_len(&tokens, 4, line)?;
                current = Some(FuncDecl {
                    name: tokens[1].clone(),
                    arity: parse_num(&tokens[2], line)?,
                    locals: parse_num(&tokens[3], line)?,
                    line,
                    body: Vec::new(),
                });
            }
            "entry" => {
                expect_len(&tokens, 2, line)?;
                entry = Some((tokens[1].clone(), line));
            }
            other => {
                return Err(AssembleError::new(
                    line,
                    format!("unexpected '{}' outside a function", other),
                ))
            }
        }
    }

    if let Some(func) = current {
        return Err(AssembleError::new(
            func.line,
            format!("function '{}' is missing 'end'", func.name),
        ));
    }

    let mut builder = ProgramBuilder::new();
    if let Some(name) = name {
        builder = builder.with_name(name);
    }

    // Pass 1: assign pool indices in declaration order.
    let mut symbols: HashMap<String, u32> = HashMap::new();
    for item in &items {
        let (symbol, line, index) = match item {
            Item::Const { name, tokens, line } => {
                let constant = parse_constant(tokens, &symbols, *line)?;
                (name, *line, builder.add_constant(constant))
            }
            Item::Func(func) => (
                &func.name,
                func.line,
                builder.declare_function(&func.name, func.arity, func.locals),
            ),
        };
        if symbols.insert(symbol.clone(), index).is_some() {
            return Err(AssembleError::new(
                line,
                format!("duplicate symbol '{}'", symbol),
            ));
        }
    }

    // Pass 2: function bodies.
    for item in &items {
        if let Item::Func(func) = item {
            let index = symbols[&func.name];
            let body = assemble_body(func, &symbols, &mut builder)?;
            builder.define_function(index, body);
        }
    }

    let (entry_name, line) =
        entry.ok_or_else(|| AssembleError::new(0, "missing 'entry' directive"))?;
    let entry_idx = *symbols
        .get(&entry_name)
        .ok_or_else(|| AssembleError::new(line, format!("unknown entry '{}'", entry_name)))?;
    builder.set_entry(entry_idx);

    Ok(builder.build())
}

fn assemble_body(
    func: &FuncDecl,
    symbols: &HashMap<String, u32>,
    builder: &mut ProgramBuilder,
) -> Result<Vec<Opcode>> {
    // Labels resolve to the index of the next instruction.
    let mut labels = HashMap::new();
    let mut count = 0u32;
    for (line, tokens) in &func.body {
        if let Some(label) = tokens[0].strip_suffix(':') {
            if tokens.len() != 1 {
                return Err(AssembleError::new(*line, "label must be on its own line"));
            }
            if labels.insert(label.to_string(), count).is_some() {
                return Err(AssembleError::new(*line, format!("duplicate label '{}'", label)));
            }
        } else {
            count += 1;
        }
    }

    let mut ops = Vec::with_capacity(count as usize);
    for (line, tokens) in &func.body {
        if tokens[0].ends_with(':') {
            continue;
        }
        let line = *line;
        let args = &tokens[1..];
        let arg = |i: usize| -> Result<&str> {
            args.get(i)
                .map(|s| s.as_str())
                .ok_or_else(|| AssembleError::new(line, format!("'{}' needs an operand", tokens[0])))
        };
        let symbol = |name: &str| -> Result<u32> {
            if let Ok(raw) = name.parse::<u32>() {
                return Ok(raw);
            }
            symbols
                .get(name)
                .copied()
                .ok_or_else(|| AssembleError::new(line, format!("unknown symbol '{}'", name)))
        };
        let label = |name: &str| -> Result<u32> {
            if let Ok(raw) = name.parse::<u32>() {
                return Ok(raw);
            }
            labels
                .get(name)
                .copied()
                .ok_or_else(|| AssembleError::new(line, format!("unknown label '{}'", name)))
        };

        let op = match tokens[0].as_str() {
            "nop" => Opcode::Nop,
            "const" => Opcode::LoadConst(symbol(arg(0)?)?),
            "push" => Opcode::LoadSmall(parse_num(arg(0)?, line)?),
            "nil" => Opcode::LoadNil,
            "true" => Opcode::LoadTrue,
            "false" => Opcode::LoadFalse,
            "pop" => Opcode::Pop,
            "dup" => Opcode::Dup,
            "swap" => Opcode::Swap,
            "load" => Opcode::LoadLocal(parse_num(arg(0)?, line)?),
            "store" => Opcode::StoreLocal(parse_num(arg(0)?, line)?),
            "load_global" => Opcode::LoadGlobal(builder.intern(arg(0)?)),
            "store_global" => Opcode::StoreGlobal(builder.intern(arg(0)?)),
            "add" => Opcode::Add,
            "sub" => Opcode::Sub,
            "mul" => Opcode::Mul,
            "div" => Opcode::Div,
            "rem" => Opcode::Rem,
            "neg" => Opcode::Neg,
            "not" => Opcode::Not,
            "eq" => Opcode::Eq,
            "ne" => Opcode::Ne,
            "lt" => Opcode::Lt,
            "le" => Opcode::Le,
            "gt" => Opcode::Gt,
            "ge" => Opcode::Ge,
            "band" => Opcode::BitAnd,
            "bor" => Opcode::BitOr,
            "bxor" => Opcode::BitXor,
            "shl" => Opcode::Shl,
            "shr" => Opcode::Shr,
            "tuple" => Opcode::MakeTuple(parse_num(arg(0)?, line)?),
            "record" => Opcode::MakeRecord(parse_num(arg(0)?, line)?),
            "array" => Opcode::MakeArray(parse_num(arg(0)?, line)?),
            "box" => Opcode::Box,
            "unbox" => Opcode::Unbox,
            "get_field" => Opcode::GetField(parse_num(arg(0)?, line)?),
            "set_field" => Opcode::SetField(parse_num(arg(0)?, line)?),
            "get_index" => Opcode::GetIndex,
            "set_index" => Opcode::SetIndex,
            "push_elem" => Opcode::ArrayPush,
            "len" => Opcode::Len,
            "jump" => Opcode::Jump(label(arg(0)?)?),
            "jump_if_true" => Opcode::JumpIfTrue(label(arg(0)?)?),
            "jump_if_false" => Opcode::JumpIfFalse(label(arg(0)?)?),
            "call" => Opcode::Call {
                target: symbol(arg(0)?)?,
                argc: parse_num(arg(1)?, line)?,
            },
            "call_indirect" => Opcode::CallIndirect(parse_num(arg(0)?, line)?),
            "intrinsic" => Opcode::CallIntrinsic {
                name: builder.intern(arg(0)?),
                argc: parse_num(arg(1)?, line)?,
            },
            "ret" => Opcode::Return,
            "halt" => Opcode::Halt,
            "safepoint" => Opcode::Safepoint,
            other => {
                return Err(AssembleError::new(
                    line,
                    format!("unknown instruction '{}'", other),
                ))
            }
        };
        ops.push(op);
    }
    Ok(ops)
}

fn parse_constant(tokens: &[String], symbols: &HashMap<String, u32>, line: usize) -> Result<Constant> {
    let value = |i: usize| -> Result<&str> {
        tokens
            .get(i)
            .map(|s| s.as_str())
            .ok_or_else(|| AssembleError::new(line, "missing constant value"))
    };
    let constant = match tokens[0].as_str() {
        "nil" => Constant::Nil,
        "bool" => match value(1)? {
            "true" => Constant::Bool(true),
            "false" => Constant::Bool(false),
            other => return Err(AssembleError::new(line, format!("invalid bool '{}'", other))),
        },
        "int" => Constant::Int(parse_num(value(1)?, line)?),
        "float" => Constant::Float(
            value(1)?
                .parse()
                .map_err(|_| AssembleError::new(line, "invalid float literal"))?,
        ),
        "str" => Constant::Str(value(1)?.to_string()),
        "tuple" => {
            let mut items = Vec::with_capacity(tokens.len() - 1);
            for name in &tokens[1..] {
                let idx = symbols.get(name).copied().ok_or_else(|| {
                    AssembleError::new(
                        line,
                        format!("tuple element '{}' must be declared earlier", name),
                    )
                })?;
                items.push(idx);
            }
            Constant::Tuple(items)
        }
        other => return Err(AssembleError::new(line, format!("unknown constant kind '{}'", other))),
    };
    Ok(constant)
}

fn parse_num<T: std::str::FromStr>(token: &str, line: usize) -> Result<T> {
    token
        .parse()
        .map_err(|_| AssembleError::new(line, format!("invalid number '{}'", token)))
}

fn expect_len(tokens: &[String], len: usize, line: usize) -> Result<()> {
    if tokens.len() == len {
        Ok(())
    } else {
        Err(AssembleError::new(
            line,
            format!("'{}' expects {} operand(s)", tokens[0], len - 1),
        ))
    }
}

/// Split a line into tokens, honouring double-quoted strings and `;` comments.
fn tokenize(line: &str, line_no: usize) -> Result<Vec<String>> {
    let mut tokens = Vec::new();
    let mut chars = line.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c == ';' {
            break;
        } else if c == '"' {
            chars.next();
            let mut s = String::new();
            loop {
                match chars.next() {
                    Some('"') => break,
                    Some('\\') => match chars.next() {
                        Some('n') => s.push('\n'),
                        Some('t') => s.push('\t'),
                        Some('"') => s.push('"'),
                        Some('\\') => s.push('\\'),
                        Some(other) => {
                            return Err(AssembleError::new(
                                line_no,
                                format!("unknown escape '\\{}'", other),
                            ))
                        }
                        None => return Err(AssembleError::new(line_no, "unterminated string")),
                    },
                    Some(other) => s.push(other),
                    None => return Err(AssembleError::new(line_no, "unterminated string")),
                }
            }
            tokens.push(s);
        } else {
            let mut s = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() || c == ';' {
                    break;
                }
                s.push(c);
                chars.next();
            }
            tokens.push(s);
        }
    }
    Ok(tokens)
}
