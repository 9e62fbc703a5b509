//! Bytecode opcodes for the ember interpreter
//!
//! The instruction set is a closed enum so the execution loop can dispatch
//! with an exhaustive `match`. Each opcode has a one-byte tag followed by
//! fixed-width little-endian operands.

use std::fmt;

use crate::format::DecodeError;

/// Bytecode opcodes for the stack machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    // Stack
    /// Do nothing
    Nop,
    /// Push constant pool entry at index
    LoadConst(u32),
    /// Push a small integer immediate
    LoadSmall(i32),
    /// Push nil
    LoadNil,
    /// Push true
    LoadTrue,
    /// Push false
    LoadFalse,
    /// Discard top of stack
    Pop,
    /// Duplicate top of stack
    Dup,
    /// Exchange the two topmost values
    Swap,

    // Variables
    /// Push local slot
    LoadLocal(u16),
    /// Pop into local slot
    StoreLocal(u16),
    /// Push global named by the string constant at index
    LoadGlobal(u32),
    /// Pop into global named by the string constant at index
    StoreGlobal(u32),

    // Arithmetic and logic
    /// Add top two values (concatenates strings)
    Add,
    /// Subtract top from second-top
    Sub,
    /// Multiply top two values
    Mul,
    /// Divide second-top by top
    Div,
    /// Remainder of second-top by top
    Rem,
    /// Negate top value
    Neg,
    /// Logical NOT (invert truthiness)
    Not,
    /// Equality
    Eq,
    /// Inequality
    Ne,
    /// Less than
    Lt,
    /// Less than or equal
    Le,
    /// Greater than
    Gt,
    /// Greater than or equal
    Ge,
    /// Integer bitwise AND
    BitAnd,
    /// Integer bitwise OR
    BitOr,
    /// Integer bitwise XOR
    BitXor,
    /// Integer shift left
    Shl,
    /// Integer arithmetic shift right
    Shr,

    // Heap construction
    /// Build an immutable tuple from the top `n` values
    MakeTuple(u16),
    /// Build a mutable record from the top `n` values
    MakeRecord(u16),
    /// Build a growable array from the top `n` values
    MakeArray(u16),
    /// Box the primitive on top of the stack
    Box,
    /// Unwrap a boxed primitive
    Unbox,

    // Field and element access
    /// Read field `i` of a tuple or record
    GetField(u16),
    /// Write field `i` of a record (record below value)
    SetField(u16),
    /// Read element: array/tuple/record/string, index on top
    GetIndex,
    /// Write element of an array or record: target, index, value
    SetIndex,
    /// Append top value to the array below it, leaving the array
    ArrayPush,
    /// Length of a string, tuple, record or array
    Len,

    // Control flow
    /// Unconditional jump to absolute instruction index
    Jump(u32),
    /// Pop and jump if truthy
    JumpIfTrue(u32),
    /// Pop and jump if falsy
    JumpIfFalse(u32),
    /// Call the code constant at `target` with `argc` arguments
    Call {
        /// Constant pool index of the callee
        target: u32,
        /// Number of arguments on the stack
        argc: u8,
    },
    /// Call the code object referenced below the `argc` arguments
    CallIndirect(u8),
    /// Call a runtime intrinsic named by a string constant
    CallIntrinsic {
        /// Constant pool index of the intrinsic name
        name: u32,
        /// Number of arguments on the stack
        argc: u8,
    },
    /// Return top of stack to the caller
    Return,
    /// Stop the program, leaving the stack as is
    Halt,
    /// Let the collector run if the heap is over its threshold
    Safepoint,
}

impl Opcode {
    /// Check if this opcode is a terminator (ends basic block)
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Opcode::Return
                | Opcode::Halt
                | Opcode::Jump(_)
                | Opcode::JumpIfTrue(_)
                | Opcode::JumpIfFalse(_)
        )
    }

    /// Check if this opcode may allocate on the heap
    pub fn may_allocate(&self) -> bool {
        matches!(
            self,
            Opcode::Add
                | Opcode::GetIndex
                | Opcode::MakeTuple(_)
                | Opcode::MakeRecord(_)
                | Opcode::MakeArray(_)
                | Opcode::Box
                | Opcode::ArrayPush
                | Opcode::CallIntrinsic { .. }
        )
    }

    /// Constant pool index referenced by the operand, if any
    pub fn constant_operand(&self) -> Option<u32> {
        match self {
            Opcode::LoadConst(i)
            | Opcode::LoadGlobal(i)
            | Opcode::StoreGlobal(i)
            | Opcode::Call { target: i, .. }
            | Opcode::CallIntrinsic { name: i, .. } => Some(*i),
            _ => None,
        }
    }

    /// Size of the encoded instruction in bytes
    pub fn encoded_len(&self) -> usize {
        1 + match self {
            Opcode::LoadConst(_)
            | Opcode::LoadSmall(_)
            | Opcode::LoadGlobal(_)
            | Opcode::StoreGlobal(_)
            | Opcode::Jump(_)
            | Opcode::JumpIfTrue(_)
            | Opcode::JumpIfFalse(_) => 4,
            Opcode::LoadLocal(_)
            | Opcode::StoreLocal(_)
            | Opcode::MakeTuple(_)
            | Opcode::MakeRecord(_)
            | Opcode::MakeArray(_)
            | Opcode::GetField(_)
            | Opcode::SetField(_) => 2,
            Opcode::Call { .. } | Opcode::CallIntrinsic { .. } => 5,
            Opcode::CallIndirect(_) => 1,
            _ => 0,
        }
    }

    /// Append the binary encoding of this opcode to `out`
    pub fn encode(&self, out: &mut Vec<u8>) {
        match *self {
            Opcode::Nop => out.push(0x00),
            Opcode::LoadConst(i) => push_u32(out, 0x01, i),
            Opcode::LoadSmall(n) => {
                out.push(0x02);
                out.extend_from_slice(&n.to_le_bytes());
            }
            Opcode::LoadNil => out.push(0x03),
            Opcode::LoadTrue => out.push(0x04),
            Opcode::LoadFalse => out.push(0x05),
            Opcode::Pop => out.push(0x06),
            Opcode::Dup => out.push(0x07),
            Opcode::Swap => out.push(0x08),
            Opcode::LoadLocal(i) => push_u16(out, 0x10, i),
            Opcode::StoreLocal(i) => push_u16(out, 0x11, i),
            Opcode::LoadGlobal(i) => push_u32(out, 0x12, i),
            Opcode::StoreGlobal(i) => push_u32(out, 0x13, i),
            Opcode::Add => out.push(0x20),
            Opcode::Sub => out.push(0x21),
            Opcode::Mul => out.push(0x22),
            Opcode::Div => out.push(0x23),
            Opcode::Rem => out.push(0x24),
            Opcode::Neg => out.push(0x25),
            Opcode::Not => out.push(0x26),
            Opcode::Eq => out.push(0x27),
            Opcode::Ne => out.push(0x28),
            Opcode::Lt => out.push(0x29),
            Opcode::Le => out.push(0x2A),
            Opcode::Gt => out.push(0x2B),
            Opcode::Ge => out.push(0x2C),
            Opcode::BitAnd => out.push(0x2D),
            Opcode::BitOr => out.push(0x2E),
            Opcode::BitXor => out.push(0x2F),
            Opcode::Shl => out.push(0x30),
            Opcode::Shr => out.push(0x31),
            Opcode::MakeTuple(n) => push_u16(out, 0x40, n),
            Opcode::MakeRecord(n) => push_u16(out, 0x41, n),
            Opcode::MakeArray(n) => push_u16(out, 0x42, n),
            Opcode::Box => out.push(0x43),
            Opcode::Unbox => out.push(0x44),
            Opcode::GetField(i) => push_u16(out, 0x50, i),
            Opcode::SetField(i) => push_u16(out, 0x51, i),
            Opcode::GetIndex => out.push(0x52),
            Opcode::SetIndex => out.push(0x53),
            Opcode::ArrayPush => out.push(0x54),
            Opcode::Len => out.push(0x55),
            Opcode::Jump(t) => push_u32(out, 0x60, t),
            Opcode::JumpIfTrue(t) => push_u32(out, 0x61, t),
            Opcode::JumpIfFalse(t) => push_u32(out, 0x62, t),
            Opcode::Call { target, argc } => {
                push_u32(out, 0x63, target);
                out.push(argc);
            }
            Opcode::CallIndirect(argc) => {
                out.push(0x64);
                out.push(argc);
            }
            Opcode::CallIntrinsic { name, argc } => {
                push_u32(out, 0x65, name);
                out.push(argc);
            }
            Opcode::Return => out.push(0x66),
            Opcode::Halt => out.push(0x67),
            Opcode::Safepoint => out.push(0x68),
        }
    }

    /// Decode one instruction from the start of `bytes`.
    ///
    /// Returns the opcode and the number of bytes consumed. Offsets in the
    /// error are relative to the start of `bytes`.
    pub fn decode(bytes: &[u8]) -> Result<(Opcode, usize), DecodeError> {
        let tag = *bytes
            .first()
            .ok_or_else(|| DecodeError::new(0, "truncated instruction: missing opcode tag"))?;
        let op = match tag {
            0x00 => Opcode::Nop,
            0x01 => Opcode::LoadConst(read_u32(bytes, 1)?),
            0x02 => Opcode::LoadSmall(read_u32(bytes, 1)? as i32),
            0x03 => Opcode::LoadNil,
            0x04 => Opcode::LoadTrue,
            0x05 => Opcode::LoadFalse,
            0x06 => Opcode::Pop,
            0x07 => Opcode::Dup,
            0x08 => Opcode::Swap,
            0x10 => Opcode::LoadLocal(read_u16(bytes, 1)?),
            0x11 => Opcode::StoreLocal(read_u16(bytes, 1)?),
            0x12 => Opcode::LoadGlobal(read_u32(bytes, 1)?),
            0x13 => Opcode::StoreGlobal(read_u32(bytes, 1)?),
            0x20 => Opcode::Add,
            0x21 => Opcode::Sub,
            0x22 => Opcode::Mul,
            0x23 => Opcode::Div,
            0x24 => Opcode::Rem,
            0x25 => Opcode::Neg,
            0x26 => Opcode::Not,
            0x27 => Opcode::Eq,
            0x28 => Opcode::Ne,
            0x29 => Opcode::Lt,
            0x2A => Opcode::Le,
            0x2B => Opcode::Gt,
            0x2C => Opcode::Ge,
            0x2D => Opcode::BitAnd,
            0x2E => Opcode::BitOr,
            0x2F => Opcode::BitXor,
            0x30 => Opcode::Shl,
            0x31 => Opcode::Shr,
            0x40 => Opcode::MakeTuple(read_u16(bytes, 1)?),
            0x41 => Opcode::MakeRecord(read_u16(bytes, 1)?),
            0x42 => Opcode::MakeArray(read_u16(bytes, 1)?),
            0x43 => Opcode::Box,
            0x44 => Opcode::Unbox,
            0x50 => Opcode::GetField(read_u16(bytes, 1)?),
            0x51 => Opcode::SetField(read_u16(bytes, 1)?),
            0x52 => Opcode::GetIndex,
            0x53 => Opcode::SetIndex,
            0x54 => Opcode::ArrayPush,
            0x55 => Opcode::Len,
            0x60 => Opcode::Jump(read_u32(bytes, 1)?),
            0x61 => Opcode::JumpIfTrue(read_u32(bytes, 1)?),
            0x62 => Opcode::JumpIfFalse(read_u32(bytes, 1)?),
            0x63 => Opcode::Call {
                target: read_u32(bytes, 1)?,
                argc: read_u8(bytes, 5)?,
            },
            0x64 => Opcode::CallIndirect(read_u8(bytes, 1)?),
            0x65 => Opcode::CallIntrinsic {
                name: read_u32(bytes, 1)?,
                argc: read_u8(bytes, 5)?,
            },
            0x66 => Opcode::Return,
            0x67 => Opcode::Halt,
            0x68 => Opcode::Safepoint,
            other => {
                return Err(DecodeError::new(
                    0,
                    format!("unknown opcode tag 0x{:02X}", other),
                ))
            }
        };
        Ok((op, op.encoded_len()))
    }

    /// Assembler mnemonic for this opcode
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Opcode::Nop => "nop",
            Opcode::LoadConst(_) => "const",
            Opcode::LoadSmall(_) => "push",
            Opcode::LoadNil => "nil",
            Opcode::LoadTrue => "true",
            Opcode::LoadFalse => "false",
            Opcode::Pop => "pop",
            Opcode::Dup => "dup",
            Opcode::Swap => "swap",
            Opcode::LoadLocal(_) => "load",
            Opcode::StoreLocal(_) => "store",
            Opcode::LoadGlobal(_) => "load_global",
            Opcode::StoreGlobal(_) => "store_global",
            Opcode::Add => "add",
            Opcode::Sub => "sub",
            Opcode::Mul => "mul",
            Opcode::Div => "div",
            Opcode::Rem => "rem",
            Opcode::Neg => "neg",
            Opcode::Not => "not",
            Opcode::Eq => "eq",
            Opcode::Ne => "ne",
            Opcode::Lt => "lt",
            Opcode::Le => "le",
            Opcode::Gt => "gt",
            Opcode::Ge => "ge",
            Opcode::BitAnd => "band",
            Opcode::BitOr => "bor",
            Opcode::BitXor => "bxor",
            Opcode::Shl => "shl",
            Opcode::Shr => "shr",
            Opcode::MakeTuple(_) => "tuple",
            Opcode::MakeRecord(_) => "record",
            Opcode::MakeArray(_) => "array",
            Opcode::Box => "box",
            Opcode::Unbox => "unbox",
            Opcode::GetField(_) => "get_field",
            Opcode::SetField(_) => "set_field",
            Opcode::GetIndex => "get_index",
            Opcode::SetIndex => "set_index",
            Opcode::ArrayPush => "push_elem",
            Opcode::Len => "len",
            Opcode::Jump(_) => "jump",
            Opcode::JumpIfTrue(_) => "jump_if_true",
            Opcode::JumpIfFalse(_) => "jump_if_false",
            Opcode::Call { .. } => "call",
            Opcode::CallIndirect(_) => "call_indirect",
            Opcode::CallIntrinsic { .. } => "intrinsic",
            Opcode::Return => "ret",
            Opcode::Halt => "halt",
            Opcode::Safepoint => "safepoint",
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.mnemonic();
        match *self {
            Opcode::LoadConst(i)
            | Opcode::LoadGlobal(i)
            | Opcode::StoreGlobal(i)
            | Opcode::Jump(i)
            | Opcode::JumpIfTrue(i)
            | Opcode::JumpIfFalse(i) => write!(f, "{} {}", name, i),
            Opcode::LoadSmall(n) => write!(f, "{} {}", name, n),
            Opcode::LoadLocal(i)
            | Opcode::StoreLocal(i)
            | Opcode::MakeTuple(i)
            | Opcode::MakeRecord(i)
            | Opcode::MakeArray(i)
            | Opcode::GetField(i)
            | Opcode::SetField(i) => write!(f, "{} {}", name, i),
            Opcode::Call { target, argc } => write!(f, "{} {} {}", name, target, argc),
            Opcode::CallIndirect(argc) => write!(f, "{} {}", name, argc),
            Opcode::CallIntrinsic { name: n, argc } => write!(f, "{} {} {}", name, n, argc),
            _ => f.write_str(name),
        }
    }
}

fn push_u16(out: &mut Vec<u8>, tag: u8, v: u16) {
    out.push(tag);
    out.extend_from_slice(&v.to_le_bytes());
}

fn push_u32(out: &mut Vec<u8>, tag: u8, v: u32) {
    out.push(tag);
    out.extend_from_slice(&v.to_le_bytes());
}

fn read_u8(bytes: &[u8], at: usize) -> Result<u8, DecodeError> {
    bytes
        .get(at)
        .copied()
        .ok_or_else(|| DecodeError::new(at, "truncated instruction operand"))
}

fn read_u16(bytes: &[u8], at: usize) -> Result<u16, DecodeError> {
    let raw = bytes
        .get(at..at + 2)
        .ok_or_else(|| DecodeError::new(at, "truncated instruction operand"))?;
    Ok(u16::from_le_bytes([raw[0], raw[1]]))
}

fn read_u32(bytes: &[u8], at: usize) -> Result<u32, DecodeError> {
    let raw = bytes
        .get(at..at + 4)
        .ok_or_else(|| DecodeError::new(at, "truncated instruction operand"))?;
    Ok(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
}
