//! Constant pool entry descriptors
//!
//! A [`Constant`] is the serialized description of one pool entry. The loader
//! turns each into a heap object; the encoder turns each into bytes.

use crate::Opcode;

/// Description of a code object in the constant pool
#[derive(Debug, Clone, PartialEq)]
pub struct CodeSpec {
    /// Index of the string constant naming this code object
    pub name: u32,
    /// Number of arguments the code expects
    pub arity: u8,
    /// Number of local slots (arguments occupy the first `arity`)
    pub locals: u16,
    /// Instruction stream
    pub instructions: Vec<Opcode>,
}

/// One constant pool entry
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    /// nil
    Nil,
    /// Boolean literal
    Bool(bool),
    /// Integer literal
    Int(i64),
    /// Float literal
    Float(f64),
    /// String literal
    Str(String),
    /// Immutable tuple of earlier entries
    Tuple(Vec<u32>),
    /// Code object
    Code(CodeSpec),
}

impl Constant {
    /// Indices of other pool entries this entry refers to
    pub fn references(&self) -> Vec<u32> {
        match self {
            Constant::Tuple(items) => items.clone(),
            Constant::Code(code) => vec![code.name],
            _ => Vec::new(),
        }
    }

    /// Short kind name, for listings
    pub fn kind_name(&self) -> &'static str {
        match self {
            Constant::Nil => "nil",
            Constant::Bool(_) => "bool",
            Constant::Int(_) => "int",
            Constant::Float(_) => "float",
            Constant::Str(_) => "str",
            Constant::Tuple(_) => "tuple",
            Constant::Code(_) => "code",
        }
    }
}
