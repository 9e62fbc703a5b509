//! Heap object representation
//!
//! Every runtime object lives in a heap slot as a [`HeapObject`]. Objects
//! refer to each other only through [`Value::Ref`] handles, which the
//! collector can see.

use bytecode_system::Opcode;
use core_types::{ObjectRef, Value};

use crate::trace::{Trace, Tracer};

/// Accounted size of the per-object header
pub const HEADER_SIZE: usize = 16;

/// Accounted size of one value slot
pub const VALUE_SIZE: usize = 16;

/// Accounted size of one instruction in a code object
pub const INSTRUCTION_SIZE: usize = 8;

/// Executable code materialized from a code constant
#[derive(Debug, Clone, PartialEq)]
pub struct CodeObject {
    /// String object holding the function name
    pub name: ObjectRef,
    /// Number of arguments
    pub arity: u8,
    /// Number of local slots, arguments first
    pub locals: u16,
    /// Decoded instruction stream
    pub instructions: Vec<Opcode>,
}

/// A garbage-collected object
#[derive(Debug, Clone, PartialEq)]
pub enum HeapObject {
    /// Immutable UTF-8 string
    String(String),
    /// A primitive moved onto the heap
    Boxed(Value),
    /// Immutable fixed-length sequence
    Tuple(Vec<Value>),
    /// Mutable fixed-length sequence of fields
    Record(Vec<Value>),
    /// Growable sequence
    Array(Vec<Value>),
    /// Code object
    Code(CodeObject),
}

impl HeapObject {
    /// Kind name, as reported by `type_of`
    pub fn type_name(&self) -> &'static str {
        match self {
            HeapObject::String(_) => "string",
            HeapObject::Boxed(_) => "boxed",
            HeapObject::Tuple(_) => "tuple",
            HeapObject::Record(_) => "record",
            HeapObject::Array(_) => "array",
            HeapObject::Code(_) => "code",
        }
    }

    /// Bytes charged against the heap for this object
    pub fn size(&self) -> usize {
        HEADER_SIZE
            + match self {
                HeapObject::String(s) => s.len(),
                HeapObject::Boxed(_) => VALUE_SIZE,
                HeapObject::Tuple(items) | HeapObject::Record(items) | HeapObject::Array(items) => {
                    items.len() * VALUE_SIZE
                }
                HeapObject::Code(code) => code.instructions.len() * INSTRUCTION_SIZE,
            }
    }

    /// Element slots for the sequence kinds
    pub fn elements(&self) -> Option<&[Value]> {
        match self {
            HeapObject::Tuple(items) | HeapObject::Record(items) | HeapObject::Array(items) => {
                Some(items)
            }
            _ => None,
        }
    }

    /// String contents, if this is a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            HeapObject::String(s) => Some(s),
            _ => None,
        }
    }

    /// Code object, if this is one
    pub fn as_code(&self) -> Option<&CodeObject> {
        match self {
            HeapObject::Code(code) => Some(code),
            _ => None,
        }
    }
}

impl Trace for HeapObject {
    fn trace(&self, tracer: &mut dyn Tracer) {
        match self {
            HeapObject::String(_) => {}
            HeapObject::Boxed(value) => value.trace(tracer),
            HeapObject::Tuple(items) | HeapObject::Record(items) | HeapObject::Array(items) => {
                items.trace(tracer)
            }
            HeapObject::Code(code) => tracer.mark(code.name),
        }
    }
}
