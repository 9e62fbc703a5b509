//! Serialized program description and its encoder
//!
//! [`Program`] mirrors what the binary file contains: the constant pool in
//! file order, the entry designator and optional metadata. [`ProgramBuilder`]
//! assembles one incrementally, and [`Program::to_bytes`] writes the image.

use std::collections::HashMap;

use crate::constant::{CodeSpec, Constant};
use crate::format::{self, kind, section};
use crate::Opcode;

/// A complete program in serializable form
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    /// Optional program name (NAME section)
    pub name: Option<String>,
    /// Constant pool, in file order
    pub constants: Vec<Constant>,
    /// Index of the entry code object
    pub entry: u32,
    /// Opaque DEBUG section payloads
    pub debug: Vec<Vec<u8>>,
}

impl Program {
    /// Serialize to the binary image format
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();

        // Header
        bytes.extend_from_slice(&format::MAGIC);
        bytes.extend_from_slice(&format::VERSION.to_le_bytes());
        bytes.extend_from_slice(&0u16.to_le_bytes());

        if let Some(name) = &self.name {
            write_section(&mut bytes, section::NAME, name.as_bytes());
        }

        let mut pool = Vec::new();
        pool.extend_from_slice(&(self.constants.len() as u32).to_le_bytes());
        for constant in &self.constants {
            encode_constant(&mut pool, constant);
        }
        write_section(&mut bytes, section::CONSTANTS, &pool);

        for blob in &self.debug {
            write_section(&mut bytes, section::DEBUG, blob);
        }

        write_section(&mut bytes, section::ENTRY, &self.entry.to_le_bytes());
        bytes
    }

    /// Number of constants in the pool
    pub fn constant_count(&self) -> usize {
        self.constants.len()
    }

    /// The string stored at `index`, if it is a string constant
    pub fn string_at(&self, index: u32) -> Option<&str> {
        match self.constants.get(index as usize)? {
            Constant::Str(s) => Some(s),
            _ => None,
        }
    }
}

fn write_section(out: &mut Vec<u8>, tag: u8, payload: &[u8]) {
    out.push(tag);
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(payload);
}

fn encode_constant(out: &mut Vec<u8>, constant: &Constant) {
    match constant {
        Constant::Nil => out.push(kind::NIL),
        Constant::Bool(false) => out.push(kind::FALSE),
        Constant::Bool(true) => out.push(kind::TRUE),
        Constant::Int(n) => {
            out.push(kind::INT);
            out.extend_from_slice(&n.to_le_bytes());
        }
        Constant::Float(n) => {
            out.push(kind::FLOAT);
            out.extend_from_slice(&n.to_le_bytes());
        }
        Constant::Str(s) => {
            out.push(kind::STR);
            out.extend_from_slice(&(s.len() as u32).to_le_bytes());
            out.extend_from_slice(s.as_bytes());
        }
        Constant::Tuple(items) => {
            out.push(kind::TUPLE);
            out.extend_from_slice(&(items.len() as u32).to_le_bytes());
            for item in items {
                out.extend_from_slice(&item.to_le_bytes());
            }
        }
        Constant::Code(code) => {
            out.push(kind::CODE);
            out.extend_from_slice(&code.name.to_le_bytes());
            out.push(code.arity);
            out.extend_from_slice(&code.locals.to_le_bytes());
            let body = format::encode_instructions(&code.instructions);
            out.extend_from_slice(&(body.len() as u32).to_le_bytes());
            out.extend_from_slice(&body);
        }
    }
}

/// Incremental builder for a [`Program`]
///
/// # Example
///
/// ```
/// use bytecode_system::{Constant, Opcode, ProgramBuilder};
///
/// let mut builder = ProgramBuilder::new();
/// let answer = builder.add_constant(Constant::Int(42));
/// let main = builder.add_function("main", 0, 0, vec![Opcode::LoadConst(answer), Opcode::Halt]);
/// builder.set_entry(main);
///
/// let bytes = builder.build().to_bytes();
/// assert_eq!(&bytes[0..4], b"EMBR");
/// ```
#[derive(Debug, Default)]
pub struct ProgramBuilder {
    name: Option<String>,
    constants: Vec<Constant>,
    strings: HashMap<String, u32>,
    entry: Option<u32>,
    debug: Vec<Vec<u8>>,
}

impl ProgramBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the program name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Append a constant and return its index
    pub fn add_constant(&mut self, constant: Constant) -> u32 {
        let idx = self.constants.len() as u32;
        if let Constant::Str(s) = &constant {
            self.strings.entry(s.clone()).or_insert(idx);
        }
        self.constants.push(constant);
        idx
    }

    /// Return the index of an existing identical string, or append it
    pub fn intern(&mut self, s: &str) -> u32 {
        if let Some(&idx) = self.strings.get(s) {
            return idx;
        }
        self.add_constant(Constant::Str(s.to_string()))
    }

    /// Append a code object (and its name string) and return the code index
    pub fn add_function(
        &mut self,
        name: &str,
        arity: u8,
        locals: u16,
        instructions: Vec<Opcode>,
    ) -> u32 {
        let name = self.intern(name);
        self.add_constant(Constant::Code(CodeSpec {
            name,
            arity,
            locals: locals.max(arity as u16),
            instructions,
        }))
    }

    /// Reserve an index for a code object whose body is filled in later.
    ///
    /// Lets functions call each other regardless of declaration order.
    pub fn declare_function(&mut self, name: &str, arity: u8, locals: u16) -> u32 {
        self.add_function(name, arity, locals, Vec::new())
    }

    /// Replace the body of a code object added earlier
    pub fn define_function(&mut self, index: u32, instructions: Vec<Opcode>) -> bool {
        match self.constants.get_mut(index as usize) {
            Some(Constant::Code(code)) => {
                code.instructions = instructions;
                true
            }
            _ => false,
        }
    }

    /// Set the entry code object
    pub fn set_entry(&mut self, index: u32) {
        self.entry = Some(index);
    }

    /// Attach an opaque DEBUG section
    pub fn add_debug(&mut self, payload: Vec<u8>) {
        self.debug.push(payload);
    }

    /// Number of constants added so far
    pub fn constant_count(&self) -> usize {
        self.constants.len()
    }

    /// Finish building.
    ///
    /// Without an explicit entry, the first code object is used.
    pub fn build(self) -> Program {
        let entry = self.entry.unwrap_or_else(|| {
            self.constants
                .iter()
                .position(|c| matches!(c, Constant::Code(_)))
                .unwrap_or(0) as u32
        });
        Program {
            name: self.name,
            constants: self.constants,
            entry,
            debug: self.debug,
        }
    }
}
