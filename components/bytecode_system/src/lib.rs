//! Bytecode definitions for the Ember virtual machine
//!
//! This crate owns everything about the program image that does not need a
//! heap: the instruction set, the binary container layout, an encoder for
//! building images, and a small text assembler.
//!
//! # Example
//!
//! ```
//! use bytecode_system::{Constant, Opcode, ProgramBuilder};
//!
//! let mut builder = ProgramBuilder::new().with_name("answer");
//! let answer = builder.add_constant(Constant::Int(42));
//! let main = builder.add_function("main", 0, 0, vec![Opcode::LoadConst(answer), Opcode::Halt]);
//! builder.set_entry(main);
//!
//! let bytes = builder.build().to_bytes();
//! assert_eq!(&bytes[..4], b"EMBR");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod assembler;
pub mod constant;
pub mod format;
pub mod opcode;
pub mod program;

// Re-export main types at crate root
pub use assembler::{assemble, AssembleError};
pub use constant::{CodeSpec, Constant};
pub use format::DecodeError;
pub use opcode::Opcode;
pub use program::{Program, ProgramBuilder};
