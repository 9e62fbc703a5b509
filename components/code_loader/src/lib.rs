//! Code Loader - turns a serialized program image into heap objects
//!
//! The loader reads through the [`ByteSource`] contract, validates the
//! structure of the image and allocates every constant on the heap in file
//! order. The result is a [`ProgramImage`]: the pool of constant handles and
//! the entry code object.
//!
//! # Example
//!
//! ```
//! use bytecode_system::{Constant, Opcode, ProgramBuilder};
//! use code_loader::{BinaryFileParser, BufferedInputStream};
//! use memory_manager::Heap;
//!
//! let mut builder = ProgramBuilder::new();
//! let answer = builder.add_constant(Constant::Int(42));
//! builder.add_function("main", 0, 0, vec![Opcode::LoadConst(answer), Opcode::Halt]);
//! let bytes = builder.build().to_bytes();
//!
//! let mut heap = Heap::new();
//! let mut source = BufferedInputStream::from_bytes(bytes).unwrap();
//! let image = BinaryFileParser::new(&mut source).parse(&mut heap).unwrap();
//! assert_eq!(image.constants.len(), 3);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod byte_source;
pub mod image;
pub mod parser;

pub use byte_source::{BufferedInputStream, ByteSource, SourceError};
pub use image::ProgramImage;
pub use parser::BinaryFileParser;
