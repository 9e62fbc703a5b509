//! Core value types and error handling for the ember virtual machine.
//!
//! This crate provides the foundational types shared by the loader, the heap
//! and the interpreter.
//!
//! # Overview
//!
//! - [`Value`] - Inline primitive or heap reference held on the operand stack
//! - [`ObjectRef`] - Generation-checked handle into the managed heap
//! - [`VmError`] - Every failure the core can report
//! - [`ErrorKind`] - Taxonomy category of a [`VmError`], with its exit code
//! - [`Fault`] / [`Location`] - What went wrong in the interpreter, and where
//!
//! # Examples
//!
//! ```
//! use core_types::{ErrorKind, Value, VmError};
//!
//! let answer = Value::Int(42);
//! assert!(answer.is_truthy());
//! assert_eq!(answer.type_name(), "int");
//!
//! let err = VmError::malformed(4, "unsupported version 9");
//! assert_eq!(err.kind(), ErrorKind::MalformedInput);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

mod error;
mod value;

pub use error::{ErrorKind, Fault, Location, VmError, VmResult};
pub use value::{ObjectRef, Value};
