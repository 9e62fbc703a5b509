//! Runtime state and bytecode interpreter for ember
//!
//! This crate provides:
//! - [`Universe`]: the process-wide runtime state created by `genesis`
//! - [`Interpreter`]: a stack machine executing loaded code objects
//! - Intrinsics callable from bytecode, with a configurable deny-list
//!
//! # Example
//!
//! ```
//! use bytecode_system::assemble;
//! use code_loader::BufferedInputStream;
//! use interpreter::{ExecutionState, RuntimeConfig, Universe};
//!
//! let program = assemble(
//!     "const greeting str \"hello\"
//!      func main 0 0
//!        const greeting
//!        intrinsic print 1
//!        halt
//!      end
//!      entry main",
//! )
//! .unwrap();
//!
//! let mut universe = Universe::new().with_output(Vec::new());
//! universe.genesis(RuntimeConfig::default()).unwrap();
//! universe
//!     .load(&mut BufferedInputStream::from_bytes(program.to_bytes()).unwrap())
//!     .unwrap();
//! universe.run().unwrap();
//! assert_eq!(universe.state(), Some(ExecutionState::Halted));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod call_frame;
pub mod config;
mod dispatch;
pub mod intrinsics;
pub mod state;
pub mod universe;
pub mod vm;

// Re-export main types at crate root
pub use call_frame::CallFrame;
pub use config::{InterpreterConfig, RuntimeConfig};
pub use intrinsics::{render_value, Intrinsic, IntrinsicTable, Lookup};
pub use state::ExecutionState;
pub use universe::Universe;
pub use vm::{ExecEnv, Interpreter};
