//! Memory Manager - managed heap and garbage collector
//!
//! This component provides:
//! - An arena of [`HeapObject`]s addressed by generation-checked [`ObjectRef`] handles
//! - Byte accounting against a fixed capacity with a growing collection threshold
//! - A stop-the-world mark-sweep collector driven by the [`Trace`] contract
//!
//! Every allocation takes the caller's extra roots, so an object under
//! construction and the values feeding it survive any collection the
//! allocation triggers.
//!
//! [`ObjectRef`]: core_types::ObjectRef

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod gc;
pub mod heap;
pub mod object;
pub mod trace;

// Re-export main types
pub use config::HeapConfig;
pub use gc::GcStats;
pub use heap::Heap;
pub use object::{CodeObject, HeapObject, HEADER_SIZE, INSTRUCTION_SIZE, VALUE_SIZE};
pub use trace::{NoRoots, Trace, Tracer};
