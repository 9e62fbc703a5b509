//! Runtime configuration
//!
//! All structs deserialize with defaults for missing fields, so a config
//! file only needs to mention what it changes.

use memory_manager::HeapConfig;
use serde::{Deserialize, Serialize};

/// Limits and scheduling for the execution loop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterpreterConfig {
    /// Maximum number of active frames
    pub max_call_depth: usize,
    /// Maximum number of values on the operand stack, locals included
    pub max_operand_stack: usize,
    /// Steps between threshold checks for collection (0 disables them)
    pub gc_check_interval: u64,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            max_call_depth: 1024,
            max_operand_stack: 64 * 1024,
            gc_check_interval: 1024,
        }
    }
}

impl InterpreterConfig {
    /// Set the maximum call depth
    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    /// Set the maximum operand stack size
    pub fn with_max_operand_stack(mut self, size: usize) -> Self {
        self.max_operand_stack = size;
        self
    }

    /// Set the number of steps between collection checks
    pub fn with_gc_check_interval(mut self, steps: u64) -> Self {
        self.gc_check_interval = steps;
        self
    }
}

/// Everything [`Universe::genesis`](crate::Universe::genesis) needs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Heap sizing
    pub heap: HeapConfig,
    /// Interpreter limits
    pub interpreter: InterpreterConfig,
    /// Intrinsics that fault instead of running
    pub denied_intrinsics: Vec<String>,
    /// Collect once right after each program load
    pub collect_after_load: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            heap: HeapConfig::default(),
            interpreter: InterpreterConfig::default(),
            denied_intrinsics: Vec::new(),
            collect_after_load: true,
        }
    }
}

impl RuntimeConfig {
    /// Create a config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the heap sizing
    pub fn with_heap(mut self, heap: HeapConfig) -> Self {
        self.heap = heap;
        self
    }

    /// Replace the interpreter limits
    pub fn with_interpreter(mut self, interpreter: InterpreterConfig) -> Self {
        self.interpreter = interpreter;
        self
    }

    /// Deny an intrinsic by name
    pub fn with_denied_intrinsic(mut self, name: impl Into<String>) -> Self {
        self.denied_intrinsics.push(name.into());
        self
    }

    /// Enable or disable the post-load collection
    pub fn with_collect_after_load(mut self, enabled: bool) -> Self {
        self.collect_after_load = enabled;
        self
    }

    /// Describe the first inconsistency, if any
    pub fn validate(&self) -> Result<(), String> {
        self.heap.validate()?;
        if self.interpreter.max_call_depth == 0 {
            return Err("max_call_depth must be at least 1".to_string());
        }
        if self.interpreter.max_operand_stack == 0 {
            return Err("max_operand_stack must be at least 1".to_string());
        }
        Ok(())
    }
}
