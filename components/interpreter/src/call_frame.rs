//! Call frame for function call stack management

use core_types::ObjectRef;

/// One active call.
///
/// Locals live on the shared operand stack at `base..base + locals`; the
/// frame's operands sit above them.
#[derive(Debug, Clone, PartialEq)]
pub struct CallFrame {
    /// Code object being executed
    pub code: ObjectRef,
    /// Index of the next instruction
    pub ip: usize,
    /// Stack index of local slot 0
    pub base: usize,
    /// Number of local slots
    pub locals: usize,
    /// Stack height to restore on return
    pub return_height: usize,
}

impl CallFrame {
    /// Create a frame starting at instruction 0
    pub fn new(code: ObjectRef, base: usize, locals: usize, return_height: usize) -> Self {
        Self {
            code,
            ip: 0,
            base,
            locals,
            return_height,
        }
    }

    /// Lowest stack index this frame may pop
    pub fn operand_floor(&self) -> usize {
        self.base + self.locals
    }
}
