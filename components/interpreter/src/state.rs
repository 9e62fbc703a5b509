//! Execution states of a single `run`

use std::fmt;

/// Where the interpreter is in its lifecycle.
///
/// `Ready` moves to `Running` when a run starts; `Running` ends in either
/// `Halted` or `Faulted`, both terminal for that run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionState {
    /// Nothing running
    Ready,
    /// Executing instructions
    Running,
    /// Stopped on a fault
    Faulted,
    /// Stopped on `halt` or a top-level return
    Halted,
}

impl ExecutionState {
    /// Whether a run has finished in this state
    pub fn is_terminal(self) -> bool {
        matches!(self, ExecutionState::Faulted | ExecutionState::Halted)
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExecutionState::Ready => "ready",
            ExecutionState::Running => "running",
            ExecutionState::Faulted => "faulted",
            ExecutionState::Halted => "halted",
        };
        f.write_str(name)
    }
}
