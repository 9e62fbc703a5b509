//! Error taxonomy for the loader, the heap and the interpreter.
//!
//! Every failure the core can report is a [`VmError`]. Each variant carries
//! enough context (byte offset, instruction pointer, expected vs. actual) to
//! diagnose the problem without re-running the program.

use std::fmt;

use thiserror::Error;

/// Result alias used throughout the core crates.
pub type VmResult<T> = std::result::Result<T, VmError>;

/// Taxonomy category of a [`VmError`].
///
/// Each category maps to a distinct process exit status so scripts can tell
/// input errors from runtime faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The byte source could not supply the requested data
    IoFailure,
    /// The program image is structurally invalid
    MalformedInput,
    /// A core operation ran before genesis, or genesis ran twice
    Lifecycle,
    /// The heap could not satisfy an allocation after collecting
    OutOfMemory,
    /// The interpreter faulted
    InvalidOperation,
}

impl ErrorKind {
    /// Process exit status reported for this category
    pub fn exit_code(self) -> i32 {
        match self {
            ErrorKind::IoFailure => 3,
            ErrorKind::MalformedInput => 4,
            ErrorKind::Lifecycle => 5,
            ErrorKind::OutOfMemory => 6,
            ErrorKind::InvalidOperation => 7,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::IoFailure => "I/O failure",
            ErrorKind::MalformedInput => "malformed input",
            ErrorKind::Lifecycle => "lifecycle error",
            ErrorKind::OutOfMemory => "out of memory",
            ErrorKind::InvalidOperation => "invalid operation",
        };
        f.write_str(name)
    }
}

/// Where in the running program a fault happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    /// Name of the code object executing the instruction
    pub function: String,
    /// Index of the faulting instruction within that code object
    pub ip: usize,
    /// Call depth (1 for the entry frame)
    pub depth: usize,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{} (depth {})", self.function, self.ip, self.depth)
    }
}

/// Reason an instruction could not execute.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Fault {
    /// Popped from an empty operand stack segment
    #[error("operand stack underflow")]
    StackUnderflow,
    /// Operand stack grew past its configured limit
    #[error("operand stack overflow (limit {limit})")]
    StackOverflow {
        /// Configured maximum number of operands
        limit: usize,
    },
    /// Call depth grew past its configured limit
    #[error("call depth exceeded (limit {limit})")]
    CallDepthExceeded {
        /// Configured maximum number of frames
        limit: usize,
    },
    /// Constant pool index outside the pool
    #[error("constant index {index} out of bounds (pool size {pool_size})")]
    ConstantIndexOutOfBounds {
        /// Requested index
        index: u32,
        /// Number of constants in the pool
        pool_size: usize,
    },
    /// Local slot outside the frame's locals
    #[error("local slot {index} out of bounds ({locals} locals)")]
    LocalIndexOutOfBounds {
        /// Requested slot
        index: u16,
        /// Number of locals in the frame
        locals: usize,
    },
    /// Field or element index outside the object
    #[error("index {index} out of bounds (length {len})")]
    IndexOutOfBounds {
        /// Requested index
        index: i64,
        /// Length of the object
        len: usize,
    },
    /// Operand had the wrong type
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        /// What the instruction needed
        expected: &'static str,
        /// What it got
        found: String,
    },
    /// Jump or fall-through left the code object
    #[error("instruction pointer {ip} outside code of length {len}")]
    InstructionPointerOutOfBounds {
        /// Target instruction pointer
        ip: usize,
        /// Number of instructions in the code object
        len: usize,
    },
    /// Call supplied a different number of arguments than the callee declares
    #[error("arity mismatch calling {callee}: expected {expected}, got {found}")]
    ArityMismatch {
        /// Callee name
        callee: String,
        /// Declared arity
        expected: u8,
        /// Supplied arguments
        found: u8,
    },
    /// Integer division or remainder by zero
    #[error("division by zero")]
    DivisionByZero,
    /// Checked integer arithmetic overflowed
    #[error("integer overflow in {op}")]
    ArithmeticOverflow {
        /// Operation name
        op: &'static str,
    },
    /// Global read before any store
    #[error("undefined global '{name}'")]
    UndefinedGlobal {
        /// Global name
        name: String,
    },
    /// Intrinsic name not present in the intrinsic table
    #[error("unknown intrinsic '{name}'")]
    UnknownIntrinsic {
        /// Intrinsic name
        name: String,
    },
    /// Intrinsic disabled by the runtime's deny list
    #[error("intrinsic '{name}' is denied by policy")]
    IntrinsicDenied {
        /// Intrinsic name
        name: String,
    },
    /// The `assert` intrinsic received a falsy value
    #[error("assertion failed")]
    AssertionFailed,
    /// A handle no longer resolves to a live object
    #[error("dangling reference {reference}")]
    DanglingReference {
        /// The stale handle, formatted
        reference: String,
    },
    /// An intrinsic could not write to the output sink
    #[error("output error: {message}")]
    Output {
        /// Underlying error text
        message: String,
    },
    /// `run` called with no program loaded
    #[error("no program loaded")]
    NoProgram,
}

/// Every failure the core can report.
#[derive(Debug, Error)]
pub enum VmError {
    /// The byte source failed while reading
    #[error("I/O failure at byte {offset}: {source}")]
    IoFailure {
        /// Byte offset of the failed read
        offset: u64,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The program image does not conform to the binary format
    #[error("malformed input at byte {offset}: {reason}")]
    MalformedInput {
        /// Byte offset at which the problem was detected
        offset: u64,
        /// What was wrong
        reason: String,
    },

    /// A core operation was invoked before genesis
    #[error("runtime not initialized: {operation} called before genesis")]
    NotInitialized {
        /// Name of the operation
        operation: &'static str,
    },

    /// Genesis was invoked on an initialized runtime
    #[error("runtime already initialized")]
    AlreadyInitialized,

    /// The heap could not satisfy an allocation, even after collecting
    #[error(
        "out of memory: requested {requested} bytes with {live_bytes} live of {capacity}{}",
        fmt_location(.location)
    )]
    OutOfMemory {
        /// Bytes requested by the failed allocation
        requested: usize,
        /// Bytes still live after the collection attempt
        live_bytes: usize,
        /// Configured heap capacity
        capacity: usize,
        /// Faulting instruction, when raised during execution
        location: Option<Location>,
    },

    /// The interpreter faulted
    #[error("invalid operation: {fault}{}", fmt_location(.location))]
    InvalidOperation {
        /// What went wrong
        fault: Fault,
        /// Faulting instruction, when known
        location: Option<Location>,
    },
}

fn fmt_location(location: &Option<Location>) -> String {
    match location {
        Some(loc) => format!(" at {}", loc),
        None => String::new(),
    }
}

impl VmError {
    /// Build a [`VmError::MalformedInput`]
    pub fn malformed(offset: u64, reason: impl Into<String>) -> Self {
        VmError::MalformedInput {
            offset,
            reason: reason.into(),
        }
    }

    /// Build a [`VmError::InvalidOperation`] with no location yet
    pub fn fault(fault: Fault) -> Self {
        VmError::InvalidOperation {
            fault,
            location: None,
        }
    }

    /// Taxonomy category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            VmError::IoFailure { .. } => ErrorKind::IoFailure,
            VmError::MalformedInput { .. } => ErrorKind::MalformedInput,
            VmError::NotInitialized { .. } | VmError::AlreadyInitialized => ErrorKind::Lifecycle,
            VmError::OutOfMemory { .. } => ErrorKind::OutOfMemory,
            VmError::InvalidOperation { .. } => ErrorKind::InvalidOperation,
        }
    }

    /// Attach the faulting instruction if none is recorded yet.
    ///
    /// Errors raised deep inside the heap do not know which instruction was
    /// executing; the interpreter fills that in on the way out.
    pub fn at(mut self, here: Location) -> Self {
        match &mut self {
            VmError::OutOfMemory { location, .. } | VmError::InvalidOperation { location, .. } => {
                if location.is_none() {
                    *location = Some(here);
                }
            }
            _ => {}
        }
        self
    }

    /// The interpreter fault, if this is an [`VmError::InvalidOperation`]
    pub fn as_fault(&self) -> Option<&Fault> {
        match self {
            VmError::InvalidOperation { fault, .. } => Some(fault),
            _ => None,
        }
    }

    /// The recorded location, if any
    pub fn location(&self) -> Option<&Location> {
        match self {
            VmError::OutOfMemory { location, .. } | VmError::InvalidOperation { location, .. } => {
                location.as_ref()
            }
            _ => None,
        }
    }
}

impl From<Fault> for VmError {
    fn from(fault: Fault) -> Self {
        VmError::fault(fault)
    }
}
