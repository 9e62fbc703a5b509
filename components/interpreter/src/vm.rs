//! The interpreter and the environment it runs against

use std::collections::HashMap;
use std::io::Write;

use code_loader::ProgramImage;
use core_types::{Fault, Location, ObjectRef, Value, VmError, VmResult};
use memory_manager::{CodeObject, GcStats, Heap, HeapObject, Trace, Tracer};
use tracing::{info, warn};

use crate::call_frame::CallFrame;
use crate::config::InterpreterConfig;
use crate::intrinsics::IntrinsicTable;
use crate::state::ExecutionState;

/// Everything outside the interpreter that a run touches.
///
/// Borrowed from the [`Universe`](crate::Universe) for the duration of one
/// run, so the interpreter never owns runtime state.
pub struct ExecEnv<'a> {
    /// The managed heap
    pub heap: &'a mut Heap,
    /// Program being executed
    pub image: &'a ProgramImage,
    /// Global variables by name
    pub globals: &'a mut HashMap<String, Value>,
    /// Available intrinsics
    pub intrinsics: &'a IntrinsicTable,
    /// Where `print` writes
    pub out: &'a mut dyn Write,
}

/// The interpreter's view of the root set
pub(crate) struct Roots<'a> {
    pub(crate) stack: &'a [Value],
    pub(crate) frames: &'a [CallFrame],
    pub(crate) globals: &'a HashMap<String, Value>,
    pub(crate) image: &'a ProgramImage,
}

impl Trace for Roots<'_> {
    fn trace(&self, tracer: &mut dyn Tracer) {
        self.stack.trace(tracer);
        for frame in self.frames {
            tracer.mark(frame.code);
        }
        for value in self.globals.values() {
            value.trace(tracer);
        }
        self.image.trace(tracer);
    }
}

/// Separate the heap from the rest of the root set so both can be borrowed
fn split<'e>(
    stack: &'e [Value],
    frames: &'e [CallFrame],
    env: &'e mut ExecEnv<'_>,
) -> (&'e mut Heap, Roots<'e>) {
    let roots = Roots {
        stack,
        frames,
        globals: &*env.globals,
        image: env.image,
    };
    (&mut *env.heap, roots)
}

/// Whether the loop keeps going after an instruction
pub(crate) enum Flow {
    Continue,
    Halt,
}

/// Bytecode interpreter
///
/// Owns the operand stack and the frame chain; everything else comes in
/// through [`ExecEnv`].
///
/// # Example
///
/// ```
/// use std::collections::HashMap;
///
/// use bytecode_system::assemble;
/// use code_loader::{BinaryFileParser, BufferedInputStream};
/// use core_types::Value;
/// use interpreter::{ExecEnv, ExecutionState, Interpreter, InterpreterConfig, IntrinsicTable};
/// use memory_manager::Heap;
///
/// let bytes = assemble("func main 0 0\n push 40\n push 2\n add\n halt\nend\nentry main")
///     .unwrap()
///     .to_bytes();
/// let mut heap = Heap::new();
/// let mut source = BufferedInputStream::from_bytes(bytes).unwrap();
/// let image = BinaryFileParser::new(&mut source).parse(&mut heap).unwrap();
///
/// let mut globals = HashMap::new();
/// let intrinsics = IntrinsicTable::new();
/// let mut out = Vec::new();
/// let mut env = ExecEnv {
///     heap: &mut heap,
///     image: &image,
///     globals: &mut globals,
///     intrinsics: &intrinsics,
///     out: &mut out,
/// };
///
/// let mut interpreter = Interpreter::new(InterpreterConfig::default());
/// assert_eq!(interpreter.run(&mut env).unwrap(), Value::Int(42));
/// assert_eq!(interpreter.state(), ExecutionState::Halted);
/// ```
#[derive(Debug)]
pub struct Interpreter {
    pub(crate) config: InterpreterConfig,
    pub(crate) stack: Vec<Value>,
    pub(crate) frames: Vec<CallFrame>,
    state: ExecutionState,
    transitions: Vec<ExecutionState>,
    steps: u64,
}

impl Interpreter {
    /// Create an interpreter in the `Ready` state
    pub fn new(config: InterpreterConfig) -> Self {
        Self {
            config,
            stack: Vec::new(),
            frames: Vec::new(),
            state: ExecutionState::Ready,
            transitions: vec![ExecutionState::Ready],
            steps: 0,
        }
    }

    /// Current state
    pub fn state(&self) -> ExecutionState {
        self.state
    }

    /// States visited by the most recent run, in order
    pub fn transitions(&self) -> &[ExecutionState] {
        &self.transitions
    }

    /// The operand stack as left by the last run
    pub fn stack(&self) -> &[Value] {
        &self.stack
    }

    /// Number of active frames
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Instructions executed by the most recent run
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// The configured limits
    pub fn config(&self) -> &InterpreterConfig {
        &self.config
    }

    /// Execute the program's entry code until it halts or faults.
    ///
    /// Returns the value on top of the halting frame's operands when the
    /// program halts (`nil` if it has none). Any previous run's stack and frames are
    /// discarded first.
    ///
    /// # Errors
    ///
    /// Faults and heap exhaustion, with the location of the instruction
    /// that raised them.
    pub fn run(&mut self, env: &mut ExecEnv<'_>) -> VmResult<Value> {
        self.stack.clear();
        self.frames.clear();
        self.steps = 0;
        self.transitions.clear();
        self.enter(ExecutionState::Ready);

        self.enter(ExecutionState::Running);
        let outcome = self.start(env).and_then(|()| self.execute(env));

        match outcome {
            Ok(()) => {
                self.enter(ExecutionState::Halted);
                let result = self.result();
                info!(steps = self.steps, result = %result, "program halted");
                Ok(result)
            }
            Err(error) => {
                let error = match self.location(env.heap) {
                    Some(here) => error.at(here),
                    None => error,
                };
                self.enter(ExecutionState::Faulted);
                warn!(steps = self.steps, %error, "program faulted");
                Err(error)
            }
        }
    }

    /// Top of the current frame's operands; locals never count
    fn result(&self) -> Value {
        let floor = self.frames.last().map_or(0, CallFrame::operand_floor);
        if self.stack.len() > floor {
            self.stack.last().copied().unwrap_or(Value::Nil)
        } else {
            Value::Nil
        }
    }

    fn enter(&mut self, state: ExecutionState) {
        self.state = state;
        self.transitions.push(state);
    }

    /// Push the entry frame
    fn start(&mut self, env: &mut ExecEnv<'_>) -> VmResult<()> {
        let entry = env.image.constant(env.image.entry_index)?;
        let code = code_object(env.heap, entry)?;
        if code.arity != 0 {
            return Err(Fault::ArityMismatch {
                callee: function_name(env.heap, entry),
                expected: code.arity,
                found: 0,
            }
            .into());
        }
        let locals = code.locals as usize;
        self.reserve(locals)?;
        self.stack.resize(locals, Value::Nil);
        self.frames.push(CallFrame::new(entry, 0, locals, 0));
        Ok(())
    }

    fn execute(&mut self, env: &mut ExecEnv<'_>) -> VmResult<()> {
        loop {
            if let Flow::Halt = self.step(env)? {
                return Ok(());
            }
            self.steps += 1;
            let interval = self.config.gc_check_interval;
            if interval > 0 && self.steps % interval == 0 {
                self.collect_if_needed(env);
            }
        }
    }

    /// Allocate with the whole interpreter state as roots
    pub(crate) fn allocate(&self, env: &mut ExecEnv<'_>, object: HeapObject) -> VmResult<ObjectRef> {
        let (heap, roots) = split(&self.stack, &self.frames, env);
        heap.allocate(object, &roots)
    }

    /// Full collection with the whole interpreter state as roots
    pub(crate) fn collect(&self, env: &mut ExecEnv<'_>) -> GcStats {
        let (heap, roots) = split(&self.stack, &self.frames, env);
        heap.collect(&roots)
    }

    pub(crate) fn collect_if_needed(&self, env: &mut ExecEnv<'_>) -> Option<GcStats> {
        let (heap, roots) = split(&self.stack, &self.frames, env);
        heap.collect_if_needed(&roots)
    }

    /// Append to an array with the whole interpreter state as roots
    pub(crate) fn array_push(
        &self,
        env: &mut ExecEnv<'_>,
        array: ObjectRef,
        value: Value,
    ) -> VmResult<()> {
        let (heap, roots) = split(&self.stack, &self.frames, env);
        heap.array_push(array, value, &roots)
    }

    /// Make room for `extra` more values on the stack
    pub(crate) fn reserve(&self, extra: usize) -> VmResult<()> {
        if self.stack.len() + extra > self.config.max_operand_stack {
            return Err(Fault::StackOverflow {
                limit: self.config.max_operand_stack,
            }
            .into());
        }
        Ok(())
    }

    pub(crate) fn push(&mut self, value: Value) -> VmResult<()> {
        self.reserve(1)?;
        self.stack.push(value);
        Ok(())
    }

    /// Pop from the current frame's operands, never its locals
    pub(crate) fn pop(&mut self) -> VmResult<Value> {
        let floor = self.frames.last().map_or(0, CallFrame::operand_floor);
        if self.stack.len() <= floor {
            return Err(Fault::StackUnderflow.into());
        }
        self.stack.pop().ok_or_else(|| Fault::StackUnderflow.into())
    }

    /// Pop `n` values, returned in push order
    pub(crate) fn pop_n(&mut self, n: usize) -> VmResult<Vec<Value>> {
        let floor = self.frames.last().map_or(0, CallFrame::operand_floor);
        if self.stack.len() < floor + n {
            return Err(Fault::StackUnderflow.into());
        }
        Ok(self.stack.split_off(self.stack.len() - n))
    }

    pub(crate) fn peek(&self, distance: usize) -> VmResult<Value> {
        let floor = self.frames.last().map_or(0, CallFrame::operand_floor);
        if self.stack.len() <= floor + distance {
            return Err(Fault::StackUnderflow.into());
        }
        Ok(self.stack[self.stack.len() - 1 - distance])
    }

    pub(crate) fn frame(&self) -> VmResult<&CallFrame> {
        self.frames.last().ok_or_else(|| Fault::StackUnderflow.into())
    }

    pub(crate) fn frame_mut(&mut self) -> VmResult<&mut CallFrame> {
        self.frames.last_mut().ok_or_else(|| Fault::StackUnderflow.into())
    }

    /// Location of the instruction the top frame last fetched
    fn location(&self, heap: &Heap) -> Option<Location> {
        let frame = self.frames.last()?;
        Some(Location {
            function: function_name(heap, frame.code),
            ip: frame.ip.saturating_sub(1),
            depth: self.frames.len(),
        })
    }
}

/// Resolve a handle that must name a code object
pub(crate) fn code_object(heap: &Heap, object: ObjectRef) -> VmResult<&CodeObject> {
    match heap.resolve(object)? {
        HeapObject::Code(code) => Ok(code),
        other => Err(VmError::fault(Fault::TypeMismatch {
            expected: "code",
            found: other.type_name().to_string(),
        })),
    }
}

/// Name of a code object, for diagnostics
pub(crate) fn function_name(heap: &Heap, code: ObjectRef) -> String {
    heap.get(code)
        .and_then(HeapObject::as_code)
        .and_then(|code| heap.get(code.name))
        .and_then(HeapObject::as_str)
        .unwrap_or("<unknown>")
        .to_string()
}
