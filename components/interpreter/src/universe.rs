//! Runtime state: the heap, the loaded program and everything a run needs
//!
//! A [`Universe`] starts uninitialized. [`Universe::genesis`] builds the
//! heap, the intrinsic table and the globals; every other operation before
//! that fails with `NotInitialized` and touches nothing.

use std::collections::HashMap;
use std::fmt;
use std::io::{self, Write};

use code_loader::{BinaryFileParser, ByteSource, ProgramImage};
use core_types::{Fault, ObjectRef, Value, VmError, VmResult};
use memory_manager::{GcStats, Heap, HeapObject, Trace, Tracer};
use tracing::{debug, info};

use crate::config::RuntimeConfig;
use crate::intrinsics::IntrinsicTable;
use crate::state::ExecutionState;
use crate::vm::{ExecEnv, Interpreter};

/// State that exists once genesis has run
struct Runtime {
    config: RuntimeConfig,
    heap: Heap,
    intrinsics: IntrinsicTable,
    globals: HashMap<String, Value>,
    interpreter: Interpreter,
    image: Option<ProgramImage>,
}

/// Root set outside a run
struct UniverseRoots<'a> {
    image: Option<&'a ProgramImage>,
    globals: &'a HashMap<String, Value>,
    interpreter: &'a Interpreter,
}

impl<'a> UniverseRoots<'a> {
    fn new(
        image: Option<&'a ProgramImage>,
        globals: &'a HashMap<String, Value>,
        interpreter: &'a Interpreter,
    ) -> Self {
        Self {
            image,
            globals,
            interpreter,
        }
    }
}

impl Trace for UniverseRoots<'_> {
    fn trace(&self, tracer: &mut dyn Tracer) {
        self.image.trace(tracer);
        for value in self.globals.values() {
            value.trace(tracer);
        }
        self.interpreter.stack.trace(tracer);
        for frame in &self.interpreter.frames {
            tracer.mark(frame.code);
        }
    }
}

/// The process-wide runtime state
///
/// # Example
///
/// ```
/// use bytecode_system::assemble;
/// use code_loader::BufferedInputStream;
/// use core_types::Value;
/// use interpreter::{RuntimeConfig, Universe};
///
/// let bytes = assemble("func main 0 0\n push 42\n halt\nend\nentry main")
///     .unwrap()
///     .to_bytes();
///
/// let mut universe = Universe::new();
/// universe.genesis(RuntimeConfig::default()).unwrap();
/// universe
///     .load(&mut BufferedInputStream::from_bytes(bytes).unwrap())
///     .unwrap();
/// assert_eq!(universe.run().unwrap(), Value::Int(42));
/// ```
pub struct Universe {
    runtime: Option<Runtime>,
    out: Box<dyn Write>,
}

impl Universe {
    /// Create an uninitialized universe writing to stdout
    pub fn new() -> Self {
        Self {
            runtime: None,
            out: Box::new(io::stdout()),
        }
    }

    /// Send `print` output to `out` instead of stdout
    pub fn with_output(mut self, out: impl Write + 'static) -> Self {
        self.out = Box::new(out);
        self
    }

    /// Whether genesis has run
    pub fn is_initialized(&self) -> bool {
        self.runtime.is_some()
    }

    /// Initialize the heap, intrinsics and globals.
    ///
    /// The configuration is taken as is; callers validate it first.
    ///
    /// # Errors
    ///
    /// `AlreadyInitialized` if genesis has already run.
    pub fn genesis(&mut self, config: RuntimeConfig) -> VmResult<()> {
        if self.runtime.is_some() {
            return Err(VmError::AlreadyInitialized);
        }

        let heap = Heap::with_config(config.heap.clone());
        let intrinsics = IntrinsicTable::with_denied(config.denied_intrinsics.iter().cloned());
        let interpreter = Interpreter::new(config.interpreter.clone());
        info!(
            capacity = config.heap.capacity_bytes,
            max_call_depth = config.interpreter.max_call_depth,
            denied = config.denied_intrinsics.len(),
            "genesis"
        );

        self.runtime = Some(Runtime {
            config,
            heap,
            intrinsics,
            globals: HashMap::new(),
            interpreter,
            image: None,
        });
        Ok(())
    }

    /// Parse a program image from `source` and make it the current program.
    ///
    /// The previous program, if any, stays current when parsing fails.
    ///
    /// # Errors
    ///
    /// `NotInitialized` before genesis, otherwise whatever the parser
    /// reports.
    pub fn load(&mut self, source: &mut dyn ByteSource) -> VmResult<()> {
        let rt = self.runtime_mut("load")?;

        let image = {
            let roots = UniverseRoots::new(rt.image.as_ref(), &rt.globals, &rt.interpreter);
            BinaryFileParser::new(source).parse_with_roots(&mut rt.heap, &roots)?
        };

        if let Some(previous) = rt.image.take() {
            rt.heap.unpin(previous.entry());
        }
        rt.heap.pin(image.entry());
        info!(
            name = image.name.as_deref().unwrap_or("<unnamed>"),
            constants = image.pool_size(),
            "program loaded"
        );
        rt.image = Some(image);

        if rt.config.collect_after_load {
            let roots = UniverseRoots::new(rt.image.as_ref(), &rt.globals, &rt.interpreter);
            let stats = rt.heap.collect(&roots);
            debug!(reclaimed = stats.reclaimed_objects, "post-load collection");
        }
        Ok(())
    }

    /// Run the current program to completion.
    ///
    /// # Errors
    ///
    /// `NotInitialized` before genesis, `InvalidOperation` with
    /// [`Fault::NoProgram`] if nothing is loaded, and any fault or
    /// `OutOfMemory` raised while executing.
    pub fn run(&mut self) -> VmResult<Value> {
        let Self { runtime, out } = self;
        let rt = runtime
            .as_mut()
            .ok_or(VmError::NotInitialized { operation: "run" })?;
        let image = rt.image.as_ref().ok_or(Fault::NoProgram)?;

        let mut env = ExecEnv {
            heap: &mut rt.heap,
            image,
            globals: &mut rt.globals,
            intrinsics: &rt.intrinsics,
            out: &mut **out,
        };
        let result = rt.interpreter.run(&mut env);
        let flushed = out.flush();
        let value = result?;
        flushed.map_err(|e| Fault::Output {
            message: e.to_string(),
        })?;
        Ok(value)
    }

    /// Allocate an object, treating the whole runtime state as roots.
    ///
    /// # Errors
    ///
    /// `NotInitialized` before genesis; `OutOfMemory` if the object does not
    /// fit even after a collection.
    pub fn allocate(&mut self, object: HeapObject) -> VmResult<ObjectRef> {
        let rt = self.runtime_mut("allocate")?;
        let roots = UniverseRoots::new(rt.image.as_ref(), &rt.globals, &rt.interpreter);
        rt.heap.allocate(object, &roots)
    }

    /// Force a full collection.
    ///
    /// # Errors
    ///
    /// `NotInitialized` before genesis.
    pub fn gc(&mut self) -> VmResult<GcStats> {
        let rt = self.runtime_mut("gc")?;
        let roots = UniverseRoots::new(rt.image.as_ref(), &rt.globals, &rt.interpreter);
        Ok(rt.heap.collect(&roots))
    }

    /// Objects reachable from the runtime roots, in slot order
    pub fn reachable(&self) -> VmResult<Vec<ObjectRef>> {
        let rt = self.runtime("reachable")?;
        let roots = UniverseRoots::new(rt.image.as_ref(), &rt.globals, &rt.interpreter);
        Ok(rt.heap.reachable(&roots))
    }

    /// Bind a global variable
    pub fn set_global(&mut self, name: impl Into<String>, value: Value) -> VmResult<()> {
        self.runtime_mut("set_global")?
            .globals
            .insert(name.into(), value);
        Ok(())
    }

    /// Read a global variable
    pub fn global(&self, name: &str) -> Option<Value> {
        self.runtime.as_ref()?.globals.get(name).copied()
    }

    /// The heap, once genesis has run
    pub fn heap(&self) -> Option<&Heap> {
        self.runtime.as_ref().map(|rt| &rt.heap)
    }

    /// The current program
    pub fn image(&self) -> Option<&ProgramImage> {
        self.runtime.as_ref()?.image.as_ref()
    }

    /// The interpreter, once genesis has run
    pub fn interpreter(&self) -> Option<&Interpreter> {
        self.runtime.as_ref().map(|rt| &rt.interpreter)
    }

    /// Interpreter state, once genesis has run
    pub fn state(&self) -> Option<ExecutionState> {
        self.interpreter().map(Interpreter::state)
    }

    /// Configuration given to genesis
    pub fn config(&self) -> Option<&RuntimeConfig> {
        self.runtime.as_ref().map(|rt| &rt.config)
    }

    fn runtime(&self, operation: &'static str) -> VmResult<&Runtime> {
        self.runtime
            .as_ref()
            .ok_or(VmError::NotInitialized { operation })
    }

    fn runtime_mut(&mut self, operation: &'static str) -> VmResult<&mut Runtime> {
        self.runtime
            .as_mut()
            .ok_or(VmError::NotInitialized { operation })
    }
}

impl Default for Universe {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Universe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Universe")
            .field("initialized", &self.is_initialized())
            .field("program", &self.image().and_then(|i| i.name.as_deref()))
            .field("state", &self.state())
            .finish()
    }
}
