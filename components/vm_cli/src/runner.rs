//! Runtime orchestration for program execution
//!
//! [`Runner`] owns a [`Universe`] that has been through genesis and drives
//! the loader and interpreter for one image file.

use std::io::Write;
use std::path::Path;

use code_loader::{BufferedInputStream, SourceError};
use core_types::{Value, VmError};
use interpreter::{render_value, RuntimeConfig, Universe};
use tracing::info;

use crate::error::{CliError, CliResult};

/// Executes program images against a single runtime
pub struct Runner {
    universe: Universe,
}

impl Runner {
    /// Create a runner whose programs print to stdout
    ///
    /// # Errors
    /// Returns `CliError::Config` if the configuration is inconsistent
    ///
    /// # Example
    /// ```
    /// use interpreter::RuntimeConfig;
    /// use vm_cli::Runner;
    ///
    /// let runner = Runner::new(RuntimeConfig::default()).unwrap();
    /// assert!(runner.universe().is_initialized());
    /// ```
    pub fn new(config: RuntimeConfig) -> CliResult<Self> {
        Self::start(Universe::new(), config)
    }

    /// Create a runner whose programs print to `out`
    pub fn with_output(config: RuntimeConfig, out: impl Write + 'static) -> CliResult<Self> {
        Self::start(Universe::new().with_output(out), config)
    }

    fn start(mut universe: Universe, config: RuntimeConfig) -> CliResult<Self> {
        config.validate().map_err(CliError::Config)?;
        universe.genesis(config)?;
        Ok(Self { universe })
    }

    /// Load and run the image at `path`
    ///
    /// # Returns
    /// The value the program halted with
    ///
    /// # Errors
    /// Returns `CliError` if the file cannot be opened, does not load, or
    /// faults while running
    pub fn execute_file(&mut self, path: &Path) -> CliResult<Value> {
        let mut source = BufferedInputStream::open(path).map_err(|e| match e {
            SourceError::Io { source, .. } => CliError::io(path, source),
            other => CliError::Vm(VmError::malformed(0, other.to_string())),
        })?;
        self.universe.load(&mut source)?;
        info!(path = %path.display(), "running");
        Ok(self.universe.run()?)
    }

    /// Render a value the way `print` would
    pub fn render(&self, value: Value) -> String {
        match self.universe.heap() {
            Some(heap) => render_value(heap, value),
            None => value.to_string(),
        }
    }

    /// The runtime this runner drives
    pub fn universe(&self) -> &Universe {
        &self.universe
    }
}
