//! Subcommand implementations

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use bytecode_system::{assemble, Program};
use code_loader::{BinaryFileParser, BufferedInputStream, SourceError};
use core_types::VmError;
use interpreter::RuntimeConfig;
use memory_manager::Heap;
use tracing::{debug, info};

use crate::cli::{AssembleArgs, Cli, Command, RunArgs};
use crate::disasm::disassemble;
use crate::error::{CliError, CliResult};
use crate::runner::Runner;

/// Run the selected subcommand, writing its output to stdout
pub fn execute(cli: &Cli) -> CliResult<()> {
    match &cli.command {
        Command::Run(args) => {
            let result = run(args, io::stdout())?;
            if args.print_result {
                println!("{}", result);
            }
        }
        Command::Assemble(args) => {
            assemble_file(args)?;
        }
        Command::Disasm(args) => {
            let listing = disassemble(&read_program(&args.image)?);
            io::stdout()
                .write_all(listing.as_bytes())
                .map_err(|e| CliError::io("<stdout>", e))?;
        }
    }
    Ok(())
}

/// Execute an image with `print` output going to `out`
///
/// # Returns
/// The halting value, rendered
pub fn run(args: &RunArgs, out: impl Write + 'static) -> CliResult<String> {
    let config = load_config(args)?;
    let mut runner = Runner::with_output(config, out)?;
    let value = runner.execute_file(&args.image)?;
    Ok(runner.render(value))
}

/// Build the runtime configuration from the config file and flag overrides
///
/// # Errors
/// Returns `CliError::Io` if the file cannot be read and
/// `CliError::Config` if it does not parse or the result is inconsistent
pub fn load_config(args: &RunArgs) -> CliResult<RuntimeConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = fs::read_to_string(path).map_err(|e| CliError::io(path, e))?;
            serde_json::from_str(&text)
                .map_err(|e| CliError::Config(format!("{}: {}", path.display(), e)))?
        }
        None => RuntimeConfig::default(),
    };

    if let Some(capacity) = args.heap_capacity {
        config.heap.capacity_bytes = capacity;
    }
    if let Some(depth) = args.max_call_depth {
        config.interpreter.max_call_depth = depth;
    }
    config
        .denied_intrinsics
        .extend(args.deny_intrinsics.iter().cloned());

    config.validate().map_err(CliError::Config)?;
    debug!(?config, "runtime configuration");
    Ok(config)
}

/// Assemble a source file and write the image
///
/// # Returns
/// The path written
pub fn assemble_file(args: &AssembleArgs) -> CliResult<PathBuf> {
    let text = fs::read_to_string(&args.source).map_err(|e| CliError::io(&args.source, e))?;
    let program = assemble(&text).map_err(|source| CliError::Assemble {
        path: args.source.clone(),
        source,
    })?;

    let output = args.output_path();
    let bytes = program.to_bytes();
    fs::write(&output, &bytes).map_err(|e| CliError::io(&output, e))?;
    info!(
        output = %output.display(),
        bytes = bytes.len(),
        constants = program.constant_count(),
        "assembled"
    );
    Ok(output)
}

/// Load an image into a scratch heap and read it back
pub fn read_program(path: &Path) -> CliResult<Program> {
    let mut source = BufferedInputStream::open(path).map_err(|e| match e {
        SourceError::Io { source, .. } => CliError::io(path, source),
        other => CliError::Vm(VmError::malformed(0, other.to_string())),
    })?;
    let mut heap = Heap::new();
    let image = BinaryFileParser::new(&mut source).parse(&mut heap)?;
    Ok(image.to_program(&heap)?)
}
