//! Command-line arguments

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

/// Ember virtual machine
#[derive(Parser, Debug)]
#[command(name = "ember")]
#[command(version, about = "Load and run ember program images")]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// What to do
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Execute a program image
    Run(RunArgs),
    /// Assemble a text source into a program image
    Assemble(AssembleArgs),
    /// Print the constant pool and code of a program image
    Disasm(DisasmArgs),
}

/// Arguments for `ember run`
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Program image to execute
    pub image: PathBuf,

    /// JSON runtime configuration
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Heap capacity in bytes
    #[arg(long, value_name = "BYTES")]
    pub heap_capacity: Option<usize>,

    /// Maximum number of active call frames
    #[arg(long, value_name = "N")]
    pub max_call_depth: Option<usize>,

    /// Disable an intrinsic by name (repeatable)
    #[arg(long = "deny-intrinsic", value_name = "NAME")]
    pub deny_intrinsics: Vec<String>,

    /// Print the value left on the stack when the program halts
    #[arg(long)]
    pub print_result: bool,
}

/// Arguments for `ember assemble`
#[derive(Args, Debug)]
pub struct AssembleArgs {
    /// Assembly source file
    pub source: PathBuf,

    /// Output image path (defaults to the source with an `.embr` extension)
    #[arg(short, long, value_name = "OUT")]
    pub output: Option<PathBuf>,
}

/// Arguments for `ember disasm`
#[derive(Args, Debug)]
pub struct DisasmArgs {
    /// Program image to inspect
    pub image: PathBuf,
}

impl AssembleArgs {
    /// Where the image is written
    pub fn output_path(&self) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| self.source.with_extension("embr"))
    }
}
