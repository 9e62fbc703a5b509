//! Error types for the CLI

use std::path::PathBuf;

use bytecode_system::AssembleError;
use core_types::VmError;
use thiserror::Error;

/// Exit code for unusable configuration
pub const EXIT_CONFIG: i32 = 8;

/// CLI-specific errors
#[derive(Debug, Error)]
pub enum CliError {
    /// Loading or running the program failed
    #[error(transparent)]
    Vm(#[from] VmError),

    /// A file could not be read or written
    #[error("{}: {source}", path.display())]
    Io {
        /// File involved
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// Assembly source did not assemble
    #[error("{}:{source}", path.display())]
    Assemble {
        /// Source file
        path: PathBuf,
        /// Assembler diagnostic
        source: AssembleError,
    },

    /// Configuration file or flags are unusable
    #[error("configuration error: {0}")]
    Config(String),
}

impl CliError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Vm(e) => e.kind().exit_code(),
            CliError::Io { .. } => 3,
            CliError::Assemble { .. } => 4,
            CliError::Config(_) => EXIT_CONFIG,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CliError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;
