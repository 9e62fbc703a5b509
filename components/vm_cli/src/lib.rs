//! Command-line front end for the ember virtual machine
//!
//! Provides argument parsing, logging setup, and the [`Runner`] that ties
//! the loader, runtime state and interpreter together.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cli;
pub mod commands;
pub mod disasm;
pub mod error;
pub mod logging;
pub mod runner;

pub use cli::{Cli, Command};
pub use commands::execute;
pub use error::{CliError, CliResult};
pub use runner::Runner;
