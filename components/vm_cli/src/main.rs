//! Ember VM CLI
//!
//! Entry point for the `ember` binary. Parses arguments, installs logging
//! and maps the outcome to a process exit code.

use clap::Parser as ClapParser;
use tracing::error;
use vm_cli::logging::init_logging;
use vm_cli::{execute, Cli};

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = execute(&cli) {
        error!(exit_code = e.exit_code(), "command failed");
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}
