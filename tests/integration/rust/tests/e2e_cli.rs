//! End-to-end tests through the CLI library
//!
//! Images are written to temporary files and run the way `ember run` does.

use std::fs;

use interpreter::RuntimeConfig;
use integration_tests::{image_bytes, programs};
use tempfile::TempDir;
use vm_cli::cli::{AssembleArgs, DisasmArgs, RunArgs};
use vm_cli::commands::{assemble_file, read_program};
use vm_cli::disasm::disassemble;
use vm_cli::{CliError, Runner};

/// Test: an image file on disk runs to its result
#[test]
fn test_run_image_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("fib.embr");
    fs::write(&path, image_bytes(programs::FIB)).unwrap();

    let mut runner = Runner::with_output(RuntimeConfig::default(), std::io::sink()).unwrap();
    let result = runner.execute_file(&path).unwrap();
    assert_eq!(runner.render(result), "610");
}

/// Test: assemble writes an image that disassembles back to the same code
#[test]
fn test_assemble_then_disassemble() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("fib.easm");
    fs::write(&source, programs::FIB).unwrap();

    let image = assemble_file(&AssembleArgs {
        source,
        output: Some(dir.path().join("out.img")),
    })
    .unwrap();
    let args = DisasmArgs { image };
    let listing = disassemble(&read_program(&args.image).unwrap());

    assert!(listing.starts_with("program \"fib\""));
    assert!(listing.contains("fib arity=1 locals=1"));
    assert!(listing.contains("main arity=0 locals=0"));
}

/// Test: exit codes follow the error category
#[test]
fn test_exit_codes_by_category() {
    let dir = TempDir::new().unwrap();
    let garbage = dir.path().join("garbage.embr");
    fs::write(&garbage, b"NOPE").unwrap();

    let mut runner = Runner::new(RuntimeConfig::default()).unwrap();
    let malformed = runner.execute_file(&garbage).unwrap_err();
    assert_eq!(malformed.exit_code(), 4);

    let missing = runner
        .execute_file(&dir.path().join("missing.embr"))
        .unwrap_err();
    assert!(matches!(missing, CliError::Io { .. }));
    assert_eq!(missing.exit_code(), 3);

    let bad_config = RuntimeConfig::default()
        .with_interpreter(interpreter::InterpreterConfig::default().with_max_call_depth(0));
    assert_eq!(Runner::new(bad_config).err().unwrap().exit_code(), 8);
}

/// Test: a run configured entirely from flags
#[test]
fn test_run_command_with_flags() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("p.embr");
    fs::write(&path, image_bytes(programs::PUSH_42)).unwrap();

    let args = RunArgs {
        image: path,
        config: None,
        heap_capacity: Some(1 << 16),
        max_call_depth: Some(8),
        deny_intrinsics: vec!["gc".to_string()],
        print_result: true,
    };
    assert_eq!(vm_cli::commands::run(&args, std::io::sink()).unwrap(), "42");
}
