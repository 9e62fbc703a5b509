//! Tests for the error taxonomy

use core_types::{ErrorKind, Fault, Location, VmError};
use std::error::Error;

#[test]
fn test_io_failure_exposes_source() {
    let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
    let err = VmError::IoFailure {
        offset: 12,
        source: io,
    };
    assert_eq!(err.kind(), ErrorKind::IoFailure);
    assert!(err.source().is_some());
    assert!(err.to_string().contains("byte 12"));
}

#[test]
fn test_malformed_message() {
    let err = VmError::malformed(8, "bad magic");
    assert_eq!(err.to_string(), "malformed input at byte 8: bad magic");
}

#[test]
fn test_fault_conversion() {
    let err: VmError = Fault::DivisionByZero.into();
    assert_eq!(err.as_fault(), Some(&Fault::DivisionByZero));
    assert!(err.location().is_none());
}

#[test]
fn test_at_ignored_for_load_errors() {
    let err = VmError::malformed(0, "x").at(Location {
        function: "main".into(),
        ip: 0,
        depth: 1,
    });
    assert!(err.location().is_none());
}

#[test]
fn test_fault_messages() {
    let fault = Fault::ConstantIndexOutOfBounds {
        index: 3,
        pool_size: 3,
    };
    assert_eq!(
        fault.to_string(),
        "constant index 3 out of bounds (pool size 3)"
    );
    let fault = Fault::TypeMismatch {
        expected: "int",
        found: "string".into(),
    };
    assert_eq!(fault.to_string(), "type mismatch: expected int, found string");
}

#[test]
fn test_error_kind_display() {
    assert_eq!(ErrorKind::OutOfMemory.to_string(), "out of memory");
    assert_eq!(ErrorKind::InvalidOperation.exit_code(), 7);
}
