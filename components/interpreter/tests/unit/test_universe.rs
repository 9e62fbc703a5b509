//! Runtime state lifecycle and heap interaction

use std::io::{self, Write};

use bytecode_system::assemble;
use code_loader::BufferedInputStream;
use core_types::{ErrorKind, Fault, Value, VmError};
use interpreter::{ExecutionState, RuntimeConfig, Universe};
use memory_manager::{HeapConfig, HeapObject};

use super::{boot, main_with};

#[test]
fn test_not_initialized_allocates_nothing() {
    let mut universe = Universe::new();
    let error = universe
        .allocate(HeapObject::String("early".into()))
        .unwrap_err();
    assert!(matches!(
        error,
        VmError::NotInitialized {
            operation: "allocate"
        }
    ));
    assert_eq!(error.kind(), ErrorKind::Lifecycle);
    assert!(matches!(
        universe.gc(),
        Err(VmError::NotInitialized { operation: "gc" })
    ));

    universe.genesis(RuntimeConfig::default()).unwrap();
    assert_eq!(universe.heap().unwrap().live_objects(), 0);
    assert_eq!(universe.heap().unwrap().bytes_in_use(), 0);
}

#[test]
fn test_state_before_and_after_genesis() {
    let mut universe = Universe::new();
    assert_eq!(universe.state(), None);
    universe.genesis(RuntimeConfig::default()).unwrap();
    assert_eq!(universe.state(), Some(ExecutionState::Ready));
}

#[test]
fn test_load_collects_by_default() {
    let program = assemble(&main_with(0, "halt")).unwrap();
    let (universe, _) = boot(&program, RuntimeConfig::default());
    let heap = universe.heap().unwrap();
    assert_eq!(heap.collections(), 1);
    assert_eq!(heap.live_objects(), universe.image().unwrap().pool_size());
}

#[test]
fn test_load_without_collection() {
    let program = assemble(&main_with(0, "halt")).unwrap();
    let config = RuntimeConfig::default().with_collect_after_load(false);
    let (universe, _) = boot(&program, config);
    assert_eq!(universe.heap().unwrap().collections(), 0);
}

#[test]
fn test_reload_replaces_program() {
    let first = assemble(&main_with(0, "push 1\nhalt")).unwrap();
    let second = assemble(&main_with(0, "push 2\nhalt")).unwrap();
    let (mut universe, _) = boot(&first, RuntimeConfig::default());
    let old_entry = universe.image().unwrap().entry();

    universe
        .load(&mut BufferedInputStream::from_bytes(second.to_bytes()).unwrap())
        .unwrap();
    assert_eq!(universe.run().unwrap(), Value::Int(2));

    let heap = universe.heap().unwrap();
    assert!(!heap.contains(old_entry));
    assert_eq!(heap.pinned(), &[universe.image().unwrap().entry()]);
}

#[test]
fn test_globals_visible_to_program() {
    let program = assemble(&main_with(0, "load_global seed\npush 1\nadd\nstore_global seed\nhalt")).unwrap();
    let (mut universe, _) = boot(&program, RuntimeConfig::default());
    universe.set_global("seed", Value::Int(41)).unwrap();

    universe.run().unwrap();
    assert_eq!(universe.global("seed"), Some(Value::Int(42)));
}

#[test]
fn test_unbounded_allocation_runs_out_of_memory() {
    let body = "array 0\ntop:\ndup\npush 1\nbox\npush_elem\npop\njump top";
    let program = assemble(&main_with(0, body)).unwrap();
    let heap = HeapConfig::default()
        .with_capacity(16 * 1024)
        .with_initial_threshold(2 * 1024);
    let (mut universe, _) = boot(&program, RuntimeConfig::default().with_heap(heap));

    let error = universe.run().unwrap_err();
    assert_eq!(error.kind(), ErrorKind::OutOfMemory);
    assert!(error.location().is_some());
    let heap = universe.heap().unwrap();
    assert!(heap.collections() >= 2);
    assert!(heap.bytes_in_use() <= 16 * 1024);
    assert_eq!(universe.state(), Some(ExecutionState::Faulted));
}

#[test]
fn test_garbage_loop_stays_within_capacity() {
    let body = "push 2000\nstore 0\ntop:\nload 0\njump_if_false done\npush 1\nbox\npop\nload 0\npush 1\nsub\nstore 0\nsafepoint\njump top\ndone:\nhalt";
    let program = assemble(&main_with(1, body)).unwrap();
    let heap = HeapConfig::default()
        .with_capacity(8 * 1024)
        .with_initial_threshold(1024);
    let (mut universe, _) = boot(&program, RuntimeConfig::default().with_heap(heap));

    assert_eq!(universe.run().unwrap(), Value::Nil);
    assert!(universe.heap().unwrap().collections() > 1);
}

#[test]
fn test_run_result_reachable_after_gc() {
    let body = "push 1\npush 2\ntuple 2\npush 3\nbox\npop\nhalt";
    let program = assemble(&main_with(0, body)).unwrap();
    let (mut universe, _) = boot(&program, RuntimeConfig::default());

    let result = universe.run().unwrap();
    let stats = universe.gc().unwrap();
    assert_eq!(stats.reclaimed_objects, 1);

    let reachable = universe.reachable().unwrap();
    let heap = universe.heap().unwrap();
    assert_eq!(heap.live_refs(), reachable);
    assert!(heap.contains(result.as_ref().unwrap()));
}

/// Accepts writes, refuses to flush
struct BrokenFlush;

impl Write for BrokenFlush {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
    }
}

fn boot_broken(body: &str) -> Universe {
    let program = assemble(&main_with(0, body)).unwrap();
    let mut universe = Universe::new().with_output(BrokenFlush);
    universe.genesis(RuntimeConfig::default()).unwrap();
    universe
        .load(&mut BufferedInputStream::from_bytes(program.to_bytes()).unwrap())
        .unwrap();
    universe
}

#[test]
fn test_program_fault_wins_over_flush_failure() {
    let mut universe = boot_broken("push 1\npush 0\ndiv\nhalt");
    let error = universe.run().unwrap_err();
    assert_eq!(error.as_fault(), Some(&Fault::DivisionByZero));
    assert_eq!(universe.state(), Some(ExecutionState::Faulted));
}

#[test]
fn test_flush_failure_after_halt() {
    let mut universe = boot_broken("push 1\nhalt");
    let error = universe.run().unwrap_err();
    assert!(matches!(error.as_fault(), Some(Fault::Output { .. })));
}
