//! Heap and interpreter integration tests
//!
//! Collection properties observed through the runtime state.

use core_types::{ErrorKind, Value, VmError};
use integration_tests::{booted, image_source, programs};
use interpreter::{InterpreterConfig, RuntimeConfig, Universe};
use memory_manager::{HeapConfig, HeapObject};

fn small_heap(capacity: usize, threshold: usize) -> RuntimeConfig {
    RuntimeConfig::default().with_heap(
        HeapConfig::default()
            .with_capacity(capacity)
            .with_initial_threshold(threshold),
    )
}

/// Test: nothing can be allocated, loaded or collected before genesis
#[test]
fn test_pre_genesis_operations_allocate_nothing() {
    let mut universe = Universe::new();

    let load = universe.load(&mut image_source(programs::PUSH_42));
    assert!(matches!(load, Err(VmError::NotInitialized { operation: "load" })));
    let run = universe.run();
    assert!(matches!(run, Err(VmError::NotInitialized { operation: "run" })));
    let alloc = universe.allocate(HeapObject::Boxed(Value::Int(1)));
    assert_eq!(alloc.unwrap_err().kind(), ErrorKind::Lifecycle);
    assert!(universe.gc().is_err());
    assert!(universe.heap().is_none());

    universe.genesis(RuntimeConfig::default()).unwrap();
    let heap = universe.heap().unwrap();
    assert_eq!(heap.live_objects(), 0);
    assert_eq!(heap.collections(), 0);
}

/// Test: a second collection with no mutation in between reclaims nothing
#[test]
fn test_collection_is_idempotent() {
    let mut universe = booted(programs::CHURN, RuntimeConfig::default());
    universe.run().unwrap();

    let first = universe.gc().unwrap();
    let live_after_first = universe.heap().unwrap().live_refs();
    let second = universe.gc().unwrap();

    assert_eq!(second.reclaimed_objects, 0);
    assert_eq!(second.reclaimed_bytes, 0);
    assert_eq!(second.live_objects, first.live_objects);
    assert_eq!(second.live_bytes, first.live_bytes);
    assert_eq!(universe.heap().unwrap().live_refs(), live_after_first);
}

/// Test: after a run and a collection, every live object is reachable
#[test]
fn test_only_reachable_objects_survive() {
    let mut universe = booted(programs::CHURN, small_heap(64 * 1024, 4 * 1024));
    let result = universe.run().unwrap();
    universe.gc().unwrap();

    let heap = universe.heap().unwrap();
    assert_eq!(heap.live_refs(), universe.reachable().unwrap());

    // The last record survives as the program's result
    let last = result.as_ref().unwrap();
    match heap.get(last) {
        Some(HeapObject::Record(fields)) => assert_eq!(fields[0], Value::Int(1)),
        other => panic!("expected a record, found {:?}", other),
    }
    // Pool plus the result record
    assert_eq!(heap.live_objects(), universe.image().unwrap().pool_size() + 1);
}

/// Test: short-lived garbage never exhausts a heap far smaller than the total allocated
#[test]
fn test_churn_fits_small_heap() {
    let mut universe = booted(programs::CHURN, small_heap(8 * 1024, 1024));
    universe.run().unwrap();
    let heap = universe.heap().unwrap();

    assert!(heap.collections() > 2);
    assert!(heap.bytes_in_use() <= 8 * 1024);
}

/// Test: unbounded live allocation fails with OutOfMemory after collecting
#[test]
fn test_hoarding_runs_out_of_memory() {
    let mut universe = booted(programs::HOARD, small_heap(32 * 1024, 1024));
    let collections_before = universe.heap().unwrap().collections();

    let error = universe.run().unwrap_err();
    match &error {
        VmError::OutOfMemory {
            requested,
            live_bytes,
            capacity,
            location,
        } => {
            assert_eq!(*capacity, 32 * 1024);
            assert!(live_bytes + requested > *capacity);
            assert_eq!(location.as_ref().unwrap().function, "main");
        }
        other => panic!("expected OutOfMemory, got {}", other),
    }
    assert!(universe.heap().unwrap().collections() > collections_before);
}

/// Test: collections triggered by the periodic check keep the operand stack alive
#[test]
fn test_periodic_collection_preserves_stack() {
    let source = "
        func main 0 1
            push 1
            push 2
            tuple 2
            push 300
            store 0
        top:
            load 0
            jump_if_false done
            push 9
            box
            pop
            load 0
            push 1
            sub
            store 0
            jump top
        done:
            get_field 1
            halt
        end
        entry main";
    let config = small_heap(16 * 1024, 512)
        .with_interpreter(InterpreterConfig::default().with_gc_check_interval(7));
    let mut universe = booted(source, config);

    assert_eq!(universe.run().unwrap(), Value::Int(2));
    assert!(universe.heap().unwrap().collections() > 1);
}
