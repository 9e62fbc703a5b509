//! Mark-sweep collection over the slot arena.
//!
//! Marking walks the object graph with an explicit worklist, so graph depth
//! never turns into native stack depth. Sweeping frees every unmarked slot
//! and bumps its generation, which invalidates any handle still naming it.

use core_types::ObjectRef;

use crate::heap::Slot;
use crate::trace::{Trace, Tracer};

/// Outcome of a single collection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcStats {
    /// Sequence number of this collection, starting at 1
    pub collection: u64,
    /// Objects freed by this collection
    pub reclaimed_objects: usize,
    /// Bytes freed by this collection
    pub reclaimed_bytes: usize,
    /// Objects left after the collection
    pub live_objects: usize,
    /// Bytes left after the collection
    pub live_bytes: usize,
}

struct Marker<'a> {
    slots: &'a [Slot],
    marks: Vec<bool>,
    worklist: Vec<ObjectRef>,
}

impl Tracer for Marker<'_> {
    fn mark(&mut self, object: ObjectRef) {
        let index = object.index as usize;
        let Some(slot) = self.slots.get(index) else {
            return;
        };
        if slot.generation != object.generation || slot.object.is_none() || self.marks[index] {
            return;
        }
        self.marks[index] = true;
        self.worklist.push(object);
    }
}

/// Compute the mark bitmap for everything reachable from `roots`.
///
/// Handles that do not name a live slot are ignored.
pub(crate) fn mark(slots: &[Slot], roots: &dyn Trace) -> Vec<bool> {
    let mut marker = Marker {
        slots,
        marks: vec![false; slots.len()],
        worklist: Vec::new(),
    };

    roots.trace(&mut marker);
    while let Some(object) = marker.worklist.pop() {
        if let Some(object) = slots[object.index as usize].object.as_ref() {
            object.trace(&mut marker);
        }
    }
    marker.marks
}

/// Free every occupied, unmarked slot.
///
/// Returns the number of objects and bytes reclaimed.
pub(crate) fn sweep(slots: &mut [Slot], free: &mut Vec<u32>, marks: &[bool]) -> (usize, usize) {
    let mut objects = 0;
    let mut bytes = 0;
    for (index, slot) in slots.iter_mut().enumerate() {
        if marks[index] {
            continue;
        }
        if let Some(object) = slot.object.take() {
            bytes += object.size();
            objects += 1;
            slot.generation = slot.generation.wrapping_add(1);
            free.push(index as u32);
        }
    }
    (objects, bytes)
}
