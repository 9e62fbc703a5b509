//! The managed heap
//!
//! Objects live in a vector of slots. A handle is the slot index plus the
//! slot's generation, so handles stay valid for as long as their object is
//! alive and are detectably stale afterwards. Freed slots go on a free list
//! and are reused before the arena grows.

use core_types::{Fault, ObjectRef, Value, VmError, VmResult};
use tracing::{debug, warn};

use crate::config::HeapConfig;
use crate::gc::{self, GcStats};
use crate::object::{HeapObject, VALUE_SIZE};
use crate::trace::Trace;

#[derive(Debug)]
pub(crate) struct Slot {
    pub(crate) generation: u32,
    pub(crate) object: Option<HeapObject>,
}

/// The managed heap.
///
/// # Example
///
/// ```
/// use core_types::Value;
/// use memory_manager::{Heap, HeapObject, NoRoots};
///
/// let mut heap = Heap::new();
/// let greeting = heap.allocate(HeapObject::String("hi".into()), &NoRoots).unwrap();
/// let pair = heap
///     .allocate(HeapObject::Tuple(vec![Value::Ref(greeting), Value::Int(1)]), &NoRoots)
///     .unwrap();
///
/// // Only the tuple is rooted; it keeps the string alive.
/// let stats = heap.collect(&pair);
/// assert_eq!(stats.reclaimed_objects, 0);
///
/// let stats = heap.collect(&NoRoots);
/// assert_eq!(stats.reclaimed_objects, 2);
/// assert!(heap.get(pair).is_none());
/// ```
#[derive(Debug)]
pub struct Heap {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live_objects: usize,
    bytes_in_use: usize,
    threshold: usize,
    config: HeapConfig,
    pinned: Vec<ObjectRef>,
    collections: u64,
    last_collection: Option<GcStats>,
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

impl Heap {
    /// Creates a heap with default sizing
    pub fn new() -> Self {
        Self::with_config(HeapConfig::default())
    }

    /// Creates a heap with the given sizing
    pub fn with_config(config: HeapConfig) -> Self {
        let threshold = config.initial_threshold_bytes.min(config.capacity_bytes);
        Heap {
            slots: Vec::new(),
            free: Vec::new(),
            live_objects: 0,
            bytes_in_use: 0,
            threshold,
            config,
            pinned: Vec::new(),
            collections: 0,
            last_collection: None,
        }
    }

    /// The sizing this heap was created with
    pub fn config(&self) -> &HeapConfig {
        &self.config
    }

    /// Allocates `object` and returns its handle.
    ///
    /// `roots` are traced in addition to the pinned set if the allocation
    /// has to collect first. The object itself is always traced too, so the
    /// values it is built from survive.
    ///
    /// # Errors
    ///
    /// `OutOfMemory` when the object does not fit within the capacity even
    /// after a collection.
    pub fn allocate(&mut self, object: HeapObject, roots: &dyn Trace) -> VmResult<ObjectRef> {
        let size = object.size();
        self.ensure_room(size, &(roots, &object))?;

        let handle = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.object = Some(object);
                ObjectRef::new(index, slot.generation)
            }
            None => {
                let index = u32::try_from(self.slots.len()).map_err(|_| self.out_of_memory(size))?;
                self.slots.push(Slot {
                    generation: 0,
                    object: Some(object),
                });
                ObjectRef::new(index, 0)
            }
        };

        self.live_objects += 1;
        self.bytes_in_use += size;
        Ok(handle)
    }

    /// Appends `value` to the array at `array`, charging the extra slot.
    ///
    /// # Errors
    ///
    /// `OutOfMemory` if the slot does not fit, or an invalid-operation fault
    /// if `array` is dangling or not an array.
    pub fn array_push(&mut self, array: ObjectRef, value: Value, roots: &dyn Trace) -> VmResult<()> {
        match self.get(array) {
            Some(HeapObject::Array(_)) => {}
            Some(other) => {
                return Err(VmError::fault(Fault::TypeMismatch {
                    expected: "array",
                    found: other.type_name().to_string(),
                }))
            }
            None => return Err(dangling(array)),
        }

        self.ensure_room(VALUE_SIZE, &(roots, (array, value)))?;
        match self.get_mut(array) {
            Some(HeapObject::Array(items)) => items.push(value),
            _ => return Err(dangling(array)),
        }
        self.bytes_in_use += VALUE_SIZE;
        Ok(())
    }

    /// Resolves a handle, or `None` if it is stale
    pub fn get(&self, object: ObjectRef) -> Option<&HeapObject> {
        let slot = self.slots.get(object.index as usize)?;
        if slot.generation != object.generation {
            return None;
        }
        slot.object.as_ref()
    }

    /// Resolves a handle for in-place mutation.
    ///
    /// Callers must not change the number of elements through this; growth
    /// goes through [`Heap::array_push`] so it is accounted.
    pub fn get_mut(&mut self, object: ObjectRef) -> Option<&mut HeapObject> {
        let slot = self.slots.get_mut(object.index as usize)?;
        if slot.generation != object.generation {
            return None;
        }
        slot.object.as_mut()
    }

    /// Resolves a handle, faulting if it is stale
    pub fn resolve(&self, object: ObjectRef) -> VmResult<&HeapObject> {
        self.get(object).ok_or_else(|| dangling(object))
    }

    /// Whether the handle names a live object
    pub fn contains(&self, object: ObjectRef) -> bool {
        self.get(object).is_some()
    }

    /// Keeps `object` alive across collections until unpinned
    pub fn pin(&mut self, object: ObjectRef) {
        self.pinned.push(object);
    }

    /// Removes one pin of `object`; returns whether it was pinned
    pub fn unpin(&mut self, object: ObjectRef) -> bool {
        match self.pinned.iter().position(|p| *p == object) {
            Some(pos) => {
                self.pinned.swap_remove(pos);
                true
            }
            None => false,
        }
    }

    /// Currently pinned handles
    pub fn pinned(&self) -> &[ObjectRef] {
        &self.pinned
    }

    /// Runs a full collection with `roots` plus the pinned set as roots.
    ///
    /// Anything not reachable from those is freed. Running it again with the
    /// same roots and no allocation in between frees nothing.
    pub fn collect(&mut self, roots: &dyn Trace) -> GcStats {
        let marks = gc::mark(&self.slots, &(roots, self.pinned.as_slice()));
        let (reclaimed_objects, reclaimed_bytes) = gc::sweep(&mut self.slots, &mut self.free, &marks);

        self.live_objects -= reclaimed_objects;
        self.bytes_in_use -= reclaimed_bytes;
        self.collections += 1;

        let grown = (self.bytes_in_use as f64 * self.config.growth_factor) as usize;
        self.threshold = grown
            .max(self.config.initial_threshold_bytes)
            .min(self.config.capacity_bytes);

        let stats = GcStats {
            collection: self.collections,
            reclaimed_objects,
            reclaimed_bytes,
            live_objects: self.live_objects,
            live_bytes: self.bytes_in_use,
        };
        debug!(
            collection = stats.collection,
            reclaimed_objects,
            reclaimed_bytes,
            live_objects = stats.live_objects,
            live_bytes = stats.live_bytes,
            threshold = self.threshold,
            "garbage collection finished"
        );
        self.last_collection = Some(stats);
        stats
    }

    /// Collects only if the heap is over its threshold
    pub fn collect_if_needed(&mut self, roots: &dyn Trace) -> Option<GcStats> {
        if self.bytes_in_use > self.threshold {
            Some(self.collect(roots))
        } else {
            None
        }
    }

    /// Handles reachable from `roots` plus the pinned set, in slot order
    pub fn reachable(&self, roots: &dyn Trace) -> Vec<ObjectRef> {
        let marks = gc::mark(&self.slots, &(roots, self.pinned.as_slice()));
        self.live_refs()
            .into_iter()
            .filter(|r| marks[r.index as usize])
            .collect()
    }

    /// Handles of every object currently allocated, in slot order
    pub fn live_refs(&self) -> Vec<ObjectRef> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.object.is_some())
            .map(|(index, slot)| ObjectRef::new(index as u32, slot.generation))
            .collect()
    }

    /// Number of objects currently allocated
    pub fn live_objects(&self) -> usize {
        self.live_objects
    }

    /// Accounted bytes currently allocated
    pub fn bytes_in_use(&self) -> usize {
        self.bytes_in_use
    }

    /// Bytes at which the next allocation will collect first
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Number of collections run so far
    pub fn collections(&self) -> u64 {
        self.collections
    }

    /// Stats of the most recent collection
    pub fn last_collection(&self) -> Option<&GcStats> {
        self.last_collection.as_ref()
    }

    fn ensure_room(&mut self, size: usize, roots: &dyn Trace) -> VmResult<()> {
        if self.bytes_in_use + size > self.threshold {
            self.collect(roots);
        }
        // The threshold never exceeds capacity, so reaching here over
        // capacity means a collection has already run.
        if self.bytes_in_use + size > self.config.capacity_bytes {
            warn!(
                requested = size,
                live_bytes = self.bytes_in_use,
                capacity = self.config.capacity_bytes,
                "heap exhausted"
            );
            return Err(self.out_of_memory(size));
        }
        Ok(())
    }

    fn out_of_memory(&self, requested: usize) -> VmError {
        VmError::OutOfMemory {
            requested,
            live_bytes: self.bytes_in_use,
            capacity: self.config.capacity_bytes,
            location: None,
        }
    }
}

fn dangling(object: ObjectRef) -> VmError {
    VmError::fault(Fault::DanglingReference {
        reference: object.to_string(),
    })
}
