//! Reachability contract between the collector and everything that holds references.

use core_types::{ObjectRef, Value};

/// Receives the references discovered while tracing
pub trait Tracer {
    /// Report a reference that must stay alive
    fn mark(&mut self, object: ObjectRef);
}

/// Anything that can report the heap references it holds.
///
/// Implementations must report every reference, including ones inside
/// nested values; a missed reference is reclaimed while still in use.
pub trait Trace {
    /// Report each held reference to `tracer`
    fn trace(&self, tracer: &mut dyn Tracer);
}

/// An empty root set
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRoots;

impl Trace for NoRoots {
    fn trace(&self, _tracer: &mut dyn Tracer) {}
}

impl Trace for ObjectRef {
    fn trace(&self, tracer: &mut dyn Tracer) {
        tracer.mark(*self);
    }
}

impl Trace for Value {
    fn trace(&self, tracer: &mut dyn Tracer) {
        if let Value::Ref(object) = self {
            tracer.mark(*object);
        }
    }
}

impl<T: Trace> Trace for [T] {
    fn trace(&self, tracer: &mut dyn Tracer) {
        for item in self {
            item.trace(tracer);
        }
    }
}

impl<T: Trace> Trace for Vec<T> {
    fn trace(&self, tracer: &mut dyn Tracer) {
        self.as_slice().trace(tracer);
    }
}

impl<T: Trace> Trace for Option<T> {
    fn trace(&self, tracer: &mut dyn Tracer) {
        if let Some(inner) = self {
            inner.trace(tracer);
        }
    }
}

impl<T: Trace + ?Sized> Trace for &T {
    fn trace(&self, tracer: &mut dyn Tracer) {
        (**self).trace(tracer);
    }
}

impl<A: Trace, B: Trace> Trace for (A, B) {
    fn trace(&self, tracer: &mut dyn Tracer) {
        self.0.trace(tracer);
        self.1.trace(tracer);
    }
}

impl<A: Trace, B: Trace, C: Trace> Trace for (A, B, C) {
    fn trace(&self, tracer: &mut dyn Tracer) {
        self.0.trace(tracer);
        self.1.trace(tracer);
        self.2.trace(tracer);
    }
}
