//! Runtime value representation.
//!
//! Primitive values are stored inline; everything else lives on the managed
//! heap and is referenced through an [`ObjectRef`] handle.

use std::fmt;

/// Handle to an object owned by the managed heap.
///
/// A handle is an arena slot index plus the generation the slot had when the
/// object was allocated. Once the collector reclaims the slot its generation
/// moves on, so a stale handle resolves to nothing instead of aliasing
/// whatever object reuses the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectRef {
    /// Slot index in the heap arena
    pub index: u32,
    /// Slot generation at allocation time
    pub generation: u32,
}

impl ObjectRef {
    /// Create a handle from its raw parts
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.index, self.generation)
    }
}

/// A value manipulated by the interpreter.
///
/// # Examples
///
/// ```
/// use core_types::{ObjectRef, Value};
///
/// let nil = Value::Nil;
/// let number = Value::Int(42);
/// let float = Value::Float(0.5);
/// let object = Value::Ref(ObjectRef::new(3, 0));
///
/// assert!(!nil.is_truthy());
/// assert!(number.is_truthy());
/// assert_eq!(float.type_name(), "float");
/// assert_eq!(object.as_ref(), Some(ObjectRef::new(3, 0)));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Value {
    /// Absence of a value
    #[default]
    Nil,
    /// Boolean
    Bool(bool),
    /// 64-bit signed integer
    Int(i64),
    /// IEEE 754 double-precision float
    Float(f64),
    /// Reference to a heap object
    Ref(ObjectRef),
}

impl Value {
    /// Returns whether this value counts as true in a conditional jump.
    ///
    /// `nil`, `false`, integer zero and float zero/NaN are falsy; every heap
    /// reference is truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Nil => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(n) => !n.is_nan() && *n != 0.0,
            Value::Ref(_) => true,
        }
    }

    /// Short name of the value's inline type, used in fault messages.
    ///
    /// Heap references report `"ref"`; the interpreter refines this with the
    /// object kind when it has access to the heap.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Ref(_) => "ref",
        }
    }

    /// Returns the heap handle if this value is a reference
    pub fn as_ref(&self) -> Option<ObjectRef> {
        match self {
            Value::Ref(r) => Some(*r),
            _ => None,
        }
    }

    /// Returns the integer payload, if any
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns whether the value is stored inline (not a heap reference)
    pub fn is_primitive(&self) -> bool {
        !matches!(self, Value::Ref(_))
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<ObjectRef> for Value {
    fn from(r: ObjectRef) -> Self {
        Value::Ref(r)
    }
}

/// Displays primitives the way `print` shows them. References print as their
/// handle because their contents live on the heap.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(n) => {
                if n.fract() == 0.0 && n.is_finite() && n.abs() < 1e15 {
                    write!(f, "{:.1}", n)
                } else {
                    write!(f, "{}", n)
                }
            }
            Value::Ref(r) => write!(f, "<object {}>", r),
        }
    }
}
