//! The loaded form of a program

use std::collections::HashMap;

use bytecode_system::{CodeSpec, Constant, Program};
use core_types::{Fault, ObjectRef, Value, VmError, VmResult};
use memory_manager::{CodeObject, Heap, HeapObject, Trace, Tracer};

/// A program whose constants have been materialized on the heap
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramImage {
    /// Format version read from the header
    pub version: u16,
    /// Program name from the NAME section
    pub name: Option<String>,
    /// One heap object per pool entry, in file order
    pub constants: Vec<ObjectRef>,
    /// Pool index of the entry code object
    pub entry_index: u32,
}

impl ProgramImage {
    /// Number of entries in the constant pool
    pub fn pool_size(&self) -> usize {
        self.constants.len()
    }

    /// Handle of the entry code object
    pub fn entry(&self) -> ObjectRef {
        self.constants[self.entry_index as usize]
    }

    /// Handle of the constant at `index`, checked against the pool bounds
    pub fn constant(&self, index: u32) -> VmResult<ObjectRef> {
        self.constants
            .get(index as usize)
            .copied()
            .ok_or_else(|| {
                VmError::fault(Fault::ConstantIndexOutOfBounds {
                    index,
                    pool_size: self.constants.len(),
                })
            })
    }

    /// Read the pool back into serializable form.
    ///
    /// Inverse of loading: encoding the result reproduces the constant pool,
    /// name and entry of the original image (DEBUG sections are not kept).
    pub fn to_program(&self, heap: &Heap) -> VmResult<Program> {
        let positions: HashMap<ObjectRef, u32> = self
            .constants
            .iter()
            .enumerate()
            .map(|(i, r)| (*r, i as u32))
            .collect();
        let index_of = |value: &Value| -> VmResult<u32> {
            value
                .as_ref()
                .and_then(|r| positions.get(&r).copied())
                .ok_or_else(|| {
                    VmError::fault(Fault::TypeMismatch {
                        expected: "constant pool reference",
                        found: value.to_string(),
                    })
                })
        };

        let mut constants = Vec::with_capacity(self.constants.len());
        for handle in &self.constants {
            let constant = match heap.resolve(*handle)? {
                HeapObject::Boxed(Value::Nil) => Constant::Nil,
                HeapObject::Boxed(Value::Bool(b)) => Constant::Bool(*b),
                HeapObject::Boxed(Value::Int(n)) => Constant::Int(*n),
                HeapObject::Boxed(Value::Float(n)) => Constant::Float(*n),
                HeapObject::String(s) => Constant::Str(s.clone()),
                HeapObject::Tuple(items) => {
                    Constant::Tuple(items.iter().map(index_of).collect::<VmResult<_>>()?)
                }
                HeapObject::Code(code) => Constant::Code(CodeSpec {
                    name: index_of(&Value::Ref(code.name))?,
                    arity: code.arity,
                    locals: code.locals,
                    instructions: code.instructions.clone(),
                }),
                other => {
                    return Err(VmError::fault(Fault::TypeMismatch {
                        expected: "constant",
                        found: other.type_name().to_string(),
                    }))
                }
            };
            constants.push(constant);
        }

        Ok(Program {
            name: self.name.clone(),
            constants,
            entry: self.entry_index,
            debug: Vec::new(),
        })
    }

    /// Entry code object
    pub fn entry_code<'h>(&self, heap: &'h Heap) -> VmResult<&'h CodeObject> {
        match heap.resolve(self.entry())? {
            HeapObject::Code(code) => Ok(code),
            other => Err(VmError::fault(Fault::TypeMismatch {
                expected: "code",
                found: other.type_name().to_string(),
            })),
        }
    }
}

impl Trace for ProgramImage {
    fn trace(&self, tracer: &mut dyn Tracer) {
        self.constants.trace(tracer);
    }
}
