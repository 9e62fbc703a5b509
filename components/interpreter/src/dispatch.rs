//! Dispatch loop for bytecode execution
//!
//! Handles individual opcode execution. Operands are popped in reverse
//! push order: for `a b sub` the loop pops `b`, then `a`.

use std::cmp::Ordering;

use bytecode_system::Opcode;
use core_types::{Fault, ObjectRef, Value, VmError, VmResult};
use memory_manager::{Heap, HeapObject};
use tracing::trace;

use crate::call_frame::CallFrame;
use crate::intrinsics::{render_value, type_name, Intrinsic, Lookup};
use crate::vm::{code_object, function_name, ExecEnv, Flow, Interpreter};

impl Interpreter {
    /// Fetch, decode and execute one instruction
    pub(crate) fn step(&mut self, env: &mut ExecEnv<'_>) -> VmResult<Flow> {
        let op = self.fetch(env.heap)?;
        trace!(depth = self.frames.len(), stack = self.stack.len(), %op, "step");

        match op {
            Opcode::Nop => {}
            Opcode::LoadConst(index) => {
                let object = env.image.constant(index)?;
                let value = match env.heap.resolve(object)? {
                    HeapObject::Boxed(inner) if inner.is_primitive() => *inner,
                    _ => Value::Ref(object),
                };
                self.push(value)?;
            }
            Opcode::LoadSmall(n) => self.push(Value::Int(i64::from(n)))?,
            Opcode::LoadNil => self.push(Value::Nil)?,
            Opcode::LoadTrue => self.push(Value::Bool(true))?,
            Opcode::LoadFalse => self.push(Value::Bool(false))?,
            Opcode::Pop => {
                self.pop()?;
            }
            Opcode::Dup => {
                let value = self.peek(0)?;
                self.push(value)?;
            }
            Opcode::Swap => {
                self.peek(1)?;
                let len = self.stack.len();
                self.stack.swap(len - 1, len - 2);
            }

            Opcode::LoadLocal(index) => {
                let slot = self.local_slot(index)?;
                let value = self.stack[slot];
                self.push(value)?;
            }
            Opcode::StoreLocal(index) => {
                let value = self.pop()?;
                let slot = self.local_slot(index)?;
                self.stack[slot] = value;
            }
            Opcode::LoadGlobal(index) => {
                let name = string_constant(env, index)?;
                let value = match env.globals.get(&name) {
                    Some(value) => *value,
                    None => return Err(Fault::UndefinedGlobal { name }.into()),
                };
                self.push(value)?;
            }
            Opcode::StoreGlobal(index) => {
                let name = string_constant(env, index)?;
                let value = self.pop()?;
                env.globals.insert(name, value);
            }

            Opcode::Add => {
                let b = self.pop()?;
                let a = self.pop()?;
                let concatenated = match (string_of(env.heap, a), string_of(env.heap, b)) {
                    (Some(x), Some(y)) => Some(format!("{}{}", x, y)),
                    _ => None,
                };
                let result = match concatenated {
                    Some(s) => Value::Ref(self.allocate(env, HeapObject::String(s))?),
                    None => numeric("add", a, b, i64::checked_add, |x, y| x + y)?,
                };
                self.push(result)?;
            }
            Opcode::Sub => self.binary(|a, b| numeric("sub", a, b, i64::checked_sub, |x, y| x - y))?,
            Opcode::Mul => self.binary(|a, b| numeric("mul", a, b, i64::checked_mul, |x, y| x * y))?,
            Opcode::Div => self.binary(|a, b| {
                if b == Value::Int(0) && matches!(a, Value::Int(_)) {
                    return Err(Fault::DivisionByZero.into());
                }
                numeric("div", a, b, i64::checked_div, |x, y| x / y)
            })?,
            Opcode::Rem => self.binary(|a, b| {
                if b == Value::Int(0) && matches!(a, Value::Int(_)) {
                    return Err(Fault::DivisionByZero.into());
                }
                numeric("rem", a, b, i64::checked_rem, |x, y| x % y)
            })?,
            Opcode::Neg => {
                let value = self.pop()?;
                let result = match value {
                    Value::Int(n) => Value::Int(
                        n.checked_neg()
                            .ok_or(Fault::ArithmeticOverflow { op: "neg" })?,
                    ),
                    Value::Float(n) => Value::Float(-n),
                    other => return Err(mismatch("number", other)),
                };
                self.push(result)?;
            }
            Opcode::Not => {
                let value = self.pop()?;
                self.push(Value::Bool(!value.is_truthy()))?;
            }
            Opcode::Eq => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.push(Value::Bool(values_equal(env.heap, a, b)))?;
            }
            Opcode::Ne => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.push(Value::Bool(!values_equal(env.heap, a, b)))?;
            }
            Opcode::Lt => self.compare(env.heap, |o| o == Ordering::Less)?,
            Opcode::Le => self.compare(env.heap, |o| o != Ordering::Greater)?,
            Opcode::Gt => self.compare(env.heap, |o| o == Ordering::Greater)?,
            Opcode::Ge => self.compare(env.heap, |o| o != Ordering::Less)?,
            Opcode::BitAnd => self.binary(|a, b| integers(a, b).map(|(x, y)| Value::Int(x & y)))?,
            Opcode::BitOr => self.binary(|a, b| integers(a, b).map(|(x, y)| Value::Int(x | y)))?,
            Opcode::BitXor => self.binary(|a, b| integers(a, b).map(|(x, y)| Value::Int(x ^ y)))?,
            Opcode::Shl => self.binary(|a, b| shift("shl", a, b, shl_exact))?,
            Opcode::Shr => self.binary(|a, b| shift("shr", a, b, i64::checked_shr))?,

            Opcode::MakeTuple(n) => self.construct(env, n, HeapObject::Tuple)?,
            Opcode::MakeRecord(n) => self.construct(env, n, HeapObject::Record)?,
            Opcode::MakeArray(n) => self.construct(env, n, HeapObject::Array)?,
            Opcode::Box => {
                let value = self.pop()?;
                if !value.is_primitive() {
                    return Err(mismatch("primitive", value));
                }
                let boxed = self.allocate(env, HeapObject::Boxed(value))?;
                self.push(Value::Ref(boxed))?;
            }
            Opcode::Unbox => {
                let value = self.pop()?;
                let object = expect_ref("boxed", value)?;
                let inner = match env.heap.resolve(object)? {
                    HeapObject::Boxed(inner) => *inner,
                    other => return Err(object_mismatch("boxed", other)),
                };
                self.push(inner)?;
            }

            Opcode::GetField(index) => {
                let target = self.pop()?;
                let object = expect_ref("tuple or record", target)?;
                let value = match env.heap.resolve(object)? {
                    HeapObject::Tuple(fields) | HeapObject::Record(fields) => {
                        element(fields, index as i64)?
                    }
                    other => return Err(object_mismatch("tuple or record", other)),
                };
                self.push(value)?;
            }
            Opcode::SetField(index) => {
                let value = self.pop()?;
                let target = self.pop()?;
                let object = expect_ref("record", target)?;
                store(env.heap, object, index as i64, value, "record", |o| {
                    matches!(o, HeapObject::Record(_))
                })?;
            }
            Opcode::GetIndex => {
                let index = self.pop()?;
                let target = self.pop()?;
                let index = expect_int(index)?;
                let object = expect_ref("sequence", target)?;
                let found = match env.heap.resolve(object)? {
                    HeapObject::Tuple(items) | HeapObject::Record(items) | HeapObject::Array(items) => {
                        Indexed::Element(element(items, index)?)
                    }
                    HeapObject::String(s) => Indexed::Char(char_at(s, index)?),
                    other => return Err(object_mismatch("sequence", other)),
                };
                let value = match found {
                    Indexed::Element(value) => value,
                    Indexed::Char(ch) => {
                        Value::Ref(self.allocate(env, HeapObject::String(ch.to_string()))?)
                    }
                };
                self.push(value)?;
            }
            Opcode::SetIndex => {
                let value = self.pop()?;
                let index = self.pop()?;
                let target = self.pop()?;
                let index = expect_int(index)?;
                let object = expect_ref("array or record", target)?;
                store(env.heap, object, index, value, "array or record", |o| {
                    matches!(o, HeapObject::Array(_) | HeapObject::Record(_))
                })?;
            }
            Opcode::ArrayPush => {
                let value = self.pop()?;
                let array = expect_ref("array", self.peek(0)?)?;
                self.array_push(env, array, value)?;
            }
            Opcode::Len => {
                let value = self.pop()?;
                let len = length(env.heap, value)?;
                self.push(Value::Int(len))?;
            }

            Opcode::Jump(target) => self.frame_mut()?.ip = target as usize,
            Opcode::JumpIfTrue(target) => {
                if self.pop()?.is_truthy() {
                    self.frame_mut()?.ip = target as usize;
                }
            }
            Opcode::JumpIfFalse(target) => {
                if !self.pop()?.is_truthy() {
                    self.frame_mut()?.ip = target as usize;
                }
            }
            Opcode::Call { target, argc } => {
                let callee = env.image.constant(target)?;
                self.call(env.heap, callee, argc, false)?;
            }
            Opcode::CallIndirect(argc) => {
                let callee = expect_ref("code", self.peek(argc as usize)?)?;
                self.call(env.heap, callee, argc, true)?;
            }
            Opcode::CallIntrinsic { name, argc } => {
                let name = string_constant(env, name)?;
                let intrinsic = match env.intrinsics.lookup(&name) {
                    Lookup::Found(intrinsic) => intrinsic,
                    Lookup::Denied => return Err(Fault::IntrinsicDenied { name }.into()),
                    Lookup::Unknown => return Err(Fault::UnknownIntrinsic { name }.into()),
                };
                if let Some(expected) = intrinsic.arity() {
                    if expected != argc {
                        return Err(Fault::ArityMismatch {
                            callee: name,
                            expected,
                            found: argc,
                        }
                        .into());
                    }
                }
                let args = self.pop_n(argc as usize)?;
                let result = self.call_intrinsic(env, intrinsic, &args)?;
                self.push(result)?;
            }
            Opcode::Return => {
                let value = self.pop()?;
                let frame = self.frames.pop().ok_or(Fault::StackUnderflow)?;
                self.stack.truncate(frame.return_height);
                self.stack.push(value);
                if self.frames.is_empty() {
                    return Ok(Flow::Halt);
                }
            }
            Opcode::Halt => return Ok(Flow::Halt),
            Opcode::Safepoint => {
                self.collect_if_needed(env);
            }
        }
        Ok(Flow::Continue)
    }

    fn fetch(&mut self, heap: &Heap) -> VmResult<Opcode> {
        let frame = self.frame_mut()?;
        let code = code_object(heap, frame.code)?;
        let ip = frame.ip;
        frame.ip += 1;
        code.instructions.get(ip).copied().ok_or_else(|| {
            Fault::InstructionPointerOutOfBounds {
                ip,
                len: code.instructions.len(),
            }
            .into()
        })
    }

    fn local_slot(&self, index: u16) -> VmResult<usize> {
        let frame = self.frame()?;
        if index as usize >= frame.locals {
            return Err(Fault::LocalIndexOutOfBounds {
                index,
                locals: frame.locals,
            }
            .into());
        }
        Ok(frame.base + index as usize)
    }

    /// Pop two operands, push `f(a, b)`
    fn binary(&mut self, f: impl FnOnce(Value, Value) -> VmResult<Value>) -> VmResult<()> {
        let b = self.pop()?;
        let a = self.pop()?;
        let result = f(a, b)?;
        self.push(result)
    }

    fn compare(&mut self, heap: &Heap, test: impl FnOnce(Ordering) -> bool) -> VmResult<()> {
        let b = self.pop()?;
        let a = self.pop()?;
        let result = ordering(heap, a, b)?.map_or(false, test);
        self.push(Value::Bool(result))
    }

    /// Pop `n` values into a new sequence object
    fn construct(
        &mut self,
        env: &mut ExecEnv<'_>,
        n: u16,
        make: fn(Vec<Value>) -> HeapObject,
    ) -> VmResult<()> {
        let items = self.pop_n(n as usize)?;
        let object = self.allocate(env, make(items))?;
        self.push(Value::Ref(object))
    }

    /// Enter `callee` with the top `argc` values as its arguments.
    ///
    /// With `indirect`, the callee reference sits below the arguments and is
    /// dropped on return.
    fn call(&mut self, heap: &Heap, callee: ObjectRef, argc: u8, indirect: bool) -> VmResult<()> {
        let code = code_object(heap, callee)?;
        let (arity, locals) = (code.arity, code.locals as usize);
        if arity != argc {
            return Err(Fault::ArityMismatch {
                callee: function_name(heap, callee),
                expected: arity,
                found: argc,
            }
            .into());
        }
        if self.frames.len() >= self.config.max_call_depth {
            return Err(Fault::CallDepthExceeded {
                limit: self.config.max_call_depth,
            }
            .into());
        }

        let argc = argc as usize;
        let below = usize::from(indirect);
        let floor = self.frame()?.operand_floor();
        if self.stack.len() < floor + argc + below {
            return Err(Fault::StackUnderflow.into());
        }

        self.reserve(locals.saturating_sub(argc))?;
        let base = self.stack.len() - argc;
        self.stack.resize(base + locals.max(argc), Value::Nil);
        self.frames
            .push(CallFrame::new(callee, base, locals.max(argc), base - below));
        Ok(())
    }

    fn call_intrinsic(
        &mut self,
        env: &mut ExecEnv<'_>,
        intrinsic: Intrinsic,
        args: &[Value],
    ) -> VmResult<Value> {
        match intrinsic {
            Intrinsic::Print => {
                let line = args
                    .iter()
                    .map(|v| render_value(env.heap, *v))
                    .collect::<Vec<_>>()
                    .join(" ");
                writeln!(env.out, "{}", line).map_err(|e| Fault::Output {
                    message: e.to_string(),
                })?;
                Ok(Value::Nil)
            }
            Intrinsic::Len => Ok(Value::Int(length(env.heap, args[0])?)),
            Intrinsic::TypeOf => {
                let name = type_name(env.heap, args[0])?;
                let object = self.allocate(env, HeapObject::String(name.to_string()))?;
                Ok(Value::Ref(object))
            }
            Intrinsic::Gc => {
                let stats = self.collect(env);
                Ok(Value::Int(stats.reclaimed_objects as i64))
            }
            Intrinsic::LiveObjects => Ok(Value::Int(env.heap.live_objects() as i64)),
            Intrinsic::Assert => {
                if args[0].is_truthy() {
                    Ok(Value::Nil)
                } else {
                    Err(Fault::AssertionFailed.into())
                }
            }
        }
    }
}

/// What `GetIndex` found before any allocation
enum Indexed {
    Element(Value),
    Char(char),
}

fn mismatch(expected: &'static str, found: Value) -> VmError {
    Fault::TypeMismatch {
        expected,
        found: found.type_name().to_string(),
    }
    .into()
}

fn object_mismatch(expected: &'static str, found: &HeapObject) -> VmError {
    Fault::TypeMismatch {
        expected,
        found: found.type_name().to_string(),
    }
    .into()
}

fn expect_ref(expected: &'static str, value: Value) -> VmResult<ObjectRef> {
    value.as_ref().ok_or_else(|| mismatch(expected, value))
}

fn expect_int(value: Value) -> VmResult<i64> {
    value.as_int().ok_or_else(|| mismatch("int", value))
}

fn element(items: &[Value], index: i64) -> VmResult<Value> {
    usize::try_from(index)
        .ok()
        .and_then(|i| items.get(i).copied())
        .ok_or_else(|| {
            Fault::IndexOutOfBounds {
                index,
                len: items.len(),
            }
            .into()
        })
}

fn char_at(s: &str, index: i64) -> VmResult<char> {
    usize::try_from(index)
        .ok()
        .and_then(|i| s.chars().nth(i))
        .ok_or_else(|| {
            Fault::IndexOutOfBounds {
                index,
                len: s.chars().count(),
            }
            .into()
        })
}

/// Overwrite element `index` of an object accepted by `accepts`
fn store(
    heap: &mut Heap,
    object: ObjectRef,
    index: i64,
    value: Value,
    expected: &'static str,
    accepts: impl Fn(&HeapObject) -> bool,
) -> VmResult<()> {
    let target = heap.get_mut(object).ok_or_else(|| {
        VmError::from(Fault::DanglingReference {
            reference: object.to_string(),
        })
    })?;
    if !accepts(target) {
        return Err(object_mismatch(expected, target));
    }
    if let HeapObject::Array(items) | HeapObject::Record(items) | HeapObject::Tuple(items) = target {
        let len = items.len();
        let slot = usize::try_from(index)
            .ok()
            .and_then(|i| items.get_mut(i))
            .ok_or(Fault::IndexOutOfBounds { index, len })?;
        *slot = value;
    }
    Ok(())
}

fn string_constant(env: &ExecEnv<'_>, index: u32) -> VmResult<String> {
    let object = env.image.constant(index)?;
    match env.heap.resolve(object)? {
        HeapObject::String(s) => Ok(s.clone()),
        other => Err(object_mismatch("string constant", other)),
    }
}

fn string_of(heap: &Heap, value: Value) -> Option<&str> {
    heap.get(value.as_ref()?)?.as_str()
}

fn numeric(
    op: &'static str,
    a: Value,
    b: Value,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> VmResult<Value> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => int_op(x, y)
            .map(Value::Int)
            .ok_or_else(|| Fault::ArithmeticOverflow { op }.into()),
        (Value::Int(x), Value::Float(y)) => Ok(Value::Float(float_op(x as f64, y))),
        (Value::Float(x), Value::Int(y)) => Ok(Value::Float(float_op(x, y as f64))),
        (Value::Float(x), Value::Float(y)) => Ok(Value::Float(float_op(x, y))),
        (Value::Int(_) | Value::Float(_), other) | (other, _) => Err(mismatch("number", other)),
    }
}

fn integers(a: Value, b: Value) -> VmResult<(i64, i64)> {
    Ok((expect_int(a)?, expect_int(b)?))
}

fn shift(
    op: &'static str,
    a: Value,
    b: Value,
    shift_op: fn(i64, u32) -> Option<i64>,
) -> VmResult<Value> {
    let (value, amount) = integers(a, b)?;
    u32::try_from(amount)
        .ok()
        .and_then(|amount| shift_op(value, amount))
        .map(Value::Int)
        .ok_or_else(|| Fault::ArithmeticOverflow { op }.into())
}

/// Left shift that fails when significant bits are shifted out
fn shl_exact(value: i64, amount: u32) -> Option<i64> {
    let shifted = value.checked_shl(amount)?;
    (shifted >> amount == value).then_some(shifted)
}

/// Strings compare by content, other references by identity
fn values_equal(heap: &Heap, a: Value, b: Value) -> bool {
    match (a, b) {
        (Value::Int(x), Value::Float(y)) | (Value::Float(y), Value::Int(x)) => x as f64 == y,
        (Value::Ref(x), Value::Ref(y)) => {
            x == y
                || matches!(
                    (string_of(heap, a), string_of(heap, b)),
                    (Some(s), Some(t)) if s == t
                )
        }
        _ => a == b,
    }
}

/// `None` for unordered floats
fn ordering(heap: &Heap, a: Value, b: Value) -> VmResult<Option<Ordering>> {
    let ordering = match (a, b) {
        (Value::Int(x), Value::Int(y)) => Some(x.cmp(&y)),
        (Value::Int(x), Value::Float(y)) => (x as f64).partial_cmp(&y),
        (Value::Float(x), Value::Int(y)) => x.partial_cmp(&(y as f64)),
        (Value::Float(x), Value::Float(y)) => x.partial_cmp(&y),
        _ => match (string_of(heap, a), string_of(heap, b)) {
            (Some(s), Some(t)) => Some(s.cmp(t)),
            (None, _) if !matches!(a, Value::Int(_) | Value::Float(_)) => {
                return Err(mismatch("number or string", a))
            }
            _ => return Err(mismatch("number or string", b)),
        },
    };
    Ok(ordering)
}

fn length(heap: &Heap, value: Value) -> VmResult<i64> {
    let object = expect_ref("string or sequence", value)?;
    let len = match heap.resolve(object)? {
        HeapObject::String(s) => s.chars().count(),
        HeapObject::Tuple(items) | HeapObject::Record(items) | HeapObject::Array(items) => {
            items.len()
        }
        other => return Err(object_mismatch("string or sequence", other)),
    };
    Ok(len as i64)
}
