//! Binary program image parser
//!
//! Reads the header, then each section in turn. Constants are allocated on
//! the heap as they are decoded, with the partially built pool passed as
//! extra roots so a collection triggered mid-load cannot free them. If the
//! parse fails, those objects are simply unrooted and the next collection
//! reclaims them.

use bytecode_system::format::{self, kind, section};
use core_types::{ObjectRef, Value, VmError, VmResult};
use memory_manager::{CodeObject, Heap, HeapObject, NoRoots, Trace};
use tracing::{debug, info};

use crate::byte_source::{ByteSource, SourceError};
use crate::image::ProgramImage;

/// Parses a program image from a [`ByteSource`] into a heap
pub struct BinaryFileParser<'s, S: ByteSource + ?Sized> {
    source: &'s mut S,
    /// End of the section being read; reads may not cross it
    limit: u64,
}

impl<'s, S: ByteSource + ?Sized> BinaryFileParser<'s, S> {
    /// Create a parser reading from `source`
    pub fn new(source: &'s mut S) -> Self {
        let limit = source.len();
        Self { source, limit }
    }

    /// Parse the whole image, allocating its constants in `heap`.
    ///
    /// # Errors
    ///
    /// - `MalformedInput` for any structural problem, with the byte offset
    /// - `IoFailure` if the source cannot be read
    /// - `OutOfMemory` if the constants do not fit in the heap
    pub fn parse(&mut self, heap: &mut Heap) -> VmResult<ProgramImage> {
        self.parse_with_roots(heap, &NoRoots)
    }

    /// Like [`parse`](Self::parse), keeping everything `roots` reaches alive
    /// across any collection the load triggers.
    pub fn parse_with_roots(&mut self, heap: &mut Heap, roots: &dyn Trace) -> VmResult<ProgramImage> {
        let version = self.read_header()?;

        let mut name = None;
        let mut constants: Option<Vec<ObjectRef>> = None;

        loop {
            if self.source.is_eof() {
                return Err(self.malformed("missing ENTRY section"));
            }
            let header_at = self.source.position();
            self.limit = self.source.len();
            let tag = self.read_u8()?;
            let len = self.read_u32()? as u64;
            let start = self.source.position();
            let end = start + len;
            if end > self.source.len() {
                return Err(VmError::malformed(
                    header_at,
                    format!(
                        "truncated section 0x{:02X}: declares {} bytes, {} available",
                        tag,
                        len,
                        self.source.len() - start
                    ),
                ));
            }
            self.limit = end;

            match tag {
                section::CONSTANTS => {
                    if constants.is_some() {
                        return Err(VmError::malformed(header_at, "duplicate CONSTANTS section"));
                    }
                    let pool = self.read_constants(heap, roots)?;
                    debug!(count = pool.len(), bytes = len, "loaded constant pool");
                    constants = Some(pool);
                }
                section::NAME => {
                    if name.is_some() {
                        return Err(VmError::malformed(header_at, "duplicate NAME section"));
                    }
                    name = Some(self.read_string(len)?);
                }
                section::DEBUG => {
                    debug!(offset = start, bytes = len, "skipping DEBUG section");
                    self.source.skip(len).map_err(source_error)?;
                }
                section::ENTRY => {
                    let Some(constants) = constants else {
                        return Err(VmError::malformed(header_at, "ENTRY section before CONSTANTS"));
                    };
                    if len != 4 {
                        return Err(VmError::malformed(
                            header_at,
                            format!("ENTRY section must be 4 bytes, found {}", len),
                        ));
                    }
                    let entry_at = self.source.position();
                    let entry_index = self.read_u32()?;
                    match constants.get(entry_index as usize).and_then(|r| heap.get(*r)) {
                        Some(HeapObject::Code(_)) => {}
                        Some(other) => {
                            return Err(VmError::malformed(
                                entry_at,
                                format!("entry {} is a {}, not code", entry_index, other.type_name()),
                            ))
                        }
                        None => {
                            return Err(VmError::malformed(
                                entry_at,
                                format!(
                                    "entry index {} out of range for pool of {}",
                                    entry_index,
                                    constants.len()
                                ),
                            ))
                        }
                    }
                    if !self.source.is_eof() {
                        return Err(self.malformed("trailing bytes after ENTRY section"));
                    }

                    info!(
                        name = name.as_deref().unwrap_or("<unnamed>"),
                        constants = constants.len(),
                        entry = entry_index,
                        "program image loaded"
                    );
                    return Ok(ProgramImage {
                        version,
                        name,
                        constants,
                        entry_index,
                    });
                }
                other => {
                    return Err(VmError::malformed(
                        header_at,
                        format!("unknown section tag 0x{:02X}", other),
                    ))
                }
            }

            if self.source.position() != end {
                return Err(VmError::malformed(
                    self.source.position(),
                    format!(
                        "section 0x{:02X} declares {} bytes but its contents end at +{}",
                        tag,
                        len,
                        self.source.position() - start
                    ),
                ));
            }
        }
    }

    fn read_header(&mut self) -> VmResult<u16> {
        let mut magic = [0u8; 4];
        self.read_bytes(&mut magic)?;
        if magic != format::MAGIC {
            return Err(VmError::malformed(0, format!("bad magic {:02X?}", magic)));
        }
        let version = self.read_u16()?;
        if version != format::VERSION {
            return Err(VmError::malformed(4, format!("unsupported version {}", version)));
        }
        let flags = self.read_u16()?;
        if flags != 0 {
            return Err(VmError::malformed(6, format!("unsupported flags 0x{:04X}", flags)));
        }
        Ok(version)
    }

    fn read_constants(&mut self, heap: &mut Heap, roots: &dyn Trace) -> VmResult<Vec<ObjectRef>> {
        let count = self.read_u32()? as usize;
        // Every entry takes at least its kind byte
        if count as u64 > self.remaining() {
            return Err(self.malformed(format!(
                "constant count {} exceeds section size",
                count
            )));
        }

        let mut pool: Vec<ObjectRef> = Vec::with_capacity(count);
        for index in 0..count {
            let entry_at = self.source.position();
            let object = self.read_constant(index, &pool, heap, entry_at)?;
            let handle = heap.allocate(object, &(&pool, roots))?;
            pool.push(handle);
        }
        Ok(pool)
    }

    fn read_constant(
        &mut self,
        index: usize,
        pool: &[ObjectRef],
        heap: &Heap,
        entry_at: u64,
    ) -> VmResult<HeapObject> {
        let object = match self.read_u8()? {
            kind::NIL => HeapObject::Boxed(Value::Nil),
            kind::FALSE => HeapObject::Boxed(Value::Bool(false)),
            kind::TRUE => HeapObject::Boxed(Value::Bool(true)),
            kind::INT => HeapObject::Boxed(Value::Int(self.read_u64()? as i64)),
            kind::FLOAT => HeapObject::Boxed(Value::Float(f64::from_bits(self.read_u64()?))),
            kind::STR => {
                let len = self.read_u32()? as u64;
                HeapObject::String(self.read_string(len)?)
            }
            kind::TUPLE => {
                let count = self.read_u32()? as u64;
                if count * 4 > self.remaining() {
                    return Err(self.malformed(format!(
                        "tuple of {} entries overruns the section",
                        count
                    )));
                }
                let mut items = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    let at = self.source.position();
                    let target = self.read_u32()?;
                    items.push(Value::Ref(earlier(pool, index, target, at)?));
                }
                HeapObject::Tuple(items)
            }
            kind::CODE => {
                let name_at = self.source.position();
                let name = earlier(pool, index, self.read_u32()?, name_at)?;
                if !matches!(heap.get(name), Some(HeapObject::String(_))) {
                    return Err(VmError::malformed(
                        name_at,
                        format!("code name at entry {} is not a string constant", index),
                    ));
                }
                let arity = self.read_u8()?;
                let locals = self.read_u16()?;
                if locals < arity as u16 {
                    return Err(VmError::malformed(
                        entry_at,
                        format!("code with arity {} declares only {} locals", arity, locals),
                    ));
                }
                let code_len = self.read_u32()? as u64;
                if code_len > self.remaining() {
                    return Err(self.malformed(format!(
                        "code body of {} bytes overruns the section",
                        code_len
                    )));
                }
                let body_at = self.source.position();
                let mut body = vec![0u8; code_len as usize];
                self.read_bytes(&mut body)?;
                let instructions = format::decode_instructions(&body)
                    .map_err(|e| VmError::malformed(body_at + e.offset as u64, e.reason))?;
                HeapObject::Code(CodeObject {
                    name,
                    arity,
                    locals,
                    instructions,
                })
            }
            other => {
                return Err(VmError::malformed(
                    entry_at,
                    format!("unknown constant kind {} at entry {}", other, index),
                ))
            }
        };
        Ok(object)
    }

    fn read_string(&mut self, len: u64) -> VmResult<String> {
        if len > self.remaining() {
            return Err(self.malformed(format!("string of {} bytes overruns the section", len)));
        }
        let at = self.source.position();
        let mut bytes = vec![0u8; len as usize];
        self.read_bytes(&mut bytes)?;
        String::from_utf8(bytes)
            .map_err(|e| VmError::malformed(at + e.utf8_error().valid_up_to() as u64, "invalid UTF-8"))
    }

    fn remaining(&self) -> u64 {
        self.limit.saturating_sub(self.source.position())
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> VmResult<()> {
        if buf.len() as u64 > self.remaining() && self.limit < self.source.len() {
            return Err(self.malformed("read crosses the end of the section"));
        }
        self.source.read_exact(buf).map_err(source_error)
    }

    fn read_u8(&mut self) -> VmResult<u8> {
        let mut buf = [0u8; 1];
        self.read_bytes(&mut buf)?;
        Ok(buf[0])
    }

    fn read_u16(&mut self) -> VmResult<u16> {
        let mut buf = [0u8; 2];
        self.read_bytes(&mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    fn read_u32(&mut self) -> VmResult<u32> {
        let mut buf = [0u8; 4];
        self.read_bytes(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    fn read_u64(&mut self) -> VmResult<u64> {
        let mut buf = [0u8; 8];
        self.read_bytes(&mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    fn malformed(&self, reason: impl Into<String>) -> VmError {
        VmError::malformed(self.source.position(), reason)
    }

}

fn source_error(error: SourceError) -> VmError {
    match error {
        SourceError::UnexpectedEof { offset, needed } => VmError::malformed(
            offset,
            format!("truncated input: {} more bytes needed", needed),
        ),
        SourceError::Io { offset, source } => VmError::IoFailure { offset, source },
    }
}

/// Resolve a reference from entry `index` to an entry decoded before it
fn earlier(pool: &[ObjectRef], index: usize, target: u32, at: u64) -> VmResult<ObjectRef> {
    if target as usize >= index {
        let what = if target as usize == index { "self" } else { "forward" };
        return Err(VmError::malformed(
            at,
            format!("{} reference from entry {} to entry {}", what, index, target),
        ));
    }
    Ok(pool[target as usize])
}
