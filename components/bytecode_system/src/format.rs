//! Binary layout of an ember program image.
//!
//! ```text
//! header   : magic "EMBR" | version u16 | flags u16
//! section* : tag u8 | length u32 | payload[length]
//! ```
//!
//! All integers are little-endian. The CONSTANTS section must appear exactly
//! once and before ENTRY; ENTRY must be the final section. Every variable
//! length field is prefixed by its size so a reader never scans for a
//! terminator.

use thiserror::Error;

/// File magic
pub const MAGIC: [u8; 4] = *b"EMBR";

/// Current format version
pub const VERSION: u16 = 1;

/// Size of the fixed header in bytes
pub const HEADER_LEN: usize = 8;

/// Size of a section header (tag + length) in bytes
pub const SECTION_HEADER_LEN: usize = 5;

/// Section tags
pub mod section {
    /// Constant pool
    pub const CONSTANTS: u8 = 0x01;
    /// Program name (UTF-8 payload)
    pub const NAME: u8 = 0x02;
    /// Opaque debug data, skipped by the loader
    pub const DEBUG: u8 = 0x03;
    /// Entry point designator, always last
    pub const ENTRY: u8 = 0xFF;
}

/// Constant pool entry kinds
pub mod kind {
    /// nil
    pub const NIL: u8 = 0;
    /// false
    pub const FALSE: u8 = 1;
    /// true
    pub const TRUE: u8 = 2;
    /// i64
    pub const INT: u8 = 3;
    /// f64
    pub const FLOAT: u8 = 4;
    /// length-prefixed UTF-8
    pub const STR: u8 = 5;
    /// count-prefixed list of earlier entry indices
    pub const TUPLE: u8 = 6;
    /// code object
    pub const CODE: u8 = 7;
}

/// Failure decoding an instruction stream.
///
/// `offset` is relative to the start of the slice being decoded; the loader
/// rebases it onto the file position.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason} (at +{offset})")]
pub struct DecodeError {
    /// Offset of the problem within the decoded slice
    pub offset: usize,
    /// What was wrong
    pub reason: String,
}

impl DecodeError {
    /// Create a decode error
    pub fn new(offset: usize, reason: impl Into<String>) -> Self {
        Self {
            offset,
            reason: reason.into(),
        }
    }
}

/// Decode a complete instruction stream.
pub fn decode_instructions(bytes: &[u8]) -> Result<Vec<crate::Opcode>, DecodeError> {
    let mut ops = Vec::new();
    let mut offset = 0;
    while offset < bytes.len() {
        let (op, used) = crate::Opcode::decode(&bytes[offset..])
            .map_err(|e| DecodeError::new(offset + e.offset, e.reason))?;
        ops.push(op);
        offset += used;
    }
    Ok(ops)
}

/// Encode an instruction stream.
pub fn encode_instructions(ops: &[crate::Opcode]) -> Vec<u8> {
    let mut out = Vec::with_capacity(ops.iter().map(|op| op.encoded_len()).sum());
    for op in ops {
        op.encode(&mut out);
    }
    out
}
