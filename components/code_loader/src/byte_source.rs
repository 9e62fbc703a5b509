//! Byte sources the parser reads from

use std::fs::File;
use std::io::{self, BufReader, Cursor, Read, Seek, SeekFrom};
use std::path::Path;

use thiserror::Error;

/// Failure supplying bytes
#[derive(Debug, Error)]
pub enum SourceError {
    /// The input ended before the requested bytes
    #[error("unexpected end of input at byte {offset}: {needed} more bytes needed")]
    UnexpectedEof {
        /// Position of the failed read
        offset: u64,
        /// Bytes that were missing
        needed: u64,
    },

    /// The underlying reader failed
    #[error("read failed at byte {offset}")]
    Io {
        /// Position of the failed read
        offset: u64,
        /// Underlying error
        #[source]
        source: io::Error,
    },
}

/// Sequential reads with seeking and an end-of-input check.
///
/// Running out of bytes and failing to read are reported separately so the
/// parser can tell a truncated image from a broken device.
pub trait ByteSource {
    /// Fill `buf` completely or fail
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), SourceError>;

    /// Move to an absolute position within the input
    fn seek(&mut self, position: u64) -> Result<(), SourceError>;

    /// Current position
    fn position(&self) -> u64;

    /// Total input length
    fn len(&self) -> u64;

    /// Whether the input is empty
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether every byte has been consumed
    fn is_eof(&self) -> bool {
        self.position() >= self.len()
    }

    /// Skip `count` bytes
    fn skip(&mut self, count: u64) -> Result<(), SourceError> {
        self.seek(self.position().saturating_add(count))
    }
}

/// Buffered [`ByteSource`] over any seekable reader
pub struct BufferedInputStream<R: Read + Seek> {
    inner: BufReader<R>,
    position: u64,
    len: u64,
}

impl BufferedInputStream<File> {
    /// Open a file
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let file = File::open(path).map_err(|source| SourceError::Io { offset: 0, source })?;
        Self::new(file)
    }
}

impl BufferedInputStream<Cursor<Vec<u8>>> {
    /// Read from an in-memory buffer
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, SourceError> {
        Self::new(Cursor::new(bytes))
    }
}

impl<R: Read + Seek> BufferedInputStream<R> {
    /// Wrap a reader, measuring its length up front
    pub fn new(mut reader: R) -> Result<Self, SourceError> {
        let len = reader
            .seek(SeekFrom::End(0))
            .and_then(|len| reader.seek(SeekFrom::Start(0)).map(|_| len))
            .map_err(|source| SourceError::Io { offset: 0, source })?;
        Ok(Self {
            inner: BufReader::new(reader),
            position: 0,
            len,
        })
    }
}

impl<R: Read + Seek> ByteSource for BufferedInputStream<R> {
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), SourceError> {
        let wanted = buf.len() as u64;
        let available = self.len.saturating_sub(self.position);
        if wanted > available {
            return Err(SourceError::UnexpectedEof {
                offset: self.position,
                needed: wanted - available,
            });
        }
        self.inner.read_exact(buf).map_err(|source| {
            if source.kind() == io::ErrorKind::UnexpectedEof {
                SourceError::UnexpectedEof {
                    offset: self.position,
                    needed: wanted,
                }
            } else {
                SourceError::Io {
                    offset: self.position,
                    source,
                }
            }
        })?;
        self.position += wanted;
        Ok(())
    }

    fn seek(&mut self, position: u64) -> Result<(), SourceError> {
        if position > self.len {
            return Err(SourceError::UnexpectedEof {
                offset: self.position,
                needed: position - self.len,
            });
        }
        let delta = position as i64 - self.position as i64;
        self.inner
            .seek_relative(delta)
            .map_err(|source| SourceError::Io {
                offset: self.position,
                source,
            })?;
        self.position = position;
        Ok(())
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn len(&self) -> u64 {
        self.len
    }
}
