//! The byte-source contract and an in-memory implementation.

use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{ReadError, ReadResult};

/// Ceiling applied by [`Readable::read_all_bounded`] callers that do not pick
/// their own limit.
pub const DEFAULT_READ_CEILING: u64 = 64 * 1024 * 1024;

/// A randomly addressable byte source: a file, an archive entry, an HTTP
/// resource or bytes already in memory.
///
/// Ranges are inclusive-exclusive and clamped to the content length. An empty
/// or inverted range yields an empty buffer. `close` releases the underlying
/// handle and may be called any number of times; reads after close fail with
/// [`AccessError::Closed`](crate::AccessError::Closed).
pub trait Readable: Send + Sync {
    /// Total length in bytes. May require I/O.
    fn length(&self) -> ReadResult<u64>;

    /// Read `range`, or the whole content when `range` is `None`.
    fn read(&self, range: Option<Range<u64>>) -> ReadResult<Vec<u8>>;

    /// Release the underlying handle. Idempotent.
    fn close(&self);

    /// Read the whole content, refusing when it is longer than `limit`.
    ///
    /// The length is checked before any content byte is read.
    fn read_all_bounded(&self, limit: u64) -> ReadResult<Vec<u8>> {
        let length = self.length()?;
        if length > limit {
            return Err(ReadError::OutOfMemory {
                requested: length,
                limit,
            });
        }
        self.read(None)
    }

    /// [`Readable::read_all_bounded`] decoded as UTF-8.
    fn read_to_string_bounded(&self, limit: u64) -> ReadResult<String> {
        let bytes = self.read_all_bounded(limit)?;
        String::from_utf8(bytes).map_err(|e| ReadError::Decoding(e.to_string()))
    }
}

impl<R: Readable + ?Sized> Readable for Arc<R> {
    fn length(&self) -> ReadResult<u64> {
        (**self).length()
    }

    fn read(&self, range: Option<Range<u64>>) -> ReadResult<Vec<u8>> {
        (**self).read(range)
    }

    fn close(&self) {
        (**self).close()
    }
}

impl<R: Readable + ?Sized> Readable for Box<R> {
    fn length(&self) -> ReadResult<u64> {
        (**self).length()
    }

    fn read(&self, range: Option<Range<u64>>) -> ReadResult<Vec<u8>> {
        (**self).read(range)
    }

    fn close(&self) {
        (**self).close()
    }
}

/// Clamp an optional request range to `[0, length)`.
///
/// `None` becomes the full content. Inverted ranges collapse to an empty range
/// at their start.
pub fn clamp_range(range: Option<Range<u64>>, length: u64) -> Range<u64> {
    match range {
        None => 0..length,
        Some(r) => {
            let start = r.start.min(length);
            let end = r.end.min(length).max(start);
            start..end
        }
    }
}

/// Bytes already in memory.
#[derive(Debug)]
pub struct MemoryBlob {
    data: Arc<[u8]>,
    closed: AtomicBool,
}

impl MemoryBlob {
    pub fn new(data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            data: data.into(),
            closed: AtomicBool::new(false),
        }
    }

    fn ensure_open(&self) -> ReadResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ReadError::closed());
        }
        Ok(())
    }
}

impl From<Vec<u8>> for MemoryBlob {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}

impl From<&[u8]> for MemoryBlob {
    fn from(data: &[u8]) -> Self {
        Self::new(data)
    }
}

impl Readable for MemoryBlob {
    fn length(&self) -> ReadResult<u64> {
        self.ensure_open()?;
        Ok(self.data.len() as u64)
    }

    fn read(&self, range: Option<Range<u64>>) -> ReadResult<Vec<u8>> {
        self.ensure_open()?;
        let r = clamp_range(range, self.data.len() as u64);
        Ok(self.data[r.start as usize..r.end as usize].to_vec())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}
