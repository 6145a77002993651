//! Little-endian cursor over a byte slice.
//!
//! Archive indexes are parsed from buffers fetched through a
//! [`Readable`](crate::Readable); [`BinaryReader`] walks such a buffer
//! without copying it. Every read is bounds-checked and reports how many
//! bytes were missing.

use zerocopy::FromBytes;

use crate::error::{ParseError, ParseResult};

/// Cursor over a borrowed buffer.
///
/// ```
/// use quire_common::BinaryReader;
///
/// let data = [0x50, 0x4b, 0x03, 0x04, 0x14, 0x00];
/// let mut reader = BinaryReader::new(&data);
///
/// reader.expect_magic(b"PK\x03\x04").unwrap();
/// assert_eq!(reader.read_u16().unwrap(), 20);
/// assert_eq!(reader.remaining(), 0);
/// ```
#[derive(Debug, Clone)]
pub struct BinaryReader<'a> {
    data: &'a [u8],
    cursor: usize,
}

impl<'a> BinaryReader<'a> {
    #[inline]
    pub const fn new(data: &'a [u8]) -> Self {
        Self::new_at(data, 0)
    }

    /// Cursor starting `offset` bytes into `data`.
    #[inline]
    pub const fn new_at(data: &'a [u8], offset: usize) -> Self {
        Self {
            data,
            cursor: offset,
        }
    }

    #[inline]
    pub const fn position(&self) -> usize {
        self.cursor
    }

    #[inline]
    pub const fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.cursor)
    }

    /// Skip `count` bytes. Skipping past the end leaves the cursor exhausted.
    #[inline]
    pub fn advance(&mut self, count: usize) {
        self.cursor = self.cursor.saturating_add(count);
    }

    pub fn read_bytes(&mut self, count: usize) -> ParseResult<&'a [u8]> {
        let available = self.remaining();
        if available < count {
            return Err(ParseError::UnexpectedEof {
                needed: count,
                available,
            });
        }
        let start = self.cursor;
        self.cursor += count;
        Ok(&self.data[start..self.cursor])
    }

    fn take<const N: usize>(&mut self) -> ParseResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    #[inline]
    pub fn read_u16(&mut self) -> ParseResult<u16> {
        self.take().map(u16::from_le_bytes)
    }

    #[inline]
    pub fn read_u32(&mut self) -> ParseResult<u32> {
        self.take().map(u32::from_le_bytes)
    }

    #[inline]
    pub fn read_u64(&mut self) -> ParseResult<u64> {
        self.take().map(u64::from_le_bytes)
    }

    /// Read `length` bytes as text, replacing invalid UTF-8. Archive names
    /// in legacy code pages keep their ASCII subset intact.
    pub fn read_string_lossy(&mut self, length: usize) -> ParseResult<String> {
        self.read_bytes(length)
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }

    /// Read a fixed-layout record.
    pub fn read_struct<T: FromBytes>(&mut self) -> ParseResult<T> {
        let size = std::mem::size_of::<T>();
        let bytes = self.read_bytes(size)?;
        T::read_from_bytes(bytes).map_err(|_| ParseError::UnexpectedEof {
            needed: size,
            available: bytes.len(),
        })
    }

    /// Consume `expected.len()` bytes and check they equal `expected`.
    pub fn expect_magic(&mut self, expected: &[u8]) -> ParseResult<()> {
        let actual = self.read_bytes(expected.len())?;
        if actual == expected {
            Ok(())
        } else {
            Err(ParseError::InvalidMagic {
                expected: expected.to_vec(),
                actual: actual.to_vec(),
            })
        }
    }
}
