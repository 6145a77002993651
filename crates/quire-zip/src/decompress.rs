//! Decompression streams over a window of a byte source.

use std::io::{self, Read};
use std::sync::Arc;

use flate2::read::DeflateDecoder;
use quire_common::{ReadError, Readable};

use crate::records::CompressionMethod;

/// A live decompression stream.
pub type Decoder = Box<dyn Read + Send>;

/// `std::io::Read` over the byte window `[start, end)` of a [`Readable`].
///
/// Bytes are fetched in chunks of `chunk_size` so that a decoder pulling a
/// few bytes at a time does not turn into one source read per call.
pub struct SourceReader {
    source: Arc<dyn Readable>,
    position: u64,
    end: u64,
    chunk_size: u64,
    buffer: Vec<u8>,
    cursor: usize,
}

impl SourceReader {
    pub fn new(source: Arc<dyn Readable>, start: u64, end: u64, chunk_size: usize) -> Self {
        Self {
            source,
            position: start,
            end: end.max(start),
            chunk_size: chunk_size.max(1) as u64,
            buffer: Vec::new(),
            cursor: 0,
        }
    }

    fn refill(&mut self) -> io::Result<()> {
        let chunk_end = (self.position + self.chunk_size).min(self.end);
        let chunk = self
            .source
            .read(Some(self.position..chunk_end))
            .map_err(io::Error::other)?;
        if chunk.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "archive ended inside entry data",
            ));
        }
        self.position += chunk.len() as u64;
        self.buffer = chunk;
        self.cursor = 0;
        Ok(())
    }
}

impl Read for SourceReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.cursor >= self.buffer.len() {
            if self.position >= self.end {
                return Ok(0);
            }
            self.refill()?;
        }

        let available = &self.buffer[self.cursor..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.cursor += n;
        Ok(n)
    }
}

/// Open a fresh decoder for `method` reading compressed bytes from `raw`.
pub fn open_decoder(method: CompressionMethod, raw: SourceReader) -> io::Result<Decoder> {
    Ok(match method {
        CompressionMethod::Store => Box::new(raw),
        CompressionMethod::Deflate => Box::new(DeflateDecoder::new(raw)),
        CompressionMethod::Zstd => Box::new(zstd::stream::read::Decoder::new(raw)?),
    })
}

/// Decompress a complete in-memory payload of `expected` bytes.
///
/// Decoding stops one byte past `expected`, so an overlong stream shows up
/// as a longer output without being inflated in full.
pub fn decompress_all(
    method: CompressionMethod,
    data: &[u8],
    expected: u64,
) -> io::Result<Vec<u8>> {
    let decoder: Box<dyn Read + '_> = match method {
        CompressionMethod::Store => Box::new(data),
        CompressionMethod::Deflate => Box::new(DeflateDecoder::new(data)),
        CompressionMethod::Zstd => Box::new(zstd::stream::read::Decoder::new(data)?),
    };
    let mut output = Vec::new();
    decoder
        .take(expected.saturating_add(1))
        .read_to_end(&mut output)?;
    Ok(output)
}

/// Discard `count` bytes. Returns the bytes actually skipped.
pub fn skip(reader: &mut dyn Read, count: u64) -> io::Result<u64> {
    io::copy(&mut reader.take(count), &mut io::sink())
}

/// Recover the [`ReadError`] a [`SourceReader`] smuggled through
/// `io::Error`; anything else raised inside a decoder is a decoding fault.
pub fn into_read_error(err: io::Error) -> ReadError {
    if err.get_ref().is_some_and(|inner| inner.is::<ReadError>()) {
        if let Some(inner) = err.into_inner() {
            if let Ok(read) = inner.downcast::<ReadError>() {
                return *read;
            }
        }
        return ReadError::Decoding("decoder error".to_string());
    }
    ReadError::Decoding(err.to_string())
}
