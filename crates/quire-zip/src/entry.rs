//! Readable handles on ZIP entries.
//!
//! Compressed data cannot be seeked. Each [`ZipEntry`] keeps at most one live
//! decompression stream together with the number of bytes it has produced.
//! A ranged read starting at or after that position reuses the stream and
//! skips forward; a read starting before it reopens the stream from the
//! beginning of the entry. Reading an entry in ascending chunks therefore
//! decompresses it once instead of once per chunk.

use std::io::Read;
use std::ops::Range;
use std::sync::Arc;

use parking_lot::Mutex;
use quire_common::{clamp_range, crc, Entry, ReadError, ReadResult, Readable};

use crate::archive::{window, Shared, ZipEntryInfo};
use crate::decompress::{self, Decoder, SourceReader};
use crate::records::CompressionMethod;
use crate::Error;

/// Per-entry stream cache.
enum StreamState {
    /// No live stream.
    Closed,
    /// A decoder that has produced `position` bytes so far.
    Open { decoder: Decoder, position: u64 },
}

/// A readable view of one ZIP entry.
///
/// Handles are cheap; each one owns its private stream cache. Concurrent
/// reads on the same handle are serialised by an internal lock.
pub struct ZipEntry {
    shared: Arc<Shared>,
    index: usize,
    stream: Mutex<StreamState>,
}

impl ZipEntry {
    pub(crate) fn new(shared: Arc<Shared>, index: usize) -> Self {
        Self {
            shared,
            index,
            stream: Mutex::new(StreamState::Closed),
        }
    }

    #[inline]
    pub fn info(&self) -> &ZipEntryInfo {
        &self.shared.entries[self.index]
    }

    /// Whether a decompression stream is currently cached, and its position.
    pub fn cached_position(&self) -> Option<u64> {
        match &*self.stream.lock() {
            StreamState::Open { position, .. } => Some(*position),
            StreamState::Closed => None,
        }
    }

    fn method(&self) -> Result<CompressionMethod, Error> {
        let info = self.info();
        if info.is_encrypted() {
            return Err(Error::Encrypted(info.path.clone()));
        }
        let method = CompressionMethod::try_from(info.compression_method).map_err(|method| {
            Error::UnsupportedCompression {
                path: info.path.clone(),
                method,
            }
        })?;
        // Stored data is served straight from the source, so both sizes
        // must describe the same bytes.
        if method == CompressionMethod::Store && info.compressed_size != info.uncompressed_size {
            return Err(Error::SizeMismatch {
                path: info.path.clone(),
                expected: info.uncompressed_size,
                actual: info.compressed_size,
            });
        }
        Ok(method)
    }

    /// Source byte range holding the stored (possibly compressed) data.
    fn data_range(&self) -> Result<Range<u64>, Error> {
        let start = self.shared.data_offset(self.index)?;
        window("entry data", start, self.info().compressed_size)
    }

    fn open_decoder(&self, method: CompressionMethod) -> ReadResult<Decoder> {
        let data = self.data_range()?;
        let raw = SourceReader::new(
            Arc::clone(&self.shared.source),
            data.start,
            data.end,
            self.shared.options.chunk_size,
        );
        decompress::open_decoder(method, raw).map_err(decompress::into_read_error)
    }

    /// Read the whole entry, bypassing the stream cache.
    ///
    /// The output must have exactly the declared length, which itself must
    /// not exceed [`ZipOptions::max_entry_size`](crate::ZipOptions).
    fn read_whole(&self, method: CompressionMethod) -> ReadResult<Vec<u8>> {
        let info = self.info();
        let limit = self.shared.options.max_entry_size;
        if info.uncompressed_size > limit {
            return Err(ReadError::OutOfMemory {
                requested: info.uncompressed_size,
                limit,
            });
        }

        let data = self.data_range()?;
        let raw = self.shared.source.read(Some(data.clone()))?;
        if (raw.len() as u64) < data.end - data.start {
            return Err(Error::Truncated {
                path: info.path.clone(),
                expected: data.end - data.start,
                actual: raw.len() as u64,
            }
            .into());
        }

        let content = decompress::decompress_all(method, &raw, info.uncompressed_size)
            .map_err(decompress::into_read_error)?;
        if content.len() as u64 != info.uncompressed_size {
            tracing::warn!(
                path = %info.path,
                declared = info.uncompressed_size,
                actual = content.len(),
                "entry size differs from central directory"
            );
            return Err(Error::SizeMismatch {
                path: info.path.clone(),
                expected: info.uncompressed_size,
                actual: content.len() as u64,
            }
            .into());
        }

        if self.shared.options.verify_crc {
            let actual = crc::checksum(&content);
            if actual != info.crc32 {
                tracing::warn!(
                    path = %info.path,
                    expected = info.crc32,
                    actual,
                    "CRC-32 mismatch"
                );
                return Err(Error::ChecksumMismatch {
                    path: info.path.clone(),
                    expected: info.crc32,
                    actual,
                }
                .into());
            }
        }

        Ok(content)
    }

    /// Read `range` of a stored entry straight from the source. `range` is
    /// already clamped to the declared length.
    fn read_stored(&self, range: Range<u64>) -> ReadResult<Vec<u8>> {
        let data = self.data_range()?;
        let start = (data.start + range.start).min(data.end);
        let end = (data.start + range.end).clamp(start, data.end);
        let bytes = self.shared.source.read(Some(start..end))?;
        if (bytes.len() as u64) < end - start {
            return Err(self.truncated(range.start + bytes.len() as u64).into());
        }
        Ok(bytes)
    }

    /// Read `range` of a compressed entry through the stream cache.
    fn read_streamed(&self, method: CompressionMethod, range: Range<u64>) -> ReadResult<Vec<u8>> {
        let mut state = self.stream.lock();

        let (mut decoder, position) = match std::mem::replace(&mut *state, StreamState::Closed) {
            StreamState::Open { decoder, position } if position <= range.start => {
                tracing::trace!(path = %self.info().path, position, start = range.start, "reusing stream");
                (decoder, position)
            }
            previous => {
                if let StreamState::Open { position, .. } = previous {
                    tracing::trace!(path = %self.info().path, position, start = range.start, "reopening stream");
                }
                (self.open_decoder(method)?, 0)
            }
        };

        // On any error below the state stays `Closed`, so a broken stream is
        // never reused.
        let delta = range.start - position;
        let skipped =
            decompress::skip(&mut decoder, delta).map_err(decompress::into_read_error)?;
        if skipped < delta {
            return Err(self.truncated(position + skipped).into());
        }

        // The declared length is untrusted; grow with the data actually
        // decoded.
        let wanted = range.end - range.start;
        let mut buffer = Vec::new();
        let filled = decoder
            .by_ref()
            .take(wanted)
            .read_to_end(&mut buffer)
            .map_err(decompress::into_read_error)?;
        if (filled as u64) < wanted {
            return Err(self.truncated(range.start + filled as u64).into());
        }

        *state = StreamState::Open {
            decoder,
            position: range.end,
        };
        Ok(buffer)
    }

    fn truncated(&self, actual: u64) -> Error {
        Error::Truncated {
            path: self.info().path.clone(),
            expected: self.info().uncompressed_size,
            actual,
        }
    }
}

impl Readable for ZipEntry {
    fn length(&self) -> ReadResult<u64> {
        self.shared.ensure_open()?;
        Ok(self.info().uncompressed_size)
    }

    fn read(&self, range: Option<Range<u64>>) -> ReadResult<Vec<u8>> {
        self.shared.ensure_open()?;
        let method = self.method()?;
        let length = self.info().uncompressed_size;

        match (method, range) {
            (method, None) => self.read_whole(method),
            (CompressionMethod::Store, range) => self.read_stored(clamp_range(range, length)),
            (method, Some(range)) => {
                let range = clamp_range(Some(range), length);
                if range.is_empty() {
                    return Ok(Vec::new());
                }
                self.read_streamed(method, range)
            }
        }
    }

    fn close(&self) {
        *self.stream.lock() = StreamState::Closed;
    }
}

impl Entry for ZipEntry {
    fn path(&self) -> &str {
        &self.info().path
    }

    fn declared_length(&self) -> Option<u64> {
        Some(self.info().uncompressed_size)
    }

    fn compressed_length(&self) -> Option<u64> {
        let info = self.info();
        info.is_compressed().then_some(info.compressed_size)
    }
}

impl std::fmt::Debug for ZipEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZipEntry")
            .field("path", &self.info().path)
            .field("cached_position", &self.cached_position())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::tests::{build_zip, open};
    use proptest::prelude::*;
    use quire_common::ReadError;

    fn sample(len: usize) -> Vec<u8> {
        (0..len as u32)
            .map(|i| (i.wrapping_mul(2654435761) >> 24) as u8)
            .collect()
    }

    fn deflated_entry(content: &[u8]) -> ZipEntry {
        let archive = open(build_zip(&[("OEBPS/ch1.xhtml", content, true)]));
        archive.entry("OEBPS/ch1.xhtml").unwrap()
    }

    #[test]
    fn test_whole_read_bypasses_cache() {
        let content = sample(4096);
        let entry = deflated_entry(&content);

        assert_eq!(entry.read(None).unwrap(), content);
        assert_eq!(entry.cached_position(), None);
    }

    #[test]
    fn test_forward_reads_reuse_stream() {
        let content = sample(10_000);
        let entry = deflated_entry(&content);

        assert_eq!(entry.read(Some(0..100)).unwrap(), &content[0..100]);
        assert_eq!(entry.cached_position(), Some(100));
        assert_eq!(entry.read(Some(500..600)).unwrap(), &content[500..600]);
        assert_eq!(entry.cached_position(), Some(600));
        assert_eq!(entry.read(Some(600..9000)).unwrap(), &content[600..9000]);
        assert_eq!(entry.cached_position(), Some(9000));
    }

    #[test]
    fn test_backward_seek_reopens_stream() {
        let content = sample(1000);
        let entry = deflated_entry(&content);

        assert_eq!(entry.read(Some(100..200)).unwrap(), &content[100..200]);
        assert_eq!(entry.cached_position(), Some(200));
        assert_eq!(entry.read(Some(0..50)).unwrap(), &content[0..50]);
        assert_eq!(entry.cached_position(), Some(50));
    }

    #[test]
    fn test_range_clamped_to_declared_length() {
        let content = sample(300);
        let entry = deflated_entry(&content);

        assert_eq!(entry.read(Some(250..1000)).unwrap(), &content[250..300]);
        assert!(entry.read(Some(400..500)).unwrap().is_empty());
    }

    #[test]
    fn test_stored_entry_ranges() {
        let content = sample(512);
        let archive = open(build_zip(&[("image.png", &content, false)]));
        let entry = archive.entry("image.png").unwrap();

        assert_eq!(entry.compressed_length(), None);
        assert_eq!(entry.declared_length(), Some(512));
        assert_eq!(entry.read(Some(10..20)).unwrap(), &content[10..20]);
        assert_eq!(entry.read(Some(0..5)).unwrap(), &content[0..5]);
        assert_eq!(entry.cached_position(), None);
    }

    #[test]
    fn test_compressed_length_reported() {
        let content = vec![b'a'; 4096];
        let entry = deflated_entry(&content);
        assert!(entry.compressed_length().unwrap() < 4096);
        assert_eq!(entry.length().unwrap(), 4096);
    }

    #[test]
    fn test_entry_close_drops_stream_and_is_idempotent() {
        let content = sample(2048);
        let entry = deflated_entry(&content);

        entry.read(Some(0..10)).unwrap();
        entry.close();
        entry.close();
        assert_eq!(entry.cached_position(), None);
        assert_eq!(entry.read(Some(10..20)).unwrap(), &content[10..20]);
    }

    #[test]
    fn test_crc_mismatch_is_decoding_error() {
        let content = sample(128);
        let mut bytes = build_zip(&[("a.bin", &content, true)]);
        // Flip the CRC in the central directory record.
        let cd = crate::signature::find_eocd_signature(&bytes).unwrap();
        let cd_offset =
            u32::from_le_bytes(bytes[cd + 16..cd + 20].try_into().unwrap()) as usize;
        bytes[cd_offset + 16] ^= 0xFF;

        let archive = open(bytes);
        let entry = archive.entry("a.bin").unwrap();
        assert!(matches!(entry.read(None), Err(ReadError::Decoding(_))));
        assert_eq!(entry.read(Some(0..128)).unwrap(), content);
    }

    proptest! {
        #[test]
        fn prop_ascending_chunks_match_whole_read(
            len in 1usize..20_000,
            cuts in proptest::collection::vec(any::<u16>(), 0..12),
        ) {
            let content = sample(len);
            let entry = deflated_entry(&content);
            let whole = entry.read(None).unwrap();

            let mut bounds: Vec<u64> = cuts.iter().map(|c| *c as u64 % len as u64).collect();
            bounds.push(0);
            bounds.push(len as u64);
            bounds.sort_unstable();
            bounds.dedup();

            let mut joined = Vec::with_capacity(len);
            for window in bounds.windows(2) {
                joined.extend(entry.read(Some(window[0]..window[1])).unwrap());
            }
            prop_assert_eq!(joined, whole);
        }
    }
}
