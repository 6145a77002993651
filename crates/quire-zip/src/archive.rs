//! ZIP archive reader over any byte source.
//!
//! The central directory is read once at open time; entry data is fetched
//! lazily through the source when an entry is read.

use std::collections::HashMap;
use std::ops::Range;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use quire_common::{
    BinaryReader, Container, Entry, MmapBlob, ReadError, ReadResult, Readable,
    DEFAULT_READ_CEILING,
};

use crate::entry::ZipEntry;
use crate::records::{
    read_record, CentralHeader, CompressionMethod, EndOfCentralDirectory, LocalHeader, Record,
    Zip64EndOfCentralDirectory, Zip64Locator, FLAG_ENCRYPTED, ZIP64_EXTRA_TAG,
};
use crate::signature;
use crate::{Error, Result};

/// Tuning knobs for [`ZipArchive`].
#[derive(Debug, Clone)]
pub struct ZipOptions {
    /// Bytes fetched from the source per refill while streaming compressed
    /// data.
    pub chunk_size: usize,
    /// Verify the CRC-32 of whole-entry reads.
    pub verify_crc: bool,
    /// Largest declared size a whole-entry read will materialise.
    pub max_entry_size: u64,
}

impl Default for ZipOptions {
    fn default() -> Self {
        Self {
            chunk_size: 64 * 1024,
            verify_crc: true,
            max_entry_size: DEFAULT_READ_CEILING,
        }
    }
}

/// Central directory metadata of one file entry.
#[derive(Debug)]
pub struct ZipEntryInfo {
    pub(crate) path: String,
    pub(crate) compressed_size: u64,
    pub(crate) uncompressed_size: u64,
    pub(crate) compression_method: u16,
    pub(crate) flags: u16,
    pub(crate) local_header_offset: u64,
    pub(crate) crc32: u32,
    /// Start of the entry data, resolved from the local header on first read.
    pub(crate) data_offset: OnceLock<u64>,
}

impl ZipEntryInfo {
    /// Path inside the archive, `/`-separated.
    #[inline]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[inline]
    pub fn compressed_size(&self) -> u64 {
        self.compressed_size
    }

    #[inline]
    pub fn uncompressed_size(&self) -> u64 {
        self.uncompressed_size
    }

    /// Raw method number from the central directory.
    #[inline]
    pub fn compression_method_raw(&self) -> u16 {
        self.compression_method
    }

    pub fn compression_method(&self) -> Option<CompressionMethod> {
        CompressionMethod::try_from(self.compression_method).ok()
    }

    /// Whether the entry is stored compressed (any method but store).
    #[inline]
    pub fn is_compressed(&self) -> bool {
        self.compression_method != CompressionMethod::Store as u16
    }

    #[inline]
    pub fn is_encrypted(&self) -> bool {
        self.flags & FLAG_ENCRYPTED != 0
    }

    #[inline]
    pub fn crc32(&self) -> u32 {
        self.crc32
    }
}

/// State shared between an archive and the entries handed out from it.
pub(crate) struct Shared {
    pub(crate) source: Arc<dyn Readable>,
    pub(crate) entries: Vec<ZipEntryInfo>,
    pub(crate) index: HashMap<String, usize>,
    pub(crate) closed: AtomicBool,
    pub(crate) options: ZipOptions,
}

impl Shared {
    pub(crate) fn ensure_open(&self) -> ReadResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ReadError::closed());
        }
        Ok(())
    }

    /// Offset of the first data byte of entry `index`.
    pub(crate) fn data_offset(&self, index: usize) -> Result<u64> {
        let info = &self.entries[index];
        if let Some(offset) = info.data_offset.get() {
            return Ok(*offset);
        }

        let start = info.local_header_offset;
        let bytes = self
            .source
            .read(Some(window("local header", start, LocalHeader::SIZE)?))?;
        let header: LocalHeader = read_record(&mut BinaryReader::new(&bytes))?;

        let offset = header.data_offset(start).ok_or(Error::OffsetOverflow {
            what: "entry data",
            offset: start,
            length: LocalHeader::SIZE,
        })?;
        let _ = info.data_offset.set(offset);
        Ok(offset)
    }
}

/// A ZIP archive opened over a [`Readable`].
///
/// Implements [`Container`]: entries are listed in central directory order,
/// directories are skipped, and `\` separators are normalised to `/`.
pub struct ZipArchive {
    shared: Arc<Shared>,
}

impl ZipArchive {
    /// Open a ZIP file from disk through a memory map.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let source = MmapBlob::open(path.as_ref())?;
        Self::from_readable(Arc::new(source))
    }

    /// Open an archive over any byte source with default options.
    pub fn from_readable(source: Arc<dyn Readable>) -> Result<Self> {
        Self::with_options(source, ZipOptions::default())
    }

    pub fn with_options(source: Arc<dyn Readable>, options: ZipOptions) -> Result<Self> {
        let (entries, index) = index_entries(parse_central_directory(source.as_ref())?);

        tracing::debug!(entries = entries.len(), "opened ZIP archive");

        Ok(Self {
            shared: Arc::new(Shared {
                source,
                entries,
                index,
                closed: AtomicBool::new(false),
                options,
            }),
        })
    }

    #[inline]
    pub fn entry_count(&self) -> usize {
        self.shared.entries.len()
    }

    /// Iterate over entry metadata in archive order.
    pub fn iter(&self) -> impl Iterator<Item = &ZipEntryInfo> + '_ {
        self.shared.entries.iter()
    }

    /// Metadata of the entry at exactly `path`.
    pub fn find(&self, path: &str) -> Option<&ZipEntryInfo> {
        self.shared
            .index
            .get(path)
            .map(|&i| &self.shared.entries[i])
    }

    /// Readable handle on the entry at exactly `path`.
    pub fn entry(&self, path: &str) -> Option<ZipEntry> {
        self.shared
            .index
            .get(path)
            .map(|&i| ZipEntry::new(Arc::clone(&self.shared), i))
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }
}

impl Container for ZipArchive {
    fn entries(&self) -> Vec<String> {
        self.shared.entries.iter().map(|e| e.path.clone()).collect()
    }

    fn get_exact(&self, path: &str) -> Option<Box<dyn Entry>> {
        self.entry(path).map(|e| Box::new(e) as Box<dyn Entry>)
    }

    fn close(&self) {
        if !self.shared.closed.swap(true, Ordering::AcqRel) {
            tracing::trace!("closing ZIP archive");
            self.shared.source.close();
        }
    }
}

impl std::fmt::Debug for ZipArchive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZipArchive")
            .field("entries", &self.shared.entries.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// `offset..offset + length`, or an error when the end overflows.
pub(crate) fn window(what: &'static str, offset: u64, length: u64) -> Result<Range<u64>> {
    match offset.checked_add(length) {
        Some(end) => Ok(offset..end),
        None => Err(Error::OffsetOverflow {
            what,
            offset,
            length,
        }),
    }
}

/// Index entries by path. A repeated name keeps its first record; later
/// ones are dropped so that listing and lookup agree.
fn index_entries(parsed: Vec<ZipEntryInfo>) -> (Vec<ZipEntryInfo>, HashMap<String, usize>) {
    let mut index = HashMap::with_capacity(parsed.len());
    let mut entries = Vec::with_capacity(parsed.len());
    for entry in parsed {
        if index.contains_key(&entry.path) {
            tracing::warn!(path = %entry.path, "duplicate entry name, keeping the first record");
            continue;
        }
        index.insert(entry.path.clone(), entries.len());
        entries.push(entry);
    }
    (entries, index)
}

/// Locate and parse the central directory of the archive in `source`.
fn parse_central_directory(source: &dyn Readable) -> Result<Vec<ZipEntryInfo>> {
    let length = source.length()?;
    if length < EndOfCentralDirectory::SIZE {
        return Err(Error::EocdNotFound);
    }

    let tail_start = length.saturating_sub(EndOfCentralDirectory::MAX_TAIL);
    let tail = source.read(Some(tail_start..length))?;
    let eocd_in_tail = signature::find_eocd_signature(&tail).ok_or(Error::EocdNotFound)?;
    let eocd_offset = tail_start + eocd_in_tail as u64;

    let eocd: EndOfCentralDirectory = read_record(&mut BinaryReader::new_at(&tail, eocd_in_tail))?;

    let (total_entries, cd_offset, cd_size) = if eocd.needs_zip64() {
        read_zip64_eocd(source, eocd_offset)?
    } else {
        (
            eocd.entries as u64,
            eocd.directory_offset as u64,
            eocd.directory_size as u64,
        )
    };

    if cd_offset.saturating_add(cd_size) > eocd_offset {
        return Err(Error::CentralDirectoryOutOfBounds {
            offset: cd_offset,
            size: cd_size,
            length,
        });
    }

    let cd_data = source.read(Some(cd_offset..cd_offset + cd_size))?;
    let mut reader = BinaryReader::new(&cd_data);
    // The count field is only trusted as a capacity hint.
    let mut entries = Vec::with_capacity(total_entries.min(65_536) as usize);

    for _ in 0..total_entries {
        if let Some(entry) = read_cd_entry(&mut reader)? {
            entries.push(entry);
        }
    }

    Ok(entries)
}

/// Read one central directory record. Returns `None` for directories.
fn read_cd_entry(reader: &mut BinaryReader) -> Result<Option<ZipEntryInfo>> {
    let header: CentralHeader = read_record(reader)?;
    let name = reader.read_string_lossy(header.name_length as usize)?;
    let path = name.replace('\\', "/");

    let mut compressed_size = header.compressed_size as u64;
    let mut uncompressed_size = header.uncompressed_size as u64;
    let mut local_header_offset = header.local_offset as u64;

    let extra_data = reader.read_bytes(header.extra_length as usize)?;
    let mut extra = BinaryReader::new(extra_data);
    while extra.remaining() >= 4 {
        let id = extra.read_u16()?;
        let size = extra.read_u16()? as usize;
        let field = extra.read_bytes(size.min(extra.remaining()))?;
        if id != ZIP64_EXTRA_TAG {
            continue;
        }

        // Only the fields saturated in the fixed header are present, in
        // this order.
        let mut zip64 = BinaryReader::new(field);
        if header.uncompressed_size == u32::MAX {
            uncompressed_size = zip64.read_u64()?;
        }
        if header.compressed_size == u32::MAX {
            compressed_size = zip64.read_u64()?;
        }
        if header.local_offset == u32::MAX {
            local_header_offset = zip64.read_u64()?;
        }
    }

    reader.advance(header.comment_length as usize);

    if path.ends_with('/') {
        return Ok(None);
    }
    if path.contains('\u{FFFD}') {
        tracing::warn!(path = %path, "entry name is not valid UTF-8");
    }

    Ok(Some(ZipEntryInfo {
        path,
        compressed_size,
        uncompressed_size,
        compression_method: header.method,
        flags: header.flags,
        local_header_offset,
        crc32: header.crc32,
        data_offset: OnceLock::new(),
    }))
}

/// Read the ZIP64 locator preceding the EOCD at `eocd_offset`, then the
/// ZIP64 EOCD record it points to.
fn read_zip64_eocd(source: &dyn Readable, eocd_offset: u64) -> Result<(u64, u64, u64)> {
    if eocd_offset < Zip64Locator::SIZE {
        return Err(Error::Zip64EocdNotFound);
    }

    let locator_offset = eocd_offset - Zip64Locator::SIZE;
    let bytes = source.read(Some(locator_offset..eocd_offset))?;
    let locator: Zip64Locator =
        read_record(&mut BinaryReader::new(&bytes)).map_err(|_| Error::Zip64EocdNotFound)?;

    let record = window(
        "ZIP64 end record",
        locator.end_offset,
        Zip64EndOfCentralDirectory::SIZE,
    )?;
    let bytes = source.read(Some(record))?;
    let end: Zip64EndOfCentralDirectory = read_record(&mut BinaryReader::new(&bytes))?;

    Ok((end.entries, end.directory_offset, end.directory_size))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use quire_common::MemoryBlob;
    use std::io::{Cursor, Write};
    use zip::write::SimpleFileOptions;

    /// Build an in-memory ZIP. `true` entries are deflated, `false` stored.
    pub(crate) fn build_zip(files: &[(&str, &[u8], bool)]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data, deflated) in files {
            let method = if *deflated {
                zip::CompressionMethod::Deflated
            } else {
                zip::CompressionMethod::Stored
            };
            writer
                .start_file(*name, SimpleFileOptions::default().compression_method(method))
                .unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    pub(crate) fn open(bytes: Vec<u8>) -> ZipArchive {
        ZipArchive::from_readable(Arc::new(MemoryBlob::from(bytes))).unwrap()
    }

    /// Overwrite a `u32` field of the first central directory record.
    /// Field offsets count from its signature: CRC-32 at 16, compressed
    /// size at 20, uncompressed size at 24.
    pub(crate) fn patch_central_u32(bytes: &mut [u8], field: usize, value: u32) {
        let eocd = signature::find_eocd_signature(bytes).unwrap();
        let cd = u32::from_le_bytes(bytes[eocd + 16..eocd + 20].try_into().unwrap()) as usize;
        bytes[cd + field..cd + field + 4].copy_from_slice(&value.to_le_bytes());
    }

    fn sample(len: usize) -> Vec<u8> {
        (0..len as u32).map(|i| (i % 251) as u8 ^ (i >> 9) as u8).collect()
    }

    #[test]
    fn test_lists_entries_in_archive_order() {
        let bytes = build_zip(&[
            ("mimetype", b"application/epub+zip", false),
            ("META-INF/container.xml", b"<container/>", true),
            ("OEBPS/ch1.xhtml", b"<html/>", true),
        ]);
        let archive = open(bytes);

        assert_eq!(
            archive.entries(),
            vec!["mimetype", "META-INF/container.xml", "OEBPS/ch1.xhtml"]
        );
        assert_eq!(archive.entry_count(), 3);
    }

    #[test]
    fn test_skips_directories() {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .add_directory("OEBPS/", SimpleFileOptions::default())
            .unwrap();
        writer
            .start_file("OEBPS/a.txt", SimpleFileOptions::default())
            .unwrap();
        writer.write_all(b"a").unwrap();
        let archive = open(writer.finish().unwrap().into_inner());

        assert_eq!(archive.entries(), vec!["OEBPS/a.txt"]);
    }

    #[test]
    fn test_entry_metadata() {
        let text = "lorem ipsum ".repeat(200);
        let bytes = build_zip(&[
            ("stored.txt", text.as_bytes(), false),
            ("deflated.txt", text.as_bytes(), true),
        ]);
        let archive = open(bytes);

        let stored = archive.find("stored.txt").unwrap();
        assert!(!stored.is_compressed());
        assert_eq!(stored.uncompressed_size(), text.len() as u64);

        let deflated = archive.find("deflated.txt").unwrap();
        assert_eq!(deflated.compression_method(), Some(CompressionMethod::Deflate));
        assert!(deflated.compressed_size() < deflated.uncompressed_size());
        assert_eq!(deflated.crc32(), quire_common::crc::checksum(text.as_bytes()));
    }

    #[test]
    fn test_not_a_zip() {
        let source = Arc::new(MemoryBlob::from(b"%PDF-1.7 not an archive at all".to_vec()));
        assert!(matches!(
            ZipArchive::from_readable(source),
            Err(Error::EocdNotFound)
        ));
    }

    #[test]
    fn test_central_directory_out_of_bounds_is_decoding_error() {
        let mut bytes = build_zip(&[("a.txt", b"hello", false)]);
        // Point the EOCD at a central directory beyond its own offset.
        let eocd = signature::find_eocd_signature(&bytes).unwrap();
        let bogus_offset = eocd as u32 + 100;
        bytes[eocd + 16..eocd + 20].copy_from_slice(&bogus_offset.to_le_bytes());
        let err = ZipArchive::from_readable(Arc::new(MemoryBlob::from(bytes))).unwrap_err();
        assert!(matches!(ReadError::from(err), ReadError::Decoding(_)));
    }

    #[test]
    fn test_empty_archive() {
        let archive = open(build_zip(&[]));
        assert!(archive.entries().is_empty());
        assert!(archive.get("anything").is_none());
    }

    #[test]
    fn test_lookup_fallback_strips_fragment() {
        let archive = open(build_zip(&[("chapter1.xhtml", b"<html/>", true)]));

        let entry = archive.get("/chapter1.xhtml#section2").unwrap();
        assert_eq!(entry.path(), "chapter1.xhtml");
        assert_eq!(entry.read(None).unwrap(), b"<html/>");
        assert!(archive.get("/chapter2.xhtml#section2").is_none());
    }

    #[test]
    fn test_listed_paths_always_resolve() {
        let archive = open(build_zip(&[
            ("a.txt", b"a", false),
            ("dir/b#c.txt", b"b", true),
            ("dir/with space.txt", b"c", true),
        ]));
        for path in archive.entries() {
            assert!(archive.get(&path).is_some(), "{path} should resolve");
        }
    }

    #[test]
    fn test_close_twice_then_read_fails() {
        let archive = open(build_zip(&[("a.txt", b"hello", true)]));
        let entry = archive.get("a.txt").unwrap();

        archive.close();
        archive.close();
        assert!(archive.is_closed());
        assert!(matches!(
            entry.read(Some(0..2)),
            Err(ReadError::Access(quire_common::AccessError::Closed))
        ));
        archive.close();
    }

    #[test]
    fn test_window_overflow() {
        assert_eq!(window("x", 4, 2).unwrap(), 4..6);
        assert!(matches!(
            window("x", u64::MAX - 1, 2),
            Err(Error::OffsetOverflow { offset, length: 2, .. }) if offset == u64::MAX - 1
        ));
    }

    #[test]
    fn test_zip64_locator_past_address_space_is_error() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&Zip64Locator::SIGNATURE);
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&(u64::MAX - 5).to_le_bytes());
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.extend_from_slice(&EndOfCentralDirectory::SIGNATURE);
        bytes.extend_from_slice(&[0; 4]); // disk numbers
        bytes.extend_from_slice(&[0xFF; 4]); // entry counts
        bytes.extend_from_slice(&[0xFF; 8]); // directory size and offset
        bytes.extend_from_slice(&[0; 2]); // comment length
        assert_eq!(bytes.len(), 42);

        let err = ZipArchive::from_readable(Arc::new(MemoryBlob::from(bytes))).unwrap_err();
        assert!(matches!(err, Error::OffsetOverflow { .. }), "{err:?}");
    }

    #[test]
    fn test_entry_count_beyond_directory_is_error() {
        let mut bytes = build_zip(&[("a.txt", b"hello", false)]);
        let eocd = signature::find_eocd_signature(&bytes).unwrap();
        bytes[eocd + 8..eocd + 10].copy_from_slice(&5u16.to_le_bytes());
        bytes[eocd + 10..eocd + 12].copy_from_slice(&5u16.to_le_bytes());

        let err = ZipArchive::from_readable(Arc::new(MemoryBlob::from(bytes))).unwrap_err();
        assert!(matches!(ReadError::from(err), ReadError::Decoding(_)));
    }

    #[test]
    fn test_duplicate_names_keep_first_record() {
        let mut bytes = build_zip(&[("a.txt", b"first", true), ("b.txt", b"second", true)]);
        // Rename the second entry in both of its headers.
        let renamed: Vec<usize> =
            quire_common::memchr::memmem::find_iter(&bytes, b"b.txt").collect();
        assert_eq!(renamed.len(), 2);
        for at in renamed {
            bytes[at] = b'a';
        }

        let archive = open(bytes);
        assert_eq!(archive.entries(), vec!["a.txt"]);
        assert_eq!(archive.entry_count(), 1);
        assert_eq!(archive.get("a.txt").unwrap().read(None).unwrap(), b"first");
    }

    #[test]
    fn test_declared_size_below_content_is_error() {
        let content = sample(100_000);
        let mut bytes = build_zip(&[("big.bin", &content, true)]);
        patch_central_u32(&mut bytes, 24, 10);

        let entry = open(bytes).entry("big.bin").unwrap();
        assert_eq!(entry.length().unwrap(), 10);
        assert!(matches!(entry.read(None), Err(ReadError::Decoding(_))));
        // Ranged reads stop at the declared length.
        assert_eq!(entry.read(Some(0..100)).unwrap(), &content[..10]);
    }

    #[test]
    fn test_declared_size_above_content_is_error() {
        let content = sample(1000);
        let mut bytes = build_zip(&[("short.bin", &content, true)]);
        patch_central_u32(&mut bytes, 24, 5000);

        let entry = open(bytes).entry("short.bin").unwrap();
        assert!(matches!(entry.read(None), Err(ReadError::Decoding(_))));
        assert!(matches!(entry.read(Some(900..2000)), Err(ReadError::Decoding(_))));
    }

    #[test]
    fn test_whole_read_over_limit_is_out_of_memory() {
        let content = sample(4096);
        let bytes = build_zip(&[("a.bin", &content, true), ("b.bin", &content, false)]);
        let options = ZipOptions {
            max_entry_size: 1024,
            ..ZipOptions::default()
        };
        let archive =
            ZipArchive::with_options(Arc::new(MemoryBlob::from(bytes)), options).unwrap();

        for path in ["a.bin", "b.bin"] {
            let entry = archive.entry(path).unwrap();
            assert!(matches!(
                entry.read(None),
                Err(ReadError::OutOfMemory {
                    requested: 4096,
                    limit: 1024
                })
            ));
            assert_eq!(entry.read(Some(100..200)).unwrap(), &content[100..200]);
        }
    }

    #[test]
    fn test_stored_sizes_past_data_are_error() {
        let mut bytes = build_zip(&[("a.txt", b"hello", false)]);
        patch_central_u32(&mut bytes, 20, 40);
        patch_central_u32(&mut bytes, 24, 40);

        let entry = open(bytes).entry("a.txt").unwrap();
        assert!(matches!(entry.read(None), Err(ReadError::Decoding(_))));
    }

    #[test]
    fn test_stored_size_disagreement_is_error() {
        let mut bytes = build_zip(&[("a.txt", b"hello", false)]);
        patch_central_u32(&mut bytes, 24, 40);

        let entry = open(bytes).entry("a.txt").unwrap();
        assert!(matches!(entry.read(None), Err(ReadError::Decoding(_))));
        assert!(matches!(entry.read(Some(0..40)), Err(ReadError::Decoding(_))));
    }

    #[test]
    fn test_stored_crc_mismatch_is_error() {
        let mut bytes = build_zip(&[("a.txt", b"hello", false)]);
        patch_central_u32(&mut bytes, 16, 0xDEAD_BEEF);

        let entry = open(bytes).entry("a.txt").unwrap();
        assert!(matches!(entry.read(None), Err(ReadError::Decoding(_))));
        // Ranged reads do not verify the checksum.
        assert_eq!(entry.read(Some(0..5)).unwrap(), b"hello");
    }
}
