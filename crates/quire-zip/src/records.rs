//! On-disk ZIP records.
//!
//! Every record starts with a four byte signature followed by a packed
//! little-endian fixed part. [`read_record`] checks the signature and reads
//! the fixed part; the variable-length tail (name, extra field, comment) is
//! left to the caller.

use quire_common::BinaryReader;
use zerocopy::{FromBytes, Immutable, KnownLayout};

use crate::{Error, Result};

/// A fixed-layout record introduced by a signature.
pub trait Record: FromBytes + Sized {
    const SIGNATURE: [u8; 4];

    /// Bytes on disk, signature included, variable tail excluded.
    const SIZE: u64 = 4 + std::mem::size_of::<Self>() as u64;
}

/// Check the signature of `R` at the cursor and read its fixed part.
pub fn read_record<R: Record>(reader: &mut BinaryReader) -> Result<R> {
    let expected = u32::from_le_bytes(R::SIGNATURE);
    let actual = reader.read_u32()?;
    if actual != expected {
        return Err(Error::InvalidSignature { expected, actual });
    }
    Ok(reader.read_struct()?)
}

/// General purpose flag bit 0.
pub const FLAG_ENCRYPTED: u16 = 0x0001;

/// Extra field tag carrying 64-bit sizes and offsets.
pub const ZIP64_EXTRA_TAG: u16 = 0x0001;

/// Compression methods the reader can decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum CompressionMethod {
    Store = 0,
    Deflate = 8,
    /// Zstandard, APPNOTE method 93.
    Zstd = 93,
}

impl TryFrom<u16> for CompressionMethod {
    type Error = u16;

    fn try_from(value: u16) -> std::result::Result<Self, u16> {
        match value {
            0 => Ok(Self::Store),
            8 => Ok(Self::Deflate),
            93 => Ok(Self::Zstd),
            other => Err(other),
        }
    }
}

/// End of central directory. Counts, size and offset saturate at their
/// maximum when the real values live in the ZIP64 record.
#[derive(Debug, Clone, Copy, FromBytes, Immutable, KnownLayout)]
#[repr(C, packed)]
pub struct EndOfCentralDirectory {
    pub disk: u16,
    pub directory_disk: u16,
    pub entries_on_disk: u16,
    pub entries: u16,
    pub directory_size: u32,
    pub directory_offset: u32,
    pub comment_length: u16,
}

impl Record for EndOfCentralDirectory {
    const SIGNATURE: [u8; 4] = *b"PK\x05\x06";
}

impl EndOfCentralDirectory {
    /// Furthest the record can start from the end of the archive: its own
    /// size plus the longest comment.
    pub const MAX_TAIL: u64 = Self::SIZE + u16::MAX as u64;

    pub fn needs_zip64(&self) -> bool {
        let (entries, size, offset) = (self.entries, self.directory_size, self.directory_offset);
        entries == u16::MAX || size == u32::MAX || offset == u32::MAX
    }
}

/// Pointer to the ZIP64 end record, stored right before the classic one.
#[derive(Debug, Clone, Copy, FromBytes, Immutable, KnownLayout)]
#[repr(C, packed)]
pub struct Zip64Locator {
    pub end_disk: u32,
    pub end_offset: u64,
    pub disks: u32,
}

impl Record for Zip64Locator {
    const SIGNATURE: [u8; 4] = *b"PK\x06\x07";
}

#[derive(Debug, Clone, Copy, FromBytes, Immutable, KnownLayout)]
#[repr(C, packed)]
pub struct Zip64EndOfCentralDirectory {
    pub record_size: u64,
    pub made_by: u16,
    pub needed: u16,
    pub disk: u32,
    pub directory_disk: u32,
    pub entries_on_disk: u64,
    pub entries: u64,
    pub directory_size: u64,
    pub directory_offset: u64,
}

impl Record for Zip64EndOfCentralDirectory {
    const SIGNATURE: [u8; 4] = *b"PK\x06\x06";
}

/// Central directory file header. Followed by the name, the extra field
/// and the comment.
#[derive(Debug, Clone, Copy, FromBytes, Immutable, KnownLayout)]
#[repr(C, packed)]
pub struct CentralHeader {
    pub made_by: u16,
    pub needed: u16,
    pub flags: u16,
    pub method: u16,
    pub dos_time: u32,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub name_length: u16,
    pub extra_length: u16,
    pub comment_length: u16,
    pub start_disk: u16,
    pub internal_attributes: u16,
    pub external_attributes: u32,
    pub local_offset: u32,
}

impl Record for CentralHeader {
    const SIGNATURE: [u8; 4] = *b"PK\x01\x02";
}

/// Local file header. Its name and extra lengths may differ from the
/// central copy, so entry data is located from this header.
#[derive(Debug, Clone, Copy, FromBytes, Immutable, KnownLayout)]
#[repr(C, packed)]
pub struct LocalHeader {
    pub needed: u16,
    pub flags: u16,
    pub method: u16,
    pub dos_time: u32,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub name_length: u16,
    pub extra_length: u16,
}

impl Record for LocalHeader {
    const SIGNATURE: [u8; 4] = *b"PK\x03\x04";
}

impl LocalHeader {
    /// Offset of the first data byte for a header starting at `start`, or
    /// `None` past `u64::MAX`.
    pub fn data_offset(&self, start: u64) -> Option<u64> {
        start.checked_add(Self::SIZE + self.name_length as u64 + self.extra_length as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_sizes_match_appnote() {
        assert_eq!(EndOfCentralDirectory::SIZE, 22);
        assert_eq!(Zip64Locator::SIZE, 20);
        assert_eq!(Zip64EndOfCentralDirectory::SIZE, 56);
        assert_eq!(CentralHeader::SIZE, 46);
        assert_eq!(LocalHeader::SIZE, 30);
    }

    #[test]
    fn test_read_record_checks_signature() {
        let mut bytes = LocalHeader::SIGNATURE.to_vec();
        bytes.extend_from_slice(&[0u8; 26]);
        bytes[26] = 5; // name length
        let header: LocalHeader = read_record(&mut BinaryReader::new(&bytes)).unwrap();
        assert_eq!(header.data_offset(100), Some(135));
        assert_eq!(header.data_offset(u64::MAX - 34), None);

        let err = read_record::<CentralHeader>(&mut BinaryReader::new(&bytes)).unwrap_err();
        assert!(matches!(err, Error::InvalidSignature { .. }));
    }

    #[test]
    fn test_zip64_sentinels() {
        let mut bytes = vec![0u8; 18];
        let mut reader = BinaryReader::new(&bytes);
        let plain: EndOfCentralDirectory = reader.read_struct().unwrap();
        assert!(!plain.needs_zip64());

        bytes[12..16].copy_from_slice(&u32::MAX.to_le_bytes());
        let mut reader = BinaryReader::new(&bytes);
        let saturated: EndOfCentralDirectory = reader.read_struct().unwrap();
        assert!(saturated.needs_zip64());
    }

    #[test]
    fn test_compression_method_codes() {
        assert_eq!(CompressionMethod::try_from(8), Ok(CompressionMethod::Deflate));
        assert_eq!(CompressionMethod::try_from(93), Ok(CompressionMethod::Zstd));
        assert_eq!(CompressionMethod::try_from(14), Err(14));
    }
}
