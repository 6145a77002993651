//! Signature searches over archive tails.

use quire_common::memchr;

use crate::records::{EndOfCentralDirectory, Record};

/// Search backwards for the EOCD signature (0x06054b50) in `data`.
///
/// Returns the offset of the last occurrence whose fixed-size record fits in
/// `data`. `memchr` uses SIMD internally.
#[inline]
pub fn find_eocd_signature(data: &[u8]) -> Option<usize> {
    let record = EndOfCentralDirectory::SIZE as usize;
    if data.len() < record {
        return None;
    }

    // A signature starting closer to the end than a full record is a false
    // positive inside a comment.
    let searchable = &data[..data.len() - record + 4];
    memchr::memmem::rfind(searchable, &EndOfCentralDirectory::SIGNATURE)
}

/// Whether `prefix` starts like a ZIP archive: a local file header, or the
/// EOCD of an empty archive, or a spanned-archive marker.
pub fn has_zip_magic(prefix: &[u8]) -> bool {
    prefix.starts_with(b"PK\x03\x04")
        || prefix.starts_with(b"PK\x05\x06")
        || prefix.starts_with(b"PK\x07\x08")
}
