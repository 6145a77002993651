//! Error types for the ZIP backend.

use quire_common::{ParseError, ReadError};
use thiserror::Error;

/// Structural faults found while reading a ZIP archive.
#[derive(Debug, Error)]
pub enum Error {
    /// The byte source failed.
    #[error(transparent)]
    Read(#[from] ReadError),

    /// A record was shorter than its layout.
    #[error("{0}")]
    Parse(#[from] ParseError),

    /// Invalid ZIP magic bytes.
    #[error("invalid ZIP signature: expected {expected:#010x}, got {actual:#010x}")]
    InvalidSignature { expected: u32, actual: u32 },

    /// Could not find the end of central directory record.
    #[error("could not find end of central directory record")]
    EocdNotFound,

    /// ZIP64 record not found when expected.
    #[error("ZIP64 end of central directory not found")]
    Zip64EocdNotFound,

    /// The central directory lies outside the archive.
    #[error("central directory at {offset} (+{size} bytes) exceeds archive length {length}")]
    CentralDirectoryOutOfBounds { offset: u64, size: u64, length: u64 },

    /// An offset plus a length does not fit in 64 bits.
    #[error("{what} at {offset} (+{length} bytes) overflows the address space")]
    OffsetOverflow {
        what: &'static str,
        offset: u64,
        length: u64,
    },

    /// Unsupported compression method.
    #[error("unsupported compression method {method} for {path}")]
    UnsupportedCompression { path: String, method: u16 },

    /// The entry is encrypted.
    #[error("entry is encrypted: {0}")]
    Encrypted(String),

    /// The decompressed content does not match the stored CRC-32.
    #[error("CRC-32 mismatch for {path}: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch {
        path: String,
        expected: u32,
        actual: u32,
    },

    /// The entry content disagrees with the size in the central directory.
    #[error("{path} holds {actual} bytes, central directory declares {expected}")]
    SizeMismatch {
        path: String,
        expected: u64,
        actual: u64,
    },

    /// The stream ended before the declared length.
    #[error("{path} ended after {actual} bytes, expected {expected}")]
    Truncated {
        path: String,
        expected: u64,
        actual: u64,
    },
}

impl From<Error> for ReadError {
    fn from(err: Error) -> Self {
        match err {
            Error::Read(read) => read,
            other => ReadError::Decoding(other.to_string()),
        }
    }
}

/// Result type for ZIP operations.
pub type Result<T> = std::result::Result<T, Error>;
