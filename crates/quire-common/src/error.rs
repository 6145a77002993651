//! Error types shared by every quire crate.
//!
//! Expected negative outcomes ("entry not found", "format not supported",
//! "sniffer has no opinion") are modelled as values elsewhere. The types here
//! describe actual failures to obtain bytes.

use std::io;

use thiserror::Error;

/// Failure to read from a [`Readable`](crate::Readable).
#[derive(Debug, Error)]
pub enum ReadError {
    /// The bytes could not be reached: missing, forbidden, closed or I/O fault.
    #[error("access error: {0}")]
    Access(#[from] AccessError),

    /// The bytes were reached but are malformed (corrupt archive index,
    /// broken compressed stream, checksum mismatch).
    #[error("decoding error: {0}")]
    Decoding(String),

    /// The read was aborted by the transport.
    #[error("read cancelled")]
    Cancelled,

    /// Transient failure, e.g. the network is offline or the server is down.
    #[error("resource unavailable: {0}")]
    Unavailable(String),

    /// The source does not support the requested operation.
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// A whole-content read was refused because the content exceeds a ceiling.
    #[error("content of {requested} bytes exceeds the {limit} byte read ceiling")]
    OutOfMemory { requested: u64, limit: u64 },
}

/// The ways a byte source can be unreachable.
#[derive(Debug, Error)]
pub enum AccessError {
    /// Nothing exists at this path or link.
    #[error("not found: {0}")]
    NotFound(String),

    /// The source exists but may not be read.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The readable or its owning container was closed.
    #[error("resource is closed")]
    Closed,

    /// Underlying device or OS error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// An HTTP status the transport could not classify further.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },
}

impl ReadError {
    /// Shortcut for `ReadError::Access(AccessError::NotFound(..))`.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::Access(AccessError::NotFound(what.into()))
    }

    /// Shortcut for `ReadError::Access(AccessError::Closed)`.
    pub fn closed() -> Self {
        Self::Access(AccessError::Closed)
    }

    /// Whether this error means the source simply does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Access(AccessError::NotFound(_)))
    }
}

impl From<io::Error> for ReadError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::not_found(err.to_string()),
            io::ErrorKind::PermissionDenied => {
                Self::Access(AccessError::Forbidden(err.to_string()))
            }
            io::ErrorKind::Interrupted => Self::Cancelled,
            io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof => {
                Self::Decoding(err.to_string())
            }
            _ => Self::Access(AccessError::Io(err)),
        }
    }
}

/// Errors raised by [`BinaryReader`](crate::BinaryReader) while parsing
/// binary structures.
#[derive(Debug, Error)]
pub enum ParseError {
    /// End of buffer reached while reading.
    #[error("unexpected end of buffer: needed {needed} bytes but only {available} available")]
    UnexpectedEof { needed: usize, available: usize },

    /// Invalid magic bytes encountered.
    #[error("invalid magic: expected {expected:02x?}, got {actual:02x?}")]
    InvalidMagic { expected: Vec<u8>, actual: Vec<u8> },
}

impl From<ParseError> for ReadError {
    fn from(err: ParseError) -> Self {
        Self::Decoding(err.to_string())
    }
}

/// Result type for read operations.
pub type ReadResult<T> = std::result::Result<T, ReadError>;

/// Result type for binary parsing.
pub type ParseResult<T> = std::result::Result<T, ParseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_not_found_maps_to_access_not_found() {
        let err: ReadError = io::Error::new(io::ErrorKind::NotFound, "gone").into();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_io_invalid_data_maps_to_decoding() {
        let err: ReadError = io::Error::new(io::ErrorKind::InvalidData, "corrupt deflate").into();
        assert!(matches!(err, ReadError::Decoding(_)));
    }

    #[test]
    fn test_parse_error_is_decoding() {
        let err: ReadError = ParseError::UnexpectedEof {
            needed: 4,
            available: 1,
        }
        .into();
        assert!(matches!(err, ReadError::Decoding(_)));
        assert!(!err.is_not_found());
    }
}
