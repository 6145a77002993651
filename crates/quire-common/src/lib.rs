//! Common contracts for quire.
//!
//! This crate provides the types every other quire crate builds on:
//!
//! - [`Readable`] - ranged reads over any byte source, with [`MemoryBlob`],
//!   [`FileBlob`] and [`MmapBlob`] implementations
//! - [`Container`] and [`Entry`] - sets of named readable entries
//! - [`Format`] and [`FormatRegistry`] - format identifiers and their
//!   `conforms_to` hierarchy
//! - [`FormatHints`] and [`MediaType`] - evidence available before reading
//! - [`ArchiveOpener`] - turns a byte source into a container
//! - [`ReadError`] - the shared error taxonomy
//! - [`BinaryReader`] - zero-copy little-endian parsing

mod archive;
mod container;
mod error;
mod file;
mod format;
mod hints;
mod media_type;
mod readable;
mod reader;

pub mod crc;

pub use archive::{ArchiveOpenError, ArchiveOpener};
pub use container::{lookup_candidates, Container, Entry};
pub use error::{AccessError, ParseError, ParseResult, ReadError, ReadResult};
pub use file::{resolve_within, FileBlob, MmapBlob};
pub use format::{Format, FormatRegistry, FormatInfo, MAX_SUPERTYPE_DEPTH};
pub use hints::FormatHints;
pub use media_type::MediaType;
pub use readable::{clamp_range, MemoryBlob, Readable, DEFAULT_READ_CEILING};
pub use reader::BinaryReader;

/// Re-export zerocopy traits for convenience
pub use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Re-export memchr for signature searches
pub use memchr;
