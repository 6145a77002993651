//! ZIP container backend for quire.
//!
//! Opens ZIP archives (including ZIP64) over any
//! [`Readable`](quire_common::Readable) byte source and exposes them as a
//! [`Container`](quire_common::Container):
//!
//! - Store (method 0), DEFLATE (method 8) and Zstandard (method 93) entries
//! - Lazy entry data access: only the central directory is read at open
//! - Ranged reads on compressed entries through a per-entry forward stream
//!   cache, so ascending reads decompress each byte once
//! - CRC-32 verification of whole-entry reads
//!
//! # Example
//!
//! ```no_run
//! use quire_common::{Container, Readable};
//! use quire_zip::ZipArchive;
//!
//! let archive = ZipArchive::open("book.epub")?;
//!
//! for entry in archive.iter() {
//!     println!("{}: {} bytes", entry.path(), entry.uncompressed_size());
//! }
//!
//! if let Some(chapter) = archive.get("/OEBPS/chapter1.xhtml#intro") {
//!     let head = chapter.read(Some(0..512))?;
//!     let next = chapter.read(Some(512..1024))?; // reuses the stream
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod archive;
mod decompress;
mod entry;
mod error;
mod opener;
mod records;
mod signature;

pub use archive::{ZipArchive, ZipEntryInfo, ZipOptions};
pub use entry::ZipEntry;
pub use error::{Error, Result};
pub use opener::ZipArchiveOpener;
pub use records::CompressionMethod;
pub use signature::has_zip_magic;
