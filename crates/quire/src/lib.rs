//! Quire - publication format sniffing and container access.
//!
//! This crate ties the quire crates together: it decides what a byte source
//! is, and opens it as a resource or a container of entries.
//!
//! # Crates
//!
//! - [`quire_common`] - `Readable`, `Container`, `Format`, hints and errors
//! - [`quire_zip`] - ZIP backend with cached forward streams for ranged reads
//! - [`quire_sniff`] - Sniffers and the composite sniffing pipeline
//! - [`quire_resource`] - Resources, fetchers, exploded directories, HTTP
//!
//! # Example
//!
//! ```no_run
//! use quire::prelude::*;
//!
//! let retriever = AssetRetriever::standard();
//! let asset = retriever.retrieve_path("book.epub", FormatHints::new())?;
//! println!("format: {}", asset.format());
//!
//! if let Some(container) = asset.container() {
//!     for path in container.entries() {
//!         println!("{path}");
//!     }
//!     if let Some(chapter) = container.get("/OEBPS/chapter1.xhtml#section2") {
//!         let head = chapter.read(Some(0..1024))?;
//!     }
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod asset;
mod opener;

pub use quire_common as common;
pub use quire_resource as resource;
pub use quire_sniff as sniff;
pub use quire_zip as zip;

pub use asset::{Asset, AssetRetriever, AssetSniffer, SniffError};
pub use opener::{default_opener, CompositeArchiveOpener, RecursiveArchiveOpener};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::{Asset, AssetRetriever, AssetSniffer, SniffError};
    pub use quire_common::{
        ArchiveOpener, Container, Entry, Format, FormatHints, FormatRegistry, MediaType,
        ReadError, Readable,
    };
    pub use quire_resource::{DirectoryContainer, Fetcher, Link, Resource};
    pub use quire_sniff::{CompositeSniffer, Sniffer};
    pub use quire_zip::{ZipArchive, ZipEntry};
}

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
pub(crate) mod tests {
    use std::io::{Cursor, Write};

    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    /// ZIP bytes built in memory from `(path, content)` pairs.
    pub fn zip_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (path, content) in files {
            writer
                .start_file(*path, SimpleFileOptions::default())
                .unwrap();
            writer.write_all(content).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }
}
