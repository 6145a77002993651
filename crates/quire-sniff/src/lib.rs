//! Format sniffing for quire.
//!
//! A [`Sniffer`] refines a format guess from three kinds of evidence, each
//! in its own phase:
//!
//! 1. declared media types and file extensions ([`FormatHints`]), no I/O;
//! 2. the content of a blob, seen through a [`SniffSource`] that reads a
//!    bounded prefix once and caches the text, XML root and JSON views;
//! 3. the entries of a [`Container`].
//!
//! [`CompositeSniffer`] folds an ordered list of sniffers over each phase.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use quire_common::{Format, FormatHints, FormatRegistry, MemoryBlob};
//! use quire_sniff::CompositeSniffer;
//!
//! let sniffer = CompositeSniffer::default_chain(Arc::new(FormatRegistry::standard()));
//! let blob = MemoryBlob::from(b"%PDF-1.7".as_slice());
//!
//! let format = sniffer.sniff(&FormatHints::new(), &blob)?;
//! assert_eq!(format, Some(Format::PDF));
//! # Ok::<(), quire_common::ReadError>(())
//! ```
//!
//! [`FormatHints`]: quire_common::FormatHints
//! [`Container`]: quire_common::Container

mod composite;
mod sniffer;
pub mod sniffers;

pub use composite::CompositeSniffer;
pub use sniffer::{parse_xml_root, SniffSource, Sniffer, XmlRoot, MAGIC_PREFIX_LEN, SNIFF_CONTENT_LIMIT};
