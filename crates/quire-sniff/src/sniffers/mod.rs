//! Built-in sniffers.
//!
//! Each sniffer is a plain value with no state. The order in which they are
//! handed to a [`CompositeSniffer`](crate::CompositeSniffer) is their
//! precedence; [`default_sniffers`] returns the order used by
//! [`CompositeSniffer::default_chain`](crate::CompositeSniffer::default_chain).

mod archive;
mod document;
mod epub;
mod lcp;
mod lpf;
mod media;
mod opds;
mod webpub;

pub use archive::{ArchiveSniffer, RarSniffer, ZipSniffer};
pub use document::{CssSniffer, HtmlSniffer, JavaScriptSniffer, JsonSniffer, PdfSniffer, XmlSniffer};
pub use epub::EpubSniffer;
pub use lcp::LcpLicenseSniffer;
pub use lpf::LpfSniffer;
pub use media::{AudioSniffer, BitmapSniffer};
pub use opds::OpdsSniffer;
pub use webpub::WebPubSniffer;

use quire_common::{Container, FormatHints, ReadError, ReadResult, Readable};

use crate::sniffer::{Sniffer, SNIFF_CONTENT_LIMIT};

/// Every built-in sniffer, most specific first.
pub fn default_sniffers() -> Vec<Box<dyn Sniffer>> {
    vec![
        Box::new(HtmlSniffer),
        Box::new(OpdsSniffer),
        Box::new(LcpLicenseSniffer),
        Box::new(BitmapSniffer),
        Box::new(AudioSniffer),
        Box::new(WebPubSniffer),
        Box::new(EpubSniffer),
        Box::new(LpfSniffer),
        Box::new(ArchiveSniffer),
        Box::new(PdfSniffer),
        Box::new(JsonSniffer),
        Box::new(XmlSniffer),
        Box::new(ZipSniffer),
        Box::new(RarSniffer),
        Box::new(CssSniffer),
        Box::new(JavaScriptSniffer),
    ]
}

/// Whether the hints declare one of `media_types` or `extensions`.
pub(crate) fn hinted(hints: &FormatHints, media_types: &[&str], extensions: &[&str]) -> bool {
    hints.has_media_type(media_types) || hints.has_file_extension(extensions)
}

/// Bytes of the entry at `path`, or `None` when it is missing or larger
/// than the sniffing limit.
pub(crate) fn entry_bytes(container: &dyn Container, path: &str) -> ReadResult<Option<Vec<u8>>> {
    let Some(entry) = container.get(path) else {
        return Ok(None);
    };
    match entry.read_all_bounded(SNIFF_CONTENT_LIMIT) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(ReadError::OutOfMemory { requested, .. }) => {
            tracing::trace!(path, requested, "entry too large to sniff");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Text of the entry at `path`. Missing, oversized or non-UTF-8 entries are
/// `None`.
pub(crate) fn entry_text(container: &dyn Container, path: &str) -> ReadResult<Option<String>> {
    Ok(entry_bytes(container, path)?.and_then(|bytes| String::from_utf8(bytes).ok()))
}

/// Whether the container has an entry at `path`.
pub(crate) fn has_entry(container: &dyn Container, path: &str) -> bool {
    container.get(path).is_some()
}

/// Lowercase extension of an entry path.
pub(crate) fn extension_of(path: &str) -> Option<String> {
    let name = path.rsplit('/').next()?;
    let (stem, ext) = name.rsplit_once('.')?;
    (!stem.is_empty()).then(|| ext.to_ascii_lowercase())
}
