//! Ordered composition of sniffers.

use std::sync::Arc;

use quire_common::{Container, Format, FormatHints, FormatRegistry, ReadResult, Readable};

use crate::sniffer::{SniffSource, Sniffer};
use crate::sniffers::default_sniffers;

/// Runs an ordered list of sniffers phase by phase.
///
/// Within a phase each sniffer receives the current guess. A different
/// answer is adopted only when there was no guess yet or the answer conforms
/// to the guess, so a later sniffer can refine an earlier one (ZIP to EPUB)
/// but never contradict it. List order is therefore precedence.
///
/// The container phase runs only for guesses conforming to
/// [`Format::ARCHIVE`].
pub struct CompositeSniffer {
    sniffers: Vec<Box<dyn Sniffer>>,
    registry: Arc<FormatRegistry>,
}

impl CompositeSniffer {
    pub fn new(sniffers: Vec<Box<dyn Sniffer>>, registry: Arc<FormatRegistry>) -> Self {
        Self { sniffers, registry }
    }

    /// Every built-in sniffer, in their default precedence.
    pub fn default_chain(registry: Arc<FormatRegistry>) -> Self {
        Self::new(default_sniffers(), registry)
    }

    #[inline]
    pub fn registry(&self) -> &Arc<FormatRegistry> {
        &self.registry
    }

    pub fn len(&self) -> usize {
        self.sniffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sniffers.is_empty()
    }

    /// Decide whether `candidate` replaces `current`.
    fn adopt(
        &self,
        phase: &'static str,
        sniffer: &dyn Sniffer,
        current: Option<Format>,
        candidate: Option<Format>,
    ) -> Option<Format> {
        match (current, candidate) {
            (current, None) => current,
            (None, Some(candidate)) => {
                tracing::debug!(phase, sniffer = sniffer.name(), format = %candidate, "format recognised");
                Some(candidate)
            }
            (Some(current), Some(candidate)) if candidate == current => Some(current),
            (Some(current), Some(candidate)) => {
                if self.registry.conforms_to(&candidate, &current) {
                    tracing::debug!(phase, sniffer = sniffer.name(), from = %current, to = %candidate, "format refined");
                    Some(candidate)
                } else {
                    tracing::trace!(phase, sniffer = sniffer.name(), kept = %current, ignored = %candidate, "conflicting guess ignored");
                    Some(current)
                }
            }
        }
    }

    /// Hints phase. No I/O.
    pub fn sniff_hints(&self, format: Option<Format>, hints: &FormatHints) -> Option<Format> {
        self.sniffers.iter().fold(format, |current, sniffer| {
            let candidate = sniffer.sniff_hints(current.clone(), hints);
            self.adopt("hints", sniffer.as_ref(), current, candidate)
        })
    }

    /// Blob phase over a shared [`SniffSource`].
    pub fn sniff_blob(
        &self,
        format: Option<Format>,
        source: &SniffSource<'_>,
    ) -> ReadResult<Option<Format>> {
        self.sniffers.iter().try_fold(format, |current, sniffer| {
            let candidate = sniffer.sniff_blob(current.clone(), source)?;
            Ok(self.adopt("blob", sniffer.as_ref(), current, candidate))
        })
    }

    /// Container phase. Skipped unless `format` conforms to
    /// [`Format::ARCHIVE`].
    pub fn sniff_container(
        &self,
        format: Option<Format>,
        container: &dyn Container,
    ) -> ReadResult<Option<Format>> {
        if !self.is_archive(format.as_ref()) {
            return Ok(format);
        }
        self.sniffers.iter().try_fold(format, |current, sniffer| {
            let candidate = sniffer.sniff_container(current.clone(), container)?;
            Ok(self.adopt("container", sniffer.as_ref(), current, candidate))
        })
    }

    /// Hints then blob phase over `readable`.
    pub fn sniff(&self, hints: &FormatHints, readable: &dyn Readable) -> ReadResult<Option<Format>> {
        let format = self.sniff_hints(None, hints);
        self.sniff_blob(format, &SniffSource::new(readable))
    }

    /// Whether `format` is known and conforms to [`Format::ARCHIVE`].
    pub fn is_archive(&self, format: Option<&Format>) -> bool {
        format.is_some_and(|f| self.registry.conforms_to(f, &Format::ARCHIVE))
    }
}

impl Sniffer for CompositeSniffer {
    fn name(&self) -> &'static str {
        "composite"
    }

    fn sniff_hints(&self, format: Option<Format>, hints: &FormatHints) -> Option<Format> {
        CompositeSniffer::sniff_hints(self, format, hints)
    }

    fn sniff_blob(
        &self,
        format: Option<Format>,
        source: &SniffSource<'_>,
    ) -> ReadResult<Option<Format>> {
        CompositeSniffer::sniff_blob(self, format, source)
    }

    fn sniff_container(
        &self,
        format: Option<Format>,
        container: &dyn Container,
    ) -> ReadResult<Option<Format>> {
        CompositeSniffer::sniff_container(self, format, container)
    }
}

impl std::fmt::Debug for CompositeSniffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeSniffer")
            .field(
                "sniffers",
                &self.sniffers.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sniffers::tests::{zip_bytes, zip_container};
    use crate::sniffers::{EpubSniffer, PdfSniffer, ZipSniffer};
    use proptest::prelude::*;
    use quire_common::MemoryBlob;

    /// Claims `format` whenever the hints carry `extension`.
    struct ExtensionRule {
        extension: &'static str,
        format: Format,
    }

    impl Sniffer for ExtensionRule {
        fn name(&self) -> &'static str {
            "rule"
        }

        fn sniff_hints(&self, format: Option<Format>, hints: &FormatHints) -> Option<Format> {
            if hints.has_file_extension(&[self.extension]) {
                return Some(self.format.clone());
            }
            format
        }
    }

    fn registry() -> Arc<FormatRegistry> {
        Arc::new(FormatRegistry::standard())
    }

    fn default_chain() -> CompositeSniffer {
        CompositeSniffer::default_chain(registry())
    }

    #[test]
    fn test_earlier_sniffer_wins() {
        let y = Format::new("y");
        let x = Format::new("x");
        let composite = CompositeSniffer::new(
            vec![
                Box::new(ExtensionRule { extension: "dat", format: y.clone() }),
                Box::new(ExtensionRule { extension: "dat", format: x }),
            ],
            registry(),
        );
        let hints = FormatHints::from_file_extension("dat");
        assert_eq!(composite.sniff_hints(None, &hints), Some(y));
    }

    #[test]
    fn test_later_sniffer_refines() {
        let composite = CompositeSniffer::new(
            vec![Box::new(ZipSniffer), Box::new(EpubSniffer)],
            registry(),
        );
        let hints = FormatHints::from_file_extension("zip").with_media_type("application/epub+zip");
        assert_eq!(composite.sniff_hints(None, &hints), Some(Format::EPUB));
    }

    #[test]
    fn test_unchanged_when_nothing_matches() {
        let composite = default_chain();
        assert_eq!(composite.sniff_hints(None, &FormatHints::new()), None);
        assert_eq!(
            composite.sniff_hints(Some(Format::PDF), &FormatHints::new()),
            Some(Format::PDF)
        );
    }

    #[test]
    fn test_pdf_magic_without_hints() {
        let blob = MemoryBlob::from(b"%PDF-1.4\n1 0 obj".as_slice());
        assert_eq!(
            default_chain().sniff(&FormatHints::new(), &blob).unwrap(),
            Some(Format::PDF)
        );

        let only_pdf = CompositeSniffer::new(vec![Box::new(PdfSniffer)], registry());
        assert_eq!(only_pdf.sniff(&FormatHints::new(), &blob).unwrap(), Some(Format::PDF));
    }

    #[test]
    fn test_mimetype_only_container_is_epub() {
        let composite = default_chain();
        let zip = zip_container(&[("mimetype", b"application/epub+zip")]);
        let hinted = composite.sniff_hints(None, &FormatHints::from_file_extension("zip"));
        assert_eq!(hinted, Some(Format::ZIP));
        assert_eq!(
            composite.sniff_container(hinted, &zip).unwrap(),
            Some(Format::EPUB)
        );
    }

    #[test]
    fn test_container_phase_requires_archive() {
        let composite = default_chain();
        let zip = zip_container(&[("mimetype", b"application/epub+zip")]);
        assert_eq!(composite.sniff_container(None, &zip).unwrap(), None);
        assert_eq!(
            composite.sniff_container(Some(Format::PDF), &zip).unwrap(),
            Some(Format::PDF)
        );
    }

    #[test]
    fn test_blob_refines_generic_json() {
        let composite = default_chain();
        let blob = MemoryBlob::from(br#"{"metadata": {}, "navigation": []}"#.as_slice());
        assert_eq!(
            composite.sniff(&FormatHints::from_file_extension("json"), &blob).unwrap(),
            Some(Format::OPDS2_FEED)
        );
    }

    #[test]
    fn test_hint_is_not_contradicted_by_content() {
        let composite = default_chain();
        let blob = MemoryBlob::from(b"PK\x03\x04".as_slice());
        assert_eq!(
            composite.sniff(&FormatHints::from_file_extension("epub"), &blob).unwrap(),
            Some(Format::EPUB)
        );
    }

    #[test]
    fn test_full_pipeline_on_zip_bytes() {
        let composite = default_chain();
        let bytes = zip_bytes(&[
            ("mimetype", b"application/epub+zip"),
            ("META-INF/container.xml", b"<container/>"),
        ]);
        let blob: Arc<dyn Readable> = Arc::new(MemoryBlob::from(bytes));

        let format = composite.sniff(&FormatHints::new(), &blob).unwrap();
        assert_eq!(format, Some(Format::ZIP));

        let zip = quire_zip::ZipArchive::from_readable(blob).unwrap();
        assert_eq!(
            composite.sniff_container(format, &zip).unwrap(),
            Some(Format::EPUB)
        );
    }

    proptest! {
        #[test]
        fn prop_hints_are_case_insensitive(
            flips in proptest::collection::vec(any::<bool>(), 20),
            which in 0usize..4,
        ) {
            let (media_type, expected) = [
                ("application/epub+zip", Format::EPUB),
                ("application/pdf", Format::PDF),
                ("application/vnd.comicbook+zip", Format::CBZ),
                ("audio/mpeg", Format::MP3),
            ][which].clone();
            let mixed: String = media_type
                .chars()
                .zip(flips.iter().cycle())
                .map(|(c, upper)| if *upper { c.to_ascii_uppercase() } else { c })
                .collect();

            let composite = default_chain();
            let from_media_type = composite.sniff_hints(None, &FormatHints::from_media_type(&mixed));
            prop_assert_eq!(from_media_type, Some(expected.clone()));

            let extension = FormatRegistry::standard()
                .file_extension(&expected)
                .unwrap()
                .to_ascii_uppercase();
            let from_extension = composite.sniff_hints(None, &FormatHints::from_file_extension(&extension));
            prop_assert_eq!(from_extension, Some(expected));
        }
    }
}
