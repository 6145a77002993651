use quire_common::{Container, Format, FormatHints, ReadResult};

use super::{entry_text, has_entry, hinted};
use crate::sniffer::Sniffer;

const EPUB_MEDIA_TYPE: &str = "application/epub+zip";
const ADOBE_ADEPT_NAMESPACE: &str = "http://ns.adobe.com/adept";

/// EPUB packages, including LCP and Adobe ADEPT protected ones.
#[derive(Debug, Clone, Copy, Default)]
pub struct EpubSniffer;

impl Sniffer for EpubSniffer {
    fn name(&self) -> &'static str {
        "epub"
    }

    fn sniff_hints(&self, format: Option<Format>, hints: &FormatHints) -> Option<Format> {
        if hinted(hints, &[EPUB_MEDIA_TYPE], &["epub"]) {
            return Some(Format::EPUB);
        }
        format
    }

    fn sniff_container(
        &self,
        format: Option<Format>,
        container: &dyn Container,
    ) -> ReadResult<Option<Format>> {
        let is_epub = entry_text(container, "mimetype")?
            .is_some_and(|mimetype| mimetype.trim() == EPUB_MEDIA_TYPE);
        if !is_epub {
            return Ok(format);
        }

        if has_entry(container, "META-INF/license.lcpl") {
            return Ok(Some(Format::LCP_PROTECTED_EPUB));
        }
        if has_entry(container, "META-INF/rights.xml") {
            return Ok(Some(Format::ADEPT_PROTECTED_EPUB));
        }
        if entry_text(container, "META-INF/encryption.xml")?
            .is_some_and(|encryption| encryption.contains(ADOBE_ADEPT_NAMESPACE))
        {
            return Ok(Some(Format::ADEPT_PROTECTED_EPUB));
        }
        Ok(Some(Format::EPUB))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sniffers::tests::zip_container;

    fn sniff(files: &[(&str, &[u8])]) -> Option<Format> {
        let zip = zip_container(files);
        EpubSniffer.sniff_container(Some(Format::ZIP), &zip).unwrap()
    }

    #[test]
    fn test_mimetype_only_epub() {
        assert_eq!(
            sniff(&[("mimetype", b"application/epub+zip")]),
            Some(Format::EPUB)
        );
        assert_eq!(
            sniff(&[("mimetype", b"application/epub+zip\n")]),
            Some(Format::EPUB)
        );
    }

    #[test]
    fn test_wrong_or_missing_mimetype_declines() {
        assert_eq!(sniff(&[("mimetype", b"application/zip")]), Some(Format::ZIP));
        assert_eq!(sniff(&[("content.opf", b"<package/>")]), Some(Format::ZIP));
    }

    #[test]
    fn test_protected_epubs() {
        assert_eq!(
            sniff(&[
                ("mimetype", b"application/epub+zip"),
                ("META-INF/license.lcpl", b"{}"),
            ]),
            Some(Format::LCP_PROTECTED_EPUB)
        );
        assert_eq!(
            sniff(&[
                ("mimetype", b"application/epub+zip"),
                ("META-INF/rights.xml", b"<rights/>"),
            ]),
            Some(Format::ADEPT_PROTECTED_EPUB)
        );
        assert_eq!(
            sniff(&[
                ("mimetype", b"application/epub+zip"),
                (
                    "META-INF/encryption.xml",
                    br#"<encryption><EncryptedData><KeyInfo><resource xmlns="http://ns.adobe.com/adept"/></KeyInfo></EncryptedData></encryption>"#,
                ),
            ]),
            Some(Format::ADEPT_PROTECTED_EPUB)
        );
    }
}
