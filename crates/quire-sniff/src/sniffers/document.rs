use quire_common::{Format, FormatHints, ReadResult};

use super::hinted;
use crate::sniffer::{SniffSource, Sniffer};

const XHTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";

/// PDF documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfSniffer;

impl Sniffer for PdfSniffer {
    fn name(&self) -> &'static str {
        "pdf"
    }

    fn sniff_hints(&self, format: Option<Format>, hints: &FormatHints) -> Option<Format> {
        if hinted(hints, &["application/pdf"], &["pdf"]) {
            return Some(Format::PDF);
        }
        format
    }

    fn sniff_blob(
        &self,
        format: Option<Format>,
        source: &SniffSource<'_>,
    ) -> ReadResult<Option<Format>> {
        if source.starts_with(b"%PDF-")? {
            return Ok(Some(Format::PDF));
        }
        Ok(format)
    }
}

/// HTML and XHTML documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlSniffer;

impl Sniffer for HtmlSniffer {
    fn name(&self) -> &'static str {
        "html"
    }

    fn sniff_hints(&self, format: Option<Format>, hints: &FormatHints) -> Option<Format> {
        if hinted(hints, &["application/xhtml+xml"], &["xht", "xhtml"]) {
            return Some(Format::XHTML);
        }
        if hinted(hints, &["text/html"], &["htm", "html"]) {
            return Some(Format::HTML);
        }
        format
    }

    fn sniff_blob(
        &self,
        format: Option<Format>,
        source: &SniffSource<'_>,
    ) -> ReadResult<Option<Format>> {
        if source
            .xml_root()?
            .is_some_and(|root| root.is("html", XHTML_NAMESPACE))
        {
            return Ok(Some(Format::XHTML));
        }

        let prefix = String::from_utf8_lossy(source.prefix()?);
        let head: String = prefix
            .trim_start_matches('\u{feff}')
            .trim_start()
            .chars()
            .take(14)
            .collect::<String>()
            .to_ascii_lowercase();
        if head.starts_with("<!doctype html") || head.starts_with("<html") {
            return Ok(Some(Format::HTML));
        }
        Ok(format)
    }
}

/// Generic XML documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct XmlSniffer;

impl Sniffer for XmlSniffer {
    fn name(&self) -> &'static str {
        "xml"
    }

    fn sniff_hints(&self, format: Option<Format>, hints: &FormatHints) -> Option<Format> {
        if hinted(hints, &["application/xml", "text/xml"], &["xml"]) {
            return Some(Format::XML);
        }
        format
    }

    fn sniff_blob(
        &self,
        format: Option<Format>,
        source: &SniffSource<'_>,
    ) -> ReadResult<Option<Format>> {
        if source.xml_root()?.is_some() {
            return Ok(Some(Format::XML));
        }
        Ok(format)
    }
}

/// Generic JSON documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSniffer;

impl Sniffer for JsonSniffer {
    fn name(&self) -> &'static str {
        "json"
    }

    fn sniff_hints(&self, format: Option<Format>, hints: &FormatHints) -> Option<Format> {
        if hinted(hints, &["application/json"], &["json"]) {
            return Some(Format::JSON);
        }
        // Structured-syntax suffix, e.g. `application/ld+json`.
        if hints
            .media_types()
            .iter()
            .any(|mt| mt.structured_suffix() == Some("json"))
        {
            return Some(Format::JSON);
        }
        format
    }

    fn sniff_blob(
        &self,
        format: Option<Format>,
        source: &SniffSource<'_>,
    ) -> ReadResult<Option<Format>> {
        if source.json()?.is_some() {
            return Ok(Some(Format::JSON));
        }
        Ok(format)
    }
}

/// CSS stylesheets. Hints only.
#[derive(Debug, Clone, Copy, Default)]
pub struct CssSniffer;

impl Sniffer for CssSniffer {
    fn name(&self) -> &'static str {
        "css"
    }

    fn sniff_hints(&self, format: Option<Format>, hints: &FormatHints) -> Option<Format> {
        if hinted(hints, &["text/css"], &["css"]) {
            return Some(Format::CSS);
        }
        format
    }
}

/// JavaScript sources. Hints only.
#[derive(Debug, Clone, Copy, Default)]
pub struct JavaScriptSniffer;

impl Sniffer for JavaScriptSniffer {
    fn name(&self) -> &'static str {
        "javascript"
    }

    fn sniff_hints(&self, format: Option<Format>, hints: &FormatHints) -> Option<Format> {
        if hinted(
            hints,
            &["text/javascript", "application/javascript"],
            &["js", "mjs"],
        ) {
            return Some(Format::JAVASCRIPT);
        }
        format
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quire_common::MemoryBlob;

    fn blob_format(sniffer: &dyn Sniffer, bytes: &[u8]) -> Option<Format> {
        let blob = MemoryBlob::from(bytes);
        sniffer.sniff_blob(None, &SniffSource::new(&blob)).unwrap()
    }

    #[test]
    fn test_pdf_magic_without_hints() {
        assert_eq!(blob_format(&PdfSniffer, b"%PDF-1.7\n%\xe2\xe3"), Some(Format::PDF));
        assert_eq!(blob_format(&PdfSniffer, b"PDF-1.7"), None);
    }

    #[test]
    fn test_xhtml_and_html() {
        let xhtml = br#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml"><head/><body/></html>"#;
        assert_eq!(blob_format(&HtmlSniffer, xhtml), Some(Format::XHTML));

        let html = b"  <!DOCTYPE HTML>\n<html><body><p>unclosed</body></html>";
        assert_eq!(blob_format(&HtmlSniffer, html), Some(Format::HTML));

        assert_eq!(blob_format(&HtmlSniffer, b"<root/>"), None);
    }

    #[test]
    fn test_xml_and_json() {
        assert_eq!(blob_format(&XmlSniffer, b"<root><a/></root>"), Some(Format::XML));
        assert_eq!(blob_format(&XmlSniffer, b"{\"a\":1}"), None);
        assert_eq!(blob_format(&JsonSniffer, b" [1, 2, 3]"), Some(Format::JSON));
        assert_eq!(blob_format(&JsonSniffer, b"{\"a\":"), None);
    }

    #[test]
    fn test_hints() {
        assert_eq!(
            JsonSniffer.sniff_hints(None, &FormatHints::from_media_type("application/ld+json")),
            Some(Format::JSON)
        );
        assert_eq!(
            CssSniffer.sniff_hints(None, &FormatHints::from_file_extension(".CSS")),
            Some(Format::CSS)
        );
        assert_eq!(
            JavaScriptSniffer.sniff_hints(None, &FormatHints::from_file_extension("mjs")),
            Some(Format::JAVASCRIPT)
        );
        assert_eq!(
            HtmlSniffer.sniff_hints(None, &FormatHints::from_media_type("text/html; charset=UTF-8")),
            Some(Format::HTML)
        );
    }
}
