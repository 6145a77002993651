use quire_common::{Format, FormatHints, ReadResult};
use serde_json::Value;

use super::hinted;
use crate::sniffer::{SniffSource, Sniffer};

/// Readium LCP license documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct LcpLicenseSniffer;

impl Sniffer for LcpLicenseSniffer {
    fn name(&self) -> &'static str {
        "lcp-license"
    }

    fn sniff_hints(&self, format: Option<Format>, hints: &FormatHints) -> Option<Format> {
        if hinted(
            hints,
            &["application/vnd.readium.lcp.license.v1.0+json"],
            &["lcpl"],
        ) {
            return Some(Format::LCP_LICENSE);
        }
        format
    }

    fn sniff_blob(
        &self,
        format: Option<Format>,
        source: &SniffSource<'_>,
    ) -> ReadResult<Option<Format>> {
        if let Some(json) = source.json()?.and_then(Value::as_object) {
            if ["id", "issued", "provider", "encryption"]
                .iter()
                .all(|key| json.contains_key(*key))
            {
                return Ok(Some(Format::LCP_LICENSE));
            }
        }
        Ok(format)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quire_common::MemoryBlob;

    #[test]
    fn test_license_document() {
        let blob = MemoryBlob::from(
            br#"{"id": "1", "issued": "2024-01-01T00:00:00Z", "provider": "https://example.org", "encryption": {}}"#.as_slice(),
        );
        let source = SniffSource::new(&blob);
        assert_eq!(
            LcpLicenseSniffer.sniff_blob(None, &source).unwrap(),
            Some(Format::LCP_LICENSE)
        );

        let blob = MemoryBlob::from(br#"{"id": "1"}"#.as_slice());
        let source = SniffSource::new(&blob);
        assert_eq!(LcpLicenseSniffer.sniff_blob(None, &source).unwrap(), None);
    }

    #[test]
    fn test_license_hints() {
        assert_eq!(
            LcpLicenseSniffer.sniff_hints(None, &FormatHints::from_file_extension("LCPL")),
            Some(Format::LCP_LICENSE)
        );
    }
}
