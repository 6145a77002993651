use quire_common::{Format, FormatHints, ReadResult};
use serde_json::Value;

use super::hinted;
use crate::sniffer::{SniffSource, Sniffer};

const ATOM_NAMESPACE: &str = "http://www.w3.org/2005/Atom";
const ACQUISITION_REL: &str = "http://opds-spec.org/acquisition";

/// OPDS 1 (Atom) and OPDS 2 (JSON) catalog documents, and authentication
/// documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpdsSniffer;

impl Sniffer for OpdsSniffer {
    fn name(&self) -> &'static str {
        "opds"
    }

    fn sniff_hints(&self, format: Option<Format>, hints: &FormatHints) -> Option<Format> {
        // The entry type carries every parameter of the feed type, so it is
        // checked first.
        if hints.has_media_type(&["application/atom+xml;type=entry;profile=opds-catalog"]) {
            return Some(Format::OPDS1_ENTRY);
        }
        if hints.has_media_type(&["application/atom+xml;profile=opds-catalog"]) {
            return Some(Format::OPDS1_FEED);
        }
        if hinted(hints, &["application/opds+json"], &[]) {
            return Some(Format::OPDS2_FEED);
        }
        if hinted(hints, &["application/opds-publication+json"], &[]) {
            return Some(Format::OPDS2_PUBLICATION);
        }
        if hinted(
            hints,
            &[
                "application/opds-authentication+json",
                "application/vnd.opds.authentication.v1.0+json",
            ],
            &[],
        ) {
            return Some(Format::OPDS_AUTHENTICATION);
        }
        format
    }

    fn sniff_blob(
        &self,
        format: Option<Format>,
        source: &SniffSource<'_>,
    ) -> ReadResult<Option<Format>> {
        if let Some(root) = source.xml_root()? {
            if root.is("feed", ATOM_NAMESPACE) {
                return Ok(Some(Format::OPDS1_FEED));
            }
            if root.is("entry", ATOM_NAMESPACE) {
                return Ok(Some(Format::OPDS1_ENTRY));
            }
            return Ok(format);
        }

        if let Some(json) = source.json()?.and_then(Value::as_object) {
            if ["navigation", "groups", "publications", "facets"]
                .iter()
                .any(|key| json.contains_key(*key))
            {
                return Ok(Some(Format::OPDS2_FEED));
            }
            if json.contains_key("metadata") && has_acquisition_link(json.get("links")) {
                return Ok(Some(Format::OPDS2_PUBLICATION));
            }
            if json.contains_key("id")
                && json.contains_key("title")
                && json.get("authentication").is_some_and(Value::is_array)
            {
                return Ok(Some(Format::OPDS_AUTHENTICATION));
            }
        }
        Ok(format)
    }
}

fn has_acquisition_link(links: Option<&Value>) -> bool {
    let Some(links) = links.and_then(Value::as_array) else {
        return false;
    };
    links.iter().any(|link| match link.get("rel") {
        Some(Value::String(rel)) => rel.starts_with(ACQUISITION_REL),
        Some(Value::Array(rels)) => rels
            .iter()
            .filter_map(Value::as_str)
            .any(|rel| rel.starts_with(ACQUISITION_REL)),
        _ => false,
    })
}
