use quire_common::{Container, Format, FormatHints, MediaType, ReadResult};
use serde::Deserialize;

use super::{entry_bytes, has_entry, hinted};
use crate::sniffer::{SniffSource, Sniffer};

const AUDIOBOOK_PROFILE: &str = "https://readium.org/webpub-manifest/profiles/audiobook";
const DIVINA_PROFILE: &str = "https://readium.org/webpub-manifest/profiles/divina";
const PDF_PROFILE: &str = "https://readium.org/webpub-manifest/profiles/pdf";
const SCHEMA_AUDIOBOOK: &str = "http://schema.org/Audiobook";

/// A string or a list of strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn contains(&self, value: &str) -> bool {
        match self {
            Self::One(one) => one == value,
            Self::Many(many) => many.iter().any(|v| v == value),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ManifestLink {
    rel: Option<OneOrMany>,
    #[serde(rename = "type")]
    media_type: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ManifestMetadata {
    #[serde(rename = "@type")]
    schema_type: Option<String>,
    #[serde(rename = "conformsTo")]
    conforms_to: Option<OneOrMany>,
}

/// The parts of a Readium Web Publication manifest that identify its
/// profile. Everything else is ignored.
#[derive(Debug, Deserialize)]
struct ManifestSummary {
    metadata: Option<ManifestMetadata>,
    #[serde(default)]
    links: Vec<ManifestLink>,
    #[serde(rename = "readingOrder", default)]
    reading_order: Vec<ManifestLink>,
}

impl ManifestSummary {
    fn parse(bytes: &[u8]) -> Option<Self> {
        serde_json::from_slice(bytes).ok()
    }

    /// Media type declared by the `self` link.
    fn self_media_type(&self) -> Option<MediaType> {
        self.links
            .iter()
            .find(|link| link.rel.as_ref().is_some_and(|rel| rel.contains("self")))
            .and_then(|link| link.media_type.as_deref())
            .and_then(MediaType::parse)
    }

    fn conforms_to(&self, profile: &str) -> bool {
        self.metadata
            .as_ref()
            .and_then(|m| m.conforms_to.as_ref())
            .is_some_and(|c| c.contains(profile))
    }

    fn reading_order_is(&self, media_type: &str) -> bool {
        !self.reading_order.is_empty()
            && self.reading_order.iter().all(|link| {
                link.media_type
                    .as_deref()
                    .and_then(MediaType::parse)
                    .is_some_and(|mt| mt.matches_str(media_type))
            })
    }

    fn reading_order_is_audio(&self) -> bool {
        !self.reading_order.is_empty()
            && self.reading_order.iter().all(|link| {
                link.media_type
                    .as_deref()
                    .and_then(MediaType::parse)
                    .is_some_and(|mt| mt.type_() == "audio")
            })
    }

    /// Manifest format identified from the self link, then the declared
    /// profile. `None` when the document is not a manifest.
    fn manifest_format(&self) -> Option<Format> {
        if let Some(mt) = self.self_media_type() {
            for (pattern, format) in [
                ("application/audiobook+json", Format::READIUM_AUDIOBOOK_MANIFEST),
                ("application/divina+json", Format::DIVINA_MANIFEST),
                ("application/webpub+json", Format::READIUM_WEBPUB_MANIFEST),
            ] {
                if mt.matches_str(pattern) {
                    return Some(format);
                }
            }
        }

        let metadata = self.metadata.as_ref()?;
        if self.conforms_to(AUDIOBOOK_PROFILE)
            || metadata.schema_type.as_deref() == Some(SCHEMA_AUDIOBOOK)
        {
            return Some(Format::READIUM_AUDIOBOOK_MANIFEST);
        }
        if self.conforms_to(DIVINA_PROFILE) {
            return Some(Format::DIVINA_MANIFEST);
        }
        if !self.reading_order.is_empty() {
            return Some(Format::READIUM_WEBPUB_MANIFEST);
        }
        None
    }

    fn is_pdf(&self) -> bool {
        self.conforms_to(PDF_PROFILE) || self.reading_order_is("application/pdf")
    }

    fn is_audiobook(&self) -> bool {
        self.manifest_format() == Some(Format::READIUM_AUDIOBOOK_MANIFEST)
            || self.reading_order_is_audio()
    }
}

/// Readium Web Publications: the JSON manifest on its own, and packages
/// holding a `manifest.json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebPubSniffer;

impl Sniffer for WebPubSniffer {
    fn name(&self) -> &'static str {
        "webpub"
    }

    fn sniff_hints(&self, format: Option<Format>, hints: &FormatHints) -> Option<Format> {
        let table: [(Format, &[&str], &[&str]); 8] = [
            (Format::LCP_PROTECTED_AUDIOBOOK, &["application/audiobook+lcp"], &["lcpa"]),
            (Format::LCP_PROTECTED_PDF, &["application/pdf+lcp"], &["lcpdf"]),
            (Format::READIUM_AUDIOBOOK, &["application/audiobook+zip"], &["audiobook"]),
            (Format::DIVINA, &["application/divina+zip"], &["divina"]),
            (Format::READIUM_WEBPUB, &["application/webpub+zip"], &["webpub"]),
            (Format::READIUM_AUDIOBOOK_MANIFEST, &["application/audiobook+json"], &[]),
            (Format::DIVINA_MANIFEST, &["application/divina+json"], &[]),
            (Format::READIUM_WEBPUB_MANIFEST, &["application/webpub+json"], &[]),
        ];
        table
            .into_iter()
            .find(|(_, media_types, extensions)| hinted(hints, media_types, extensions))
            .map(|(format, _, _)| format)
            .or(format)
    }

    fn sniff_blob(
        &self,
        format: Option<Format>,
        source: &SniffSource<'_>,
    ) -> ReadResult<Option<Format>> {
        let manifest = source
            .json_as::<ManifestSummary>()?
            .and_then(|summary| summary.manifest_format());
        Ok(manifest.or(format))
    }

    fn sniff_container(
        &self,
        format: Option<Format>,
        container: &dyn Container,
    ) -> ReadResult<Option<Format>> {
        let Some(bytes) = entry_bytes(container, "manifest.json")? else {
            return Ok(format);
        };
        let Some(summary) = ManifestSummary::parse(&bytes) else {
            tracing::debug!("malformed manifest.json, declining");
            return Ok(format);
        };

        let licensed =
            has_entry(container, "license.lcpl") || has_entry(container, "META-INF/license.lcpl");
        if licensed && summary.is_audiobook() {
            return Ok(Some(Format::LCP_PROTECTED_AUDIOBOOK));
        }
        if licensed && summary.is_pdf() {
            return Ok(Some(Format::LCP_PROTECTED_PDF));
        }

        let package = match summary.manifest_format() {
            Some(f) if f == Format::READIUM_AUDIOBOOK_MANIFEST => Format::READIUM_AUDIOBOOK,
            Some(f) if f == Format::DIVINA_MANIFEST => Format::DIVINA,
            Some(_) => Format::READIUM_WEBPUB,
            None if summary.reading_order_is_audio() => Format::READIUM_AUDIOBOOK,
            None => return Ok(format),
        };
        Ok(Some(package))
    }
}
