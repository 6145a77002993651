//! Logical formats and the format-inheritance registry.
//!
//! A [`Format`] is an opaque identifier. How formats relate ("every EPUB is
//! also a ZIP") lives in a [`FormatRegistry`] supplied at construction time,
//! never in the formats themselves.

use std::borrow::Cow;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;

use crate::media_type::MediaType;

/// Maximum number of super-type hops followed when walking the registry.
pub const MAX_SUPERTYPE_DEPTH: usize = 16;

/// Identifier of a logical format.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Format(Cow<'static, str>);

macro_rules! formats {
    ($($(#[$doc:meta])* $name:ident => $id:literal,)*) => {
        impl Format {
            $(
                $(#[$doc])*
                pub const $name: Format = Format(Cow::Borrowed($id));
            )*
        }
    };
}

formats! {
    /// Any container of named entries.
    ARCHIVE => "archive",
    ZIP => "zip",
    RAR => "rar",
    EPUB => "epub",
    /// EPUB carrying `META-INF/license.lcpl`.
    LCP_PROTECTED_EPUB => "epub-lcp",
    /// EPUB protected with Adobe ADEPT.
    ADEPT_PROTECTED_EPUB => "epub-adept",
    /// Readium Web Publication package (`.webpub`).
    READIUM_WEBPUB => "webpub",
    READIUM_WEBPUB_MANIFEST => "webpub-manifest",
    READIUM_AUDIOBOOK => "audiobook",
    READIUM_AUDIOBOOK_MANIFEST => "audiobook-manifest",
    DIVINA => "divina",
    DIVINA_MANIFEST => "divina-manifest",
    LCP_PROTECTED_AUDIOBOOK => "audiobook-lcp",
    LCP_PROTECTED_PDF => "pdf-lcp",
    LCP_LICENSE => "lcp-license",
    /// W3C Lightweight Packaging Format.
    W3C_LPF => "lpf",
    /// Comic book archive: a ZIP of bitmaps.
    CBZ => "cbz",
    /// Zipped audio book: a ZIP of audio files.
    ZAB => "zab",
    PDF => "pdf",
    HTML => "html",
    XHTML => "xhtml",
    XML => "xml",
    JSON => "json",
    OPDS1_FEED => "opds1-feed",
    OPDS1_ENTRY => "opds1-entry",
    OPDS2_FEED => "opds2-feed",
    OPDS2_PUBLICATION => "opds2-publication",
    OPDS_AUTHENTICATION => "opds-authentication",
    CSS => "css",
    JAVASCRIPT => "javascript",
    PNG => "png",
    JPEG => "jpeg",
    GIF => "gif",
    WEBP => "webp",
    AVIF => "avif",
    BMP => "bmp",
    TIFF => "tiff",
    MP3 => "mp3",
    AAC => "aac",
    FLAC => "flac",
    OGG => "ogg",
    OPUS => "opus",
    WAV => "wav",
    MP4 => "mp4",
    WEBM => "webm",
}

impl Format {
    /// Create a format from an arbitrary identifier.
    pub fn new(id: impl Into<Cow<'static, str>>) -> Self {
        Self(id.into())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Registry data for one format.
#[derive(Debug, Clone, Default)]
pub struct FormatInfo {
    /// Formats this one directly conforms to.
    pub super_types: Vec<Format>,
    /// Canonical media type.
    pub media_type: Option<MediaType>,
    /// Preferred file extension, without the dot.
    pub file_extension: Option<String>,
}

impl FormatInfo {
    pub fn new(media_type: &str, file_extension: &str) -> Self {
        Self {
            super_types: Vec::new(),
            media_type: MediaType::parse(media_type),
            file_extension: (!file_extension.is_empty()).then(|| file_extension.to_string()),
        }
    }

    pub fn with_super_type(mut self, format: Format) -> Self {
        self.super_types.push(format);
        self
    }
}

/// Format-inheritance registry.
///
/// `conforms_to` is reflexive and transitive. The registry is plain data and
/// may contain cycles; walks are bounded by a visited set and
/// [`MAX_SUPERTYPE_DEPTH`].
#[derive(Debug, Clone)]
pub struct FormatRegistry {
    formats: HashMap<Format, FormatInfo>,
}

impl FormatRegistry {
    /// Registry without any formats.
    pub fn empty() -> Self {
        Self {
            formats: HashMap::new(),
        }
    }

    /// Register (or replace) the data for `format`.
    pub fn register(&mut self, format: Format, info: FormatInfo) -> &mut Self {
        self.formats.insert(format, info);
        self
    }

    pub fn info(&self, format: &Format) -> Option<&FormatInfo> {
        self.formats.get(format)
    }

    /// Direct super-types of `format`, in registration order.
    pub fn super_types(&self, format: &Format) -> &[Format] {
        self.formats
            .get(format)
            .map(|info| info.super_types.as_slice())
            .unwrap_or(&[])
    }

    pub fn media_type(&self, format: &Format) -> Option<&MediaType> {
        self.formats.get(format).and_then(|info| info.media_type.as_ref())
    }

    pub fn file_extension(&self, format: &Format) -> Option<&str> {
        self.formats
            .get(format)
            .and_then(|info| info.file_extension.as_deref())
    }

    /// All ancestors of `format` in breadth-first order, excluding `format`
    /// itself. Each ancestor appears once.
    pub fn ancestors(&self, format: &Format) -> Vec<Format> {
        let mut seen: HashSet<&Format> = HashSet::from([format]);
        let mut queue: VecDeque<(&Format, usize)> = VecDeque::from([(format, 0)]);
        let mut out = Vec::new();

        while let Some((current, depth)) = queue.pop_front() {
            if depth >= MAX_SUPERTYPE_DEPTH {
                continue;
            }
            for parent in self.super_types(current) {
                if seen.insert(parent) {
                    out.push(parent.clone());
                    queue.push_back((parent, depth + 1));
                }
            }
        }

        out
    }

    /// Whether `format` is `other` or one of its descendants.
    pub fn conforms_to(&self, format: &Format, other: &Format) -> bool {
        format == other || self.ancestors(format).iter().any(|f| f == other)
    }

    /// Whether `format` conforms to any of `others`.
    pub fn conforms_to_any(&self, format: &Format, others: &[Format]) -> bool {
        others.iter().any(|other| self.conforms_to(format, other))
    }
}

impl Default for FormatRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl FormatRegistry {
    /// Registry with every well-known [`Format`] and its hierarchy.
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        let table: &[(Format, &str, &str, &[Format])] = &[
            (Format::ARCHIVE, "", "", &[]),
            (Format::ZIP, "application/zip", "zip", &[Format::ARCHIVE]),
            (Format::RAR, "application/vnd.rar", "rar", &[Format::ARCHIVE]),
            (Format::EPUB, "application/epub+zip", "epub", &[Format::ZIP]),
            (Format::LCP_PROTECTED_EPUB, "application/epub+zip", "epub", &[Format::EPUB]),
            (Format::ADEPT_PROTECTED_EPUB, "application/epub+zip", "epub", &[Format::EPUB]),
            (Format::READIUM_WEBPUB, "application/webpub+zip", "webpub", &[Format::ZIP]),
            (Format::READIUM_WEBPUB_MANIFEST, "application/webpub+json", "json", &[Format::JSON]),
            (Format::READIUM_AUDIOBOOK, "application/audiobook+zip", "audiobook", &[Format::READIUM_WEBPUB]),
            (Format::READIUM_AUDIOBOOK_MANIFEST, "application/audiobook+json", "json", &[Format::READIUM_WEBPUB_MANIFEST]),
            (Format::DIVINA, "application/divina+zip", "divina", &[Format::READIUM_WEBPUB]),
            (Format::DIVINA_MANIFEST, "application/divina+json", "json", &[Format::READIUM_WEBPUB_MANIFEST]),
            (Format::LCP_PROTECTED_AUDIOBOOK, "application/audiobook+lcp", "lcpa", &[Format::READIUM_AUDIOBOOK]),
            (Format::LCP_PROTECTED_PDF, "application/pdf+lcp", "lcpdf", &[Format::READIUM_WEBPUB]),
            (Format::LCP_LICENSE, "application/vnd.readium.lcp.license.v1.0+json", "lcpl", &[Format::JSON]),
            (Format::W3C_LPF, "application/lpf+zip", "lpf", &[Format::ZIP]),
            (Format::CBZ, "application/vnd.comicbook+zip", "cbz", &[Format::ZIP]),
            (Format::ZAB, "application/x.readium.zab+zip", "zab", &[Format::ZIP]),
            (Format::PDF, "application/pdf", "pdf", &[]),
            (Format::HTML, "text/html", "html", &[]),
            (Format::XHTML, "application/xhtml+xml", "xhtml", &[Format::XML]),
            (Format::XML, "application/xml", "xml", &[]),
            (Format::JSON, "application/json", "json", &[]),
            (Format::OPDS1_FEED, "application/atom+xml;profile=opds-catalog", "atom", &[Format::XML]),
            (Format::OPDS1_ENTRY, "application/atom+xml;type=entry;profile=opds-catalog", "atom", &[Format::XML]),
            (Format::OPDS2_FEED, "application/opds+json", "json", &[Format::JSON]),
            (Format::OPDS2_PUBLICATION, "application/opds-publication+json", "json", &[Format::JSON]),
            (Format::OPDS_AUTHENTICATION, "application/opds-authentication+json", "json", &[Format::JSON]),
            (Format::CSS, "text/css", "css", &[]),
            (Format::JAVASCRIPT, "text/javascript", "js", &[]),
            (Format::PNG, "image/png", "png", &[]),
            (Format::JPEG, "image/jpeg", "jpg", &[]),
            (Format::GIF, "image/gif", "gif", &[]),
            (Format::WEBP, "image/webp", "webp", &[]),
            (Format::AVIF, "image/avif", "avif", &[]),
            (Format::BMP, "image/bmp", "bmp", &[]),
            (Format::TIFF, "image/tiff", "tiff", &[]),
            (Format::MP3, "audio/mpeg", "mp3", &[]),
            (Format::AAC, "audio/aac", "aac", &[]),
            (Format::FLAC, "audio/flac", "flac", &[]),
            (Format::OGG, "audio/ogg", "ogg", &[]),
            (Format::OPUS, "audio/opus", "opus", &[]),
            (Format::WAV, "audio/wav", "wav", &[]),
            (Format::MP4, "audio/mp4", "m4a", &[]),
            (Format::WEBM, "audio/webm", "webm", &[]),
        ];

        for (format, media_type, extension, super_types) in table {
            let mut info = FormatInfo::new(media_type, extension);
            info.super_types.extend(super_types.iter().cloned());
            registry.register(format.clone(), info);
        }

        registry
    }
}
