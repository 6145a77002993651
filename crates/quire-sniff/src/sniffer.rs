//! The sniffer contract and the cached view of a blob under inspection.

use std::cell::OnceCell;

use quick_xml::events::Event;
use quick_xml::name::ResolveResult;
use quick_xml::NsReader;
use quire_common::{Container, Format, FormatHints, ReadResult, Readable};

/// Content views ([`SniffSource::content`] and everything built on it) are
/// only produced for sources up to this many bytes.
pub const SNIFF_CONTENT_LIMIT: u64 = 5 * 1024 * 1024;

/// Bytes read for magic-number checks.
pub const MAGIC_PREFIX_LEN: u64 = 64 * 1024;

/// A rule that refines a format guess from partial evidence.
///
/// Every check receives the current guess and returns it unchanged when the
/// sniffer has no opinion. Errors are reserved for I/O failures.
pub trait Sniffer: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Refine from declared media types and extensions. No I/O.
    fn sniff_hints(&self, format: Option<Format>, _hints: &FormatHints) -> Option<Format> {
        format
    }

    /// Refine from the content of a blob.
    fn sniff_blob(
        &self,
        format: Option<Format>,
        _source: &SniffSource<'_>,
    ) -> ReadResult<Option<Format>> {
        Ok(format)
    }

    /// Refine from the entries of a container.
    fn sniff_container(
        &self,
        format: Option<Format>,
        _container: &dyn Container,
    ) -> ReadResult<Option<Format>> {
        Ok(format)
    }
}

impl<S: Sniffer + ?Sized> Sniffer for Box<S> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn sniff_hints(&self, format: Option<Format>, hints: &FormatHints) -> Option<Format> {
        (**self).sniff_hints(format, hints)
    }

    fn sniff_blob(
        &self,
        format: Option<Format>,
        source: &SniffSource<'_>,
    ) -> ReadResult<Option<Format>> {
        (**self).sniff_blob(format, source)
    }

    fn sniff_container(
        &self,
        format: Option<Format>,
        container: &dyn Container,
    ) -> ReadResult<Option<Format>> {
        (**self).sniff_container(format, container)
    }
}

/// Root element of an XML document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlRoot {
    pub local_name: String,
    pub namespace: Option<String>,
}

impl XmlRoot {
    pub fn is(&self, local_name: &str, namespace: &str) -> bool {
        self.local_name == local_name && self.namespace.as_deref() == Some(namespace)
    }
}

/// A [`Readable`] seen through lazily computed, cached views.
///
/// One source is shared by every sniffer of a blob phase, so each view is
/// read or parsed at most once. Views that need the whole content are only
/// built when the length is at most [`SNIFF_CONTENT_LIMIT`]; the length is
/// checked before anything is read.
pub struct SniffSource<'a> {
    readable: &'a dyn Readable,
    length: OnceCell<u64>,
    prefix: OnceCell<Vec<u8>>,
    content: OnceCell<Option<Vec<u8>>>,
    xml_root: OnceCell<Option<XmlRoot>>,
    json: OnceCell<Option<serde_json::Value>>,
}

impl<'a> SniffSource<'a> {
    pub fn new(readable: &'a dyn Readable) -> Self {
        Self {
            readable,
            length: OnceCell::new(),
            prefix: OnceCell::new(),
            content: OnceCell::new(),
            xml_root: OnceCell::new(),
            json: OnceCell::new(),
        }
    }

    pub fn readable(&self) -> &'a dyn Readable {
        self.readable
    }

    pub fn length(&self) -> ReadResult<u64> {
        if let Some(length) = self.length.get() {
            return Ok(*length);
        }
        let length = self.readable.length()?;
        Ok(*self.length.get_or_init(|| length))
    }

    /// Up to [`MAGIC_PREFIX_LEN`] leading bytes.
    pub fn prefix(&self) -> ReadResult<&[u8]> {
        if let Some(prefix) = self.prefix.get() {
            return Ok(prefix);
        }
        let prefix = match self.content.get() {
            Some(Some(content)) => {
                content[..content.len().min(MAGIC_PREFIX_LEN as usize)].to_vec()
            }
            _ => self.readable.read(Some(0..MAGIC_PREFIX_LEN))?,
        };
        Ok(self.prefix.get_or_init(|| prefix))
    }

    /// Whether the content starts with `magic`.
    pub fn starts_with(&self, magic: &[u8]) -> ReadResult<bool> {
        Ok(self.prefix()?.starts_with(magic))
    }

    /// Whether `bytes` appear at `offset` within the prefix.
    pub fn matches_at(&self, offset: usize, bytes: &[u8]) -> ReadResult<bool> {
        let prefix = self.prefix()?;
        Ok(prefix
            .get(offset..offset + bytes.len())
            .is_some_and(|window| window == bytes))
    }

    /// The whole content, or `None` when it exceeds [`SNIFF_CONTENT_LIMIT`].
    pub fn content(&self) -> ReadResult<Option<&[u8]>> {
        if let Some(content) = self.content.get() {
            return Ok(content.as_deref());
        }
        let content = if self.length()? > SNIFF_CONTENT_LIMIT {
            tracing::trace!(limit = SNIFF_CONTENT_LIMIT, "content too large to sniff");
            None
        } else {
            Some(self.readable.read(None)?)
        };
        Ok(self.content.get_or_init(|| content).as_deref())
    }

    /// The content as UTF-8 with any byte-order mark removed.
    pub fn text(&self) -> ReadResult<Option<&str>> {
        Ok(self
            .content()?
            .and_then(|bytes| std::str::from_utf8(bytes).ok())
            .map(|text| text.trim_start_matches('\u{feff}')))
    }

    /// The root element of the content parsed as XML.
    pub fn xml_root(&self) -> ReadResult<Option<&XmlRoot>> {
        if let Some(root) = self.xml_root.get() {
            return Ok(root.as_ref());
        }
        let root = self.text()?.and_then(parse_xml_root);
        Ok(self.xml_root.get_or_init(|| root).as_ref())
    }

    /// The content parsed as JSON.
    pub fn json(&self) -> ReadResult<Option<&serde_json::Value>> {
        if let Some(json) = self.json.get() {
            return Ok(json.as_ref());
        }
        let json = self.text()?.and_then(|text| {
            let trimmed = text.trim_start();
            if trimmed.starts_with('{') || trimmed.starts_with('[') {
                serde_json::from_str(trimmed).ok()
            } else {
                None
            }
        });
        Ok(self.json.get_or_init(|| json).as_ref())
    }

    /// The content parsed as JSON into `T`. Shape mismatches are `None`.
    pub fn json_as<T: serde::de::DeserializeOwned>(&self) -> ReadResult<Option<T>> {
        Ok(self
            .json()?
            .and_then(|value| T::deserialize(value).ok()))
    }
}

impl std::fmt::Debug for SniffSource<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SniffSource")
            .field("length", &self.length.get())
            .field("prefix_len", &self.prefix.get().map(Vec::len))
            .finish()
    }
}

/// First element of `xml` with its resolved namespace. Malformed documents
/// yield `None`.
pub fn parse_xml_root(xml: &str) -> Option<XmlRoot> {
    let mut reader = NsReader::from_str(xml);
    reader.config_mut().trim_text(true);

    loop {
        match reader.read_resolved_event() {
            Ok((namespace, Event::Start(e))) | Ok((namespace, Event::Empty(e))) => {
                let namespace = match namespace {
                    ResolveResult::Bound(ns) => {
                        Some(String::from_utf8_lossy(ns.as_ref()).into_owned())
                    }
                    _ => None,
                };
                let local_name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                return Some(XmlRoot {
                    local_name,
                    namespace,
                });
            }
            Ok((_, Event::Eof)) | Err(_) => return None,
            Ok(_) => {}
        }
    }
}
