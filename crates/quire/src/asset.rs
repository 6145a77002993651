//! From a path or URL to a sniffed, opened asset.

use std::path::Path;
use std::sync::Arc;

use quire_common::{
    ArchiveOpenError, ArchiveOpener, Container, FileBlob, Format, FormatHints, FormatRegistry,
    ReadError, Readable,
};
use quire_resource::{DirectoryContainer, HttpClient, HttpResource, Link, ReadableResource, Resource};
use quire_sniff::{CompositeSniffer, SniffSource};
use quire_zip::ZipArchiveOpener;
use thiserror::Error;

use crate::opener::default_opener;

/// Why no format could be determined.
#[derive(Debug, Error)]
pub enum SniffError {
    /// Every phase ran and nothing recognised the source.
    #[error("format not recognized")]
    NotRecognized,

    #[error(transparent)]
    Read(#[from] ReadError),
}

/// A sniffed source: a single resource, or a container of entries.
pub enum Asset {
    Resource {
        format: Format,
        resource: Box<dyn Resource>,
    },
    Container {
        format: Format,
        container: Box<dyn Container>,
    },
}

impl Asset {
    pub fn format(&self) -> &Format {
        match self {
            Self::Resource { format, .. } | Self::Container { format, .. } => format,
        }
    }

    pub fn container(&self) -> Option<&dyn Container> {
        match self {
            Self::Container { container, .. } => Some(container.as_ref()),
            Self::Resource { .. } => None,
        }
    }

    pub fn close(&self) {
        match self {
            Self::Resource { resource, .. } => resource.close(),
            Self::Container { container, .. } => container.close(),
        }
    }
}

impl std::fmt::Debug for Asset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Resource { format, resource } => f
                .debug_struct("Resource")
                .field("format", format)
                .field("link", resource.link())
                .finish(),
            Self::Container { format, container } => f
                .debug_struct("Container")
                .field("format", format)
                .field("entries", &container.entries().len())
                .finish(),
        }
    }
}

/// Runs the whole sniffing pipeline: hints, then content, then (for
/// archives) the entries of the opened container.
pub struct AssetSniffer {
    sniffer: CompositeSniffer,
    opener: Box<dyn ArchiveOpener>,
    zip: ZipArchiveOpener,
}

impl AssetSniffer {
    pub fn new(
        sniffer: CompositeSniffer,
        opener: Box<dyn ArchiveOpener>,
        registry: Arc<FormatRegistry>,
    ) -> Self {
        Self {
            sniffer,
            opener,
            zip: ZipArchiveOpener::new(registry),
        }
    }

    /// Built-in sniffers and openers over `registry`.
    pub fn standard(registry: Arc<FormatRegistry>) -> Self {
        Self::new(
            CompositeSniffer::default_chain(Arc::clone(&registry)),
            Box::new(default_opener(Arc::clone(&registry))),
            registry,
        )
    }

    pub fn sniffer(&self) -> &CompositeSniffer {
        &self.sniffer
    }

    /// Format of `readable`.
    pub fn sniff_readable(
        &self,
        readable: Arc<dyn Readable>,
        hints: &FormatHints,
    ) -> Result<Format, SniffError> {
        // Dropped, not closed: closing the container closes `readable` too.
        let (format, _container) = self.sniff_open(readable, hints)?;
        Ok(format)
    }

    /// Format of an already opened container, such as an exploded
    /// directory. The container phase starts from the hinted format when it
    /// is an archive type, from [`Format::ARCHIVE`] otherwise.
    pub fn sniff_container(
        &self,
        container: &dyn Container,
        hints: &FormatHints,
    ) -> Result<Format, SniffError> {
        let start = self
            .sniffer
            .sniff_hints(None, hints)
            .filter(|f| self.sniffer.is_archive(Some(f)))
            .unwrap_or(Format::ARCHIVE);
        self.sniffer
            .sniff_container(Some(start), container)?
            .ok_or(SniffError::NotRecognized)
    }

    /// Sniff `readable` and, when it is a container format with a backend,
    /// keep the container opened along the way.
    pub fn sniff_open(
        &self,
        readable: Arc<dyn Readable>,
        hints: &FormatHints,
    ) -> Result<(Format, Option<Box<dyn Container>>), SniffError> {
        let format = self.sniffer.sniff_hints(None, hints);
        let format = self
            .sniffer
            .sniff_blob(format, &SniffSource::new(readable.as_ref()))?;

        let opened = match &format {
            Some(f) if self.sniffer.is_archive(Some(f)) => {
                self.opener.open(f, Arc::clone(&readable))
            }
            Some(f) => return Ok((f.clone(), None)),
            None => self.zip.sniff_open(Arc::clone(&readable)),
        };

        let container = match opened {
            Ok(container) => container,
            Err(ArchiveOpenError::FormatNotSupported(_)) => {
                tracing::debug!(format = ?format, "no container backend");
                return format
                    .map(|f| (f, None))
                    .ok_or(SniffError::NotRecognized);
            }
            Err(ArchiveOpenError::Read(e)) => return Err(e.into()),
        };

        let format = format.unwrap_or(Format::ZIP);
        match self.sniffer.sniff_container(Some(format), container.as_ref())? {
            Some(format) => Ok((format, Some(container))),
            None => Err(SniffError::NotRecognized),
        }
    }
}

/// Opens local paths and URLs as [`Asset`]s.
pub struct AssetRetriever {
    sniffer: AssetSniffer,
    http: Option<Arc<dyn HttpClient>>,
}

impl AssetRetriever {
    pub fn new(sniffer: AssetSniffer) -> Self {
        Self {
            sniffer,
            http: None,
        }
    }

    /// Built-in sniffers and openers with the standard registry.
    pub fn standard() -> Self {
        Self::new(AssetSniffer::standard(Arc::new(FormatRegistry::standard())))
    }

    pub fn with_http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http = Some(client);
        self
    }

    pub fn sniffer(&self) -> &AssetSniffer {
        &self.sniffer
    }

    /// Open a directory as a container, or a file as whatever it sniffs to.
    /// The extension of `path` is added to `hints`.
    pub fn retrieve_path(
        &self,
        path: impl AsRef<Path>,
        hints: FormatHints,
    ) -> Result<Asset, SniffError> {
        let path = path.as_ref();
        let metadata = std::fs::metadata(path).map_err(ReadError::from)?;

        if metadata.is_dir() {
            let container = DirectoryContainer::open(path)?;
            let format = self.sniffer.sniff_container(&container, &hints)?;
            return Ok(Asset::Container {
                format,
                container: Box::new(container),
            });
        }

        let hints = hints.merge(FormatHints::from_path(path));
        let blob: Arc<dyn Readable> = Arc::new(FileBlob::new(path));
        let link = Link::new(path.to_string_lossy());
        self.finish(blob, link, &hints)
    }

    /// Open a remote resource. The media type reported by the server is
    /// added to `hints`, along with the extension of the URL path.
    pub fn retrieve_url(&self, url: &str, hints: FormatHints) -> Result<Asset, SniffError> {
        let client = self.http.as_ref().ok_or_else(|| {
            ReadError::UnsupportedOperation(format!("no HTTP client to retrieve {url}"))
        })?;

        let resource = HttpResource::new(Arc::clone(client), url);
        let mut hints = hints.merge(resource.link().hints());
        if let Some(media_type) = resource.media_type()? {
            hints = hints.with_media_type(&media_type.to_string());
        }
        let link = resource.link().clone();
        self.finish(Arc::new(resource), link, &hints)
    }

    fn finish(
        &self,
        readable: Arc<dyn Readable>,
        link: Link,
        hints: &FormatHints,
    ) -> Result<Asset, SniffError> {
        match self.sniffer.sniff_open(Arc::clone(&readable), hints)? {
            (format, Some(container)) => Ok(Asset::Container { format, container }),
            (format, None) => Ok(Asset::Resource {
                resource: Box::new(ReadableResource::new(
                    link.with_format(format.clone()),
                    readable,
                )),
                format,
            }),
        }
    }
}
