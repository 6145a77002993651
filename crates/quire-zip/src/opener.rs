//! [`ArchiveOpener`] for ZIP-based formats.

use std::sync::Arc;

use quire_common::{
    ArchiveOpenError, ArchiveOpener, Container, Format, FormatRegistry, Readable,
};

use crate::archive::{ZipArchive, ZipOptions};
use crate::signature;

/// Opens any format conforming to [`Format::ZIP`] as a [`ZipArchive`].
#[derive(Debug, Clone)]
pub struct ZipArchiveOpener {
    registry: Arc<FormatRegistry>,
    options: ZipOptions,
}

impl ZipArchiveOpener {
    pub fn new(registry: Arc<FormatRegistry>) -> Self {
        Self::with_options(registry, ZipOptions::default())
    }

    pub fn with_options(registry: Arc<FormatRegistry>, options: ZipOptions) -> Self {
        Self { registry, options }
    }

    /// Open `source` without a declared format, when its first bytes look
    /// like a ZIP archive. Anything else is [`ArchiveOpenError::FormatNotSupported`].
    pub fn sniff_open(
        &self,
        source: Arc<dyn Readable>,
    ) -> Result<Box<dyn Container>, ArchiveOpenError> {
        let prefix = source.read(Some(0..4))?;
        if !signature::has_zip_magic(&prefix) {
            return Err(ArchiveOpenError::FormatNotSupported(Format::ZIP));
        }
        self.open_unchecked(source)
    }

    fn open_unchecked(
        &self,
        source: Arc<dyn Readable>,
    ) -> Result<Box<dyn Container>, ArchiveOpenError> {
        let archive = ZipArchive::with_options(source, self.options.clone())
            .map_err(|e| ArchiveOpenError::Read(e.into()))?;
        Ok(Box::new(archive))
    }
}

impl ArchiveOpener for ZipArchiveOpener {
    fn open(
        &self,
        format: &Format,
        source: Arc<dyn Readable>,
    ) -> Result<Box<dyn Container>, ArchiveOpenError> {
        if !self.registry.conforms_to(format, &Format::ZIP) {
            return Err(ArchiveOpenError::FormatNotSupported(format.clone()));
        }
        self.open_unchecked(source)
    }
}
