//! The archive-opening contract.

use std::sync::Arc;

use thiserror::Error;

use crate::container::Container;
use crate::error::ReadError;
use crate::format::Format;
use crate::readable::Readable;

/// Why an [`ArchiveOpener`] did not produce a container.
#[derive(Debug, Error)]
pub enum ArchiveOpenError {
    /// This opener cannot handle the format. Non-fatal: the caller may try
    /// another opener or a super-type of the format.
    #[error("format not supported: {0}")]
    FormatNotSupported(Format),

    /// The bytes could not be read or are corrupt. Fatal for the attempt.
    #[error(transparent)]
    Read(#[from] ReadError),
}

impl ArchiveOpenError {
    /// Whether another candidate may still be tried.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::FormatNotSupported(_))
    }
}

/// Produces a [`Container`] from a byte source of a known format.
pub trait ArchiveOpener: Send + Sync {
    fn open(
        &self,
        format: &Format,
        source: Arc<dyn Readable>,
    ) -> Result<Box<dyn Container>, ArchiveOpenError>;
}

impl<O: ArchiveOpener + ?Sized> ArchiveOpener for Arc<O> {
    fn open(
        &self,
        format: &Format,
        source: Arc<dyn Readable>,
    ) -> Result<Box<dyn Container>, ArchiveOpenError> {
        (**self).open(format, source)
    }
}

impl<O: ArchiveOpener + ?Sized> ArchiveOpener for Box<O> {
    fn open(
        &self,
        format: &Format,
        source: Arc<dyn Readable>,
    ) -> Result<Box<dyn Container>, ArchiveOpenError> {
        (**self).open(format, source)
    }
}
