//! Archive openers composed from backends.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use quire_common::{
    ArchiveOpenError, ArchiveOpener, Container, Format, FormatRegistry, Readable,
    MAX_SUPERTYPE_DEPTH,
};
use quire_zip::ZipArchiveOpener;

/// Tries each opener in order.
///
/// [`ArchiveOpenError::FormatNotSupported`] moves on to the next opener;
/// any other error is returned at once.
#[derive(Default)]
pub struct CompositeArchiveOpener {
    openers: Vec<Box<dyn ArchiveOpener>>,
}

impl CompositeArchiveOpener {
    pub fn new(openers: Vec<Box<dyn ArchiveOpener>>) -> Self {
        Self { openers }
    }

    pub fn with(mut self, opener: impl ArchiveOpener + 'static) -> Self {
        self.openers.push(Box::new(opener));
        self
    }
}

impl ArchiveOpener for CompositeArchiveOpener {
    fn open(
        &self,
        format: &Format,
        source: Arc<dyn Readable>,
    ) -> Result<Box<dyn Container>, ArchiveOpenError> {
        for (index, opener) in self.openers.iter().enumerate() {
            match opener.open(format, Arc::clone(&source)) {
                Err(e) if e.is_recoverable() => {
                    tracing::trace!(%format, index, "opener declined");
                }
                result => return result,
            }
        }
        Err(ArchiveOpenError::FormatNotSupported(format.clone()))
    }
}

/// Retries an opener with the super-types of a format it does not support.
///
/// Super-types are visited breadth-first, each at most once and no deeper
/// than [`MAX_SUPERTYPE_DEPTH`], so a cyclic registry terminates. A read
/// error from any attempt ends the search.
pub struct RecursiveArchiveOpener {
    inner: Box<dyn ArchiveOpener>,
    registry: Arc<FormatRegistry>,
}

impl RecursiveArchiveOpener {
    pub fn new(inner: Box<dyn ArchiveOpener>, registry: Arc<FormatRegistry>) -> Self {
        Self { inner, registry }
    }
}

impl ArchiveOpener for RecursiveArchiveOpener {
    fn open(
        &self,
        format: &Format,
        source: Arc<dyn Readable>,
    ) -> Result<Box<dyn Container>, ArchiveOpenError> {
        let mut visited: HashSet<Format> = HashSet::from([format.clone()]);
        let mut queue: VecDeque<(Format, usize)> = VecDeque::from([(format.clone(), 0)]);

        while let Some((candidate, depth)) = queue.pop_front() {
            match self.inner.open(&candidate, Arc::clone(&source)) {
                Err(ArchiveOpenError::FormatNotSupported(_)) => {}
                Ok(container) => {
                    if candidate != *format {
                        tracing::debug!(%format, opened_as = %candidate, "opened as super-type");
                    }
                    return Ok(container);
                }
                Err(e) => return Err(e),
            }

            if depth >= MAX_SUPERTYPE_DEPTH {
                continue;
            }
            for parent in self.registry.super_types(&candidate) {
                if visited.insert(parent.clone()) {
                    queue.push_back((parent.clone(), depth + 1));
                }
            }
        }

        Err(ArchiveOpenError::FormatNotSupported(format.clone()))
    }
}

/// Opener for every container format quire has a backend for.
pub fn default_opener(registry: Arc<FormatRegistry>) -> RecursiveArchiveOpener {
    let composite =
        CompositeArchiveOpener::default().with(ZipArchiveOpener::new(Arc::clone(&registry)));
    RecursiveArchiveOpener::new(Box::new(composite), registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::zip_bytes;
    use parking_lot::Mutex;
    use quire_common::{MemoryBlob, ReadError};

    /// Accepts exactly one format and records every attempt.
    struct ExactOpener {
        accepts: Format,
        attempts: Arc<Mutex<Vec<Format>>>,
    }

    impl ArchiveOpener for ExactOpener {
        fn open(
            &self,
            format: &Format,
            source: Arc<dyn Readable>,
        ) -> Result<Box<dyn Container>, ArchiveOpenError> {
            self.attempts.lock().push(format.clone());
            if *format != self.accepts {
                return Err(ArchiveOpenError::FormatNotSupported(format.clone()));
            }
            let archive = quire_zip::ZipArchive::from_readable(source)
                .map_err(|e| ArchiveOpenError::Read(e.into()))?;
            Ok(Box::new(archive))
        }
    }

    struct Failing;

    impl ArchiveOpener for Failing {
        fn open(
            &self,
            _format: &Format,
            _source: Arc<dyn Readable>,
        ) -> Result<Box<dyn Container>, ArchiveOpenError> {
            Err(ReadError::Decoding("corrupt".into()).into())
        }
    }

    fn zip_source() -> Arc<dyn Readable> {
        Arc::new(MemoryBlob::from(zip_bytes(&[("mimetype", b"application/epub+zip")])))
    }

    fn exact(accepts: Format) -> (ExactOpener, Arc<Mutex<Vec<Format>>>) {
        let attempts = Arc::new(Mutex::new(Vec::new()));
        (
            ExactOpener {
                accepts,
                attempts: Arc::clone(&attempts),
            },
            attempts,
        )
    }

    #[test]
    fn test_recursive_retries_super_types() {
        let registry = Arc::new(FormatRegistry::standard());
        let (inner, attempts) = exact(Format::ZIP);
        let opener = RecursiveArchiveOpener::new(Box::new(inner), registry);

        let container = opener.open(&Format::LCP_PROTECTED_EPUB, zip_source()).unwrap();
        assert_eq!(container.entries(), vec!["mimetype"]);
        assert_eq!(
            *attempts.lock(),
            vec![Format::LCP_PROTECTED_EPUB, Format::EPUB, Format::ZIP]
        );
    }

    #[test]
    fn test_recursive_terminates_on_cycles() {
        let a = Format::new("a");
        let b = Format::new("b");
        let mut registry = FormatRegistry::empty();
        registry
            .register(a.clone(), quire_common::FormatInfo::default().with_super_type(b.clone()))
            .register(b.clone(), quire_common::FormatInfo::default().with_super_type(a.clone()));

        let (inner, attempts) = exact(Format::ZIP);
        let opener = RecursiveArchiveOpener::new(Box::new(inner), Arc::new(registry));
        let err = opener.open(&a, zip_source()).err().unwrap();

        assert!(matches!(err, ArchiveOpenError::FormatNotSupported(f) if f == a));
        assert_eq!(*attempts.lock(), vec![a, b]);
    }

    #[test]
    fn test_read_errors_are_not_masked() {
        let registry = Arc::new(FormatRegistry::standard());
        let (fallback, attempts) = exact(Format::ZIP);
        let composite = CompositeArchiveOpener::default().with(Failing).with(fallback);
        let opener = RecursiveArchiveOpener::new(Box::new(composite), registry);

        let err = opener.open(&Format::EPUB, zip_source()).err().unwrap();
        assert!(matches!(err, ArchiveOpenError::Read(ReadError::Decoding(_))));
        assert!(attempts.lock().is_empty());
    }

    #[test]
    fn test_composite_moves_past_unsupported() {
        let (first, first_attempts) = exact(Format::RAR);
        let (second, _) = exact(Format::ZIP);
        let composite = CompositeArchiveOpener::default().with(first).with(second);

        assert!(composite.open(&Format::ZIP, zip_source()).is_ok());
        assert_eq!(*first_attempts.lock(), vec![Format::ZIP]);

        let err = composite.open(&Format::PDF, zip_source()).err().unwrap();
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_default_opener() {
        let opener = default_opener(Arc::new(FormatRegistry::standard()));
        assert!(opener.open(&Format::CBZ, zip_source()).is_ok());
        assert!(opener.open(&Format::ARCHIVE, zip_source()).err().unwrap().is_recoverable());

        let corrupt: Arc<dyn Readable> = Arc::new(MemoryBlob::from(b"PK\x03\x04".as_slice()));
        assert!(!opener.open(&Format::EPUB, corrupt).err().unwrap().is_recoverable());
    }
}
