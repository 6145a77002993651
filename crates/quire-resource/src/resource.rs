//! Readables with a logical address.

use std::fmt;
use std::ops::Range;

use parking_lot::Mutex;
use quire_common::{Format, FormatHints, MediaType, ReadError, ReadResult, Readable};

/// Where a resource lives in a publication, and what is already known
/// about its type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub href: String,
    pub media_type: Option<MediaType>,
    pub format: Option<Format>,
}

impl Link {
    pub fn new(href: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            media_type: None,
            format: None,
        }
    }

    pub fn with_media_type(mut self, media_type: MediaType) -> Self {
        self.media_type = Some(media_type);
        self
    }

    pub fn with_format(mut self, format: Format) -> Self {
        self.format = Some(format);
        self
    }

    /// `href` without its fragment and query.
    pub fn path(&self) -> &str {
        self.href
            .split(['#', '?'])
            .next()
            .unwrap_or(&self.href)
    }

    /// Sniffing hints carried by this link: its media type and the
    /// extension of its path.
    pub fn hints(&self) -> FormatHints {
        let mut hints = FormatHints::new();
        if let Some(media_type) = &self.media_type {
            hints = hints.with_media_type(&media_type.to_string());
        }
        let name = self.path().rsplit('/').next().unwrap_or_default();
        if let Some((stem, extension)) = name.rsplit_once('.') {
            if !stem.is_empty() {
                hints = hints.with_file_extension(extension);
            }
        }
        hints
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.href)
    }
}

/// A [`Readable`] addressed by a [`Link`].
pub trait Resource: Readable {
    fn link(&self) -> &Link;
}

impl<R: Resource + ?Sized> Resource for Box<R> {
    fn link(&self) -> &Link {
        (**self).link()
    }
}

/// Any [`Readable`] (an archive entry, a file, bytes in memory) under a
/// logical link.
pub struct ReadableResource<R> {
    link: Link,
    inner: R,
}

impl<R: Readable> ReadableResource<R> {
    pub fn new(link: Link, inner: R) -> Self {
        Self { link, inner }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Readable> Readable for ReadableResource<R> {
    fn length(&self) -> ReadResult<u64> {
        self.inner.length()
    }

    fn read(&self, range: Option<Range<u64>>) -> ReadResult<Vec<u8>> {
        self.inner.read(range)
    }

    fn close(&self) {
        self.inner.close()
    }
}

impl<R: Readable> Resource for ReadableResource<R> {
    fn link(&self) -> &Link {
        &self.link
    }
}

impl<R> fmt::Debug for ReadableResource<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadableResource")
            .field("link", &self.link)
            .finish()
    }
}

type ErrorFactory = Box<dyn Fn() -> ReadError + Send + Sync>;

/// A resource whose every read fails with the same error.
///
/// Fetchers hand these out for links they cannot serve, so that a miss is
/// reported when the caller reads rather than when it asks.
pub struct FailureResource {
    link: Link,
    error: ErrorFactory,
}

impl FailureResource {
    pub fn new(link: Link, error: impl Fn() -> ReadError + Send + Sync + 'static) -> Self {
        Self {
            link,
            error: Box::new(error),
        }
    }

    pub fn not_found(link: Link) -> Self {
        let href = link.href.clone();
        Self::new(link, move || ReadError::not_found(href.clone()))
    }
}

impl Readable for FailureResource {
    fn length(&self) -> ReadResult<u64> {
        Err((self.error)())
    }

    fn read(&self, _range: Option<Range<u64>>) -> ReadResult<Vec<u8>> {
        Err((self.error)())
    }

    fn close(&self) {}
}

impl Resource for FailureResource {
    fn link(&self) -> &Link {
        &self.link
    }
}

impl fmt::Debug for FailureResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FailureResource")
            .field("link", &self.link)
            .field("error", &(self.error)().to_string())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Choice {
    Primary,
    Fallback,
}

/// Serves `primary` unless it turns out not to exist, then `fallback`.
///
/// The choice is made once, on first access, by probing the primary's
/// length. Only [`AccessError::NotFound`](quire_common::AccessError::NotFound)
/// selects the fallback; any other failure is reported as is.
pub struct FallbackResource {
    primary: Box<dyn Resource>,
    fallback: Box<dyn Resource>,
    choice: Mutex<Option<Choice>>,
}

impl FallbackResource {
    pub fn new(primary: Box<dyn Resource>, fallback: Box<dyn Resource>) -> Self {
        Self {
            primary,
            fallback,
            choice: Mutex::new(None),
        }
    }

    fn chosen(&self) -> ReadResult<&dyn Resource> {
        let mut choice = self.choice.lock();
        let decided = match *choice {
            Some(decided) => decided,
            None => {
                let decided = match self.primary.length() {
                    Ok(_) => Choice::Primary,
                    Err(e) if e.is_not_found() => {
                        tracing::debug!(href = %self.primary.link(), "falling back");
                        Choice::Fallback
                    }
                    Err(e) => return Err(e),
                };
                *choice = Some(decided);
                decided
            }
        };
        Ok(match decided {
            Choice::Primary => self.primary.as_ref(),
            Choice::Fallback => self.fallback.as_ref(),
        })
    }
}

impl Readable for FallbackResource {
    fn length(&self) -> ReadResult<u64> {
        self.chosen()?.length()
    }

    fn read(&self, range: Option<Range<u64>>) -> ReadResult<Vec<u8>> {
        self.chosen()?.read(range)
    }

    fn close(&self) {
        self.primary.close();
        self.fallback.close();
    }
}

impl Resource for FallbackResource {
    fn link(&self) -> &Link {
        match *self.choice.lock() {
            Some(Choice::Fallback) => self.fallback.link(),
            _ => self.primary.link(),
        }
    }
}
