//! HTTP sources.
//!
//! The transport is a collaborator: anything implementing [`HttpClient`].
//! A blocking `reqwest` implementation is available with the `http`
//! feature.

use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use quire_common::{
    AccessError, MediaType, ReadError, ReadResult, Readable, DEFAULT_READ_CEILING,
};

use crate::resource::{Link, Resource};

/// What a `HEAD` request tells about a resource.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpMetadata {
    pub content_length: Option<u64>,
    pub media_type: Option<MediaType>,
}

/// Blocking HTTP transport.
///
/// Implementations map failures with [`status_error`] and report timeouts
/// and connection failures as [`ReadError::Unavailable`].
pub trait HttpClient: Send + Sync {
    fn head(&self, url: &str) -> ReadResult<HttpMetadata>;

    /// `GET` the whole body, or the bytes of `range` (inclusive-exclusive)
    /// when given. A server ignoring the range may return more bytes; the
    /// caller trims them.
    fn get(&self, url: &str, range: Option<Range<u64>>) -> ReadResult<Vec<u8>>;
}

impl<C: HttpClient + ?Sized> HttpClient for Arc<C> {
    fn head(&self, url: &str) -> ReadResult<HttpMetadata> {
        (**self).head(url)
    }

    fn get(&self, url: &str, range: Option<Range<u64>>) -> ReadResult<Vec<u8>> {
        (**self).get(url, range)
    }
}

/// Map an unsuccessful HTTP status to the read error taxonomy.
pub fn status_error(status: u16, url: &str) -> ReadError {
    match status {
        404 | 410 => ReadError::not_found(url),
        401 | 403 => AccessError::Forbidden(url.to_string()).into(),
        408 | 429 | 500..=599 => ReadError::Unavailable(format!("{url}: HTTP {status}")),
        _ => AccessError::Http {
            status,
            message: url.to_string(),
        }
        .into(),
    }
}

/// `Range` header value for an inclusive-exclusive range.
pub fn range_header(range: &Range<u64>) -> String {
    format!("bytes={}-{}", range.start, range.end.saturating_sub(1))
}

/// A remote resource. `HEAD` metadata is fetched once, on first need.
///
/// When the server omits `Content-Length`, the length is measured by one
/// full `GET` and remembered. Whole-content reads fail with
/// [`ReadError::OutOfMemory`] above the ceiling.
pub struct HttpResource {
    client: Arc<dyn HttpClient>,
    link: Link,
    url: String,
    metadata: Mutex<Option<HttpMetadata>>,
    measured_length: OnceLock<u64>,
    ceiling: u64,
    closed: AtomicBool,
}

impl HttpResource {
    pub fn new(client: Arc<dyn HttpClient>, url: impl Into<String>) -> Self {
        let url = url.into();
        Self::with_link(client, Link::new(url.clone()), url)
    }

    pub fn with_link(client: Arc<dyn HttpClient>, link: Link, url: impl Into<String>) -> Self {
        Self {
            client,
            link,
            url: url.into(),
            metadata: Mutex::new(None),
            measured_length: OnceLock::new(),
            ceiling: DEFAULT_READ_CEILING,
            closed: AtomicBool::new(false),
        }
    }

    /// Cap whole-content reads at `ceiling` bytes instead of
    /// [`DEFAULT_READ_CEILING`].
    pub fn with_ceiling(mut self, ceiling: u64) -> Self {
        self.ceiling = ceiling;
        self
    }

    #[inline]
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn metadata(&self) -> ReadResult<HttpMetadata> {
        self.ensure_open()?;
        let mut cached = self.metadata.lock();
        if let Some(metadata) = cached.as_ref() {
            return Ok(metadata.clone());
        }
        tracing::trace!(url = %self.url, "HEAD");
        let metadata = self.client.head(&self.url)?;
        *cached = Some(metadata.clone());
        Ok(metadata)
    }

    /// Media type reported by the server.
    pub fn media_type(&self) -> ReadResult<Option<MediaType>> {
        Ok(self.metadata()?.media_type)
    }

    fn ensure_open(&self) -> ReadResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ReadError::closed());
        }
        Ok(())
    }

    fn check_ceiling(&self, length: u64) -> ReadResult<()> {
        if length > self.ceiling {
            return Err(ReadError::OutOfMemory {
                requested: length,
                limit: self.ceiling,
            });
        }
        Ok(())
    }

    /// `GET` the whole body, remembering its length.
    fn get_whole(&self) -> ReadResult<Vec<u8>> {
        let body = self.client.get(&self.url, None)?;
        let _ = self.measured_length.set(body.len() as u64);
        Ok(body)
    }
}

impl Readable for HttpResource {
    fn length(&self) -> ReadResult<u64> {
        if let Some(length) = self.metadata()?.content_length {
            return Ok(length);
        }
        if let Some(length) = self.measured_length.get() {
            return Ok(*length);
        }
        tracing::debug!(url = %self.url, "no Content-Length, measuring body");
        Ok(self.get_whole()?.len() as u64)
    }

    fn read(&self, range: Option<Range<u64>>) -> ReadResult<Vec<u8>> {
        self.ensure_open()?;
        match range {
            None => {
                // A failed HEAD leaves the check to the downloaded body.
                let known = self
                    .metadata()
                    .ok()
                    .and_then(|m| m.content_length)
                    .or_else(|| self.measured_length.get().copied());
                if let Some(length) = known {
                    self.check_ceiling(length)?;
                }
                let body = self.get_whole()?;
                self.check_ceiling(body.len() as u64)?;
                Ok(body)
            }
            Some(range) if range.start >= range.end => Ok(Vec::new()),
            Some(range) => {
                tracing::trace!(url = %self.url, start = range.start, end = range.end, "GET range");
                let wanted = (range.end - range.start) as usize;
                let mut body = self.client.get(&self.url, Some(range))?;
                body.truncate(wanted);
                Ok(body)
            }
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

impl Resource for HttpResource {
    fn link(&self) -> &Link {
        &self.link
    }
}

impl std::fmt::Debug for HttpResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpResource")
            .field("url", &self.url)
            .finish()
    }
}

#[cfg(feature = "http")]
pub use self::reqwest_client::ReqwestClient;

#[cfg(feature = "http")]
mod reqwest_client {
    use std::ops::Range;
    use std::time::Duration;

    use quire_common::{AccessError, MediaType, ReadError, ReadResult};
    use reqwest::blocking::Client;
    use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, RANGE};
    use reqwest::StatusCode;

    use super::{range_header, status_error, HttpClient, HttpMetadata};

    /// [`HttpClient`] over a blocking `reqwest` client.
    #[derive(Debug, Clone)]
    pub struct ReqwestClient {
        client: Client,
    }

    impl ReqwestClient {
        pub fn new(timeout: Duration) -> ReadResult<Self> {
            let client = Client::builder()
                .timeout(timeout)
                .build()
                .map_err(map_error)?;
            Ok(Self { client })
        }

        pub fn from_client(client: Client) -> Self {
            Self { client }
        }
    }

    fn map_error(err: reqwest::Error) -> ReadError {
        if err.is_timeout() || err.is_connect() {
            return ReadError::Unavailable(err.to_string());
        }
        if let Some(status) = err.status() {
            let url = err.url().map(|u| u.as_str()).unwrap_or_default();
            return status_error(status.as_u16(), url);
        }
        AccessError::Io(std::io::Error::other(err)).into()
    }

    impl HttpClient for ReqwestClient {
        fn head(&self, url: &str) -> ReadResult<HttpMetadata> {
            let response = self.client.head(url).send().map_err(map_error)?;
            if !response.status().is_success() {
                return Err(status_error(response.status().as_u16(), url));
            }

            let headers = response.headers();
            let content_length = headers
                .get(CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            let media_type = headers
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .and_then(MediaType::parse);
            Ok(HttpMetadata {
                content_length,
                media_type,
            })
        }

        fn get(&self, url: &str, range: Option<Range<u64>>) -> ReadResult<Vec<u8>> {
            let mut request = self.client.get(url);
            if let Some(range) = &range {
                request = request.header(RANGE, range_header(range));
            }

            let response = request.send().map_err(map_error)?;
            let status = response.status();
            if status == StatusCode::RANGE_NOT_SATISFIABLE {
                return Ok(Vec::new());
            }
            if !status.is_success() {
                return Err(status_error(status.as_u16(), url));
            }

            let body = response.bytes().map_err(map_error)?;
            match range {
                // The server ignored the range and sent the whole body.
                Some(range) if status == StatusCode::OK => {
                    let start = (range.start as usize).min(body.len());
                    let end = (range.end as usize).min(body.len()).max(start);
                    Ok(body[start..end].to_vec())
                }
                _ => Ok(body.to_vec()),
            }
        }
    }
}
