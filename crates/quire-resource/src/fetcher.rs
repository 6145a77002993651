//! Fetchers: turn links into resources.
//!
//! A fetcher never fails to answer. A link it cannot serve yields a
//! [`FailureResource`] whose reads fail with `NotFound`, so fetchers compose
//! ([`CompositeFetcher`], [`RoutingFetcher`]) without special cases.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use quire_common::{resolve_within, Container, FileBlob, Readable};
use walkdir::WalkDir;

use crate::http::{HttpClient, HttpResource};
use crate::resource::{FailureResource, FallbackResource, Link, ReadableResource, Resource};

pub trait Fetcher: Send + Sync {
    /// Links known to be available. May be empty for fetchers that cannot
    /// enumerate, such as HTTP.
    fn links(&self) -> Vec<Link>;

    fn get(&self, link: &Link) -> Box<dyn Resource>;

    /// Release held handles. Idempotent.
    fn close(&self) {}
}

impl<F: Fetcher + ?Sized> Fetcher for Box<F> {
    fn links(&self) -> Vec<Link> {
        (**self).links()
    }

    fn get(&self, link: &Link) -> Box<dyn Resource> {
        (**self).get(link)
    }

    fn close(&self) {
        (**self).close()
    }
}

impl<F: Fetcher + ?Sized> Fetcher for Arc<F> {
    fn links(&self) -> Vec<Link> {
        (**self).links()
    }

    fn get(&self, link: &Link) -> Box<dyn Resource> {
        (**self).get(link)
    }

    fn close(&self) {
        (**self).close()
    }
}

/// `href` as a relative path: no leading slash, fragment or query.
fn relative_path(link: &Link) -> &str {
    link.path().trim_start_matches('/')
}

/// What remains of `path` under `prefix`, if it is under it.
fn strip_route<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    if prefix.is_empty() {
        return Some(path);
    }
    match path.strip_prefix(prefix)? {
        "" => Some(""),
        rest => rest.strip_prefix('/'),
    }
}

fn join_href(prefix: &str, rest: &str) -> String {
    match (prefix.is_empty(), rest.is_empty()) {
        (true, _) => rest.to_string(),
        (_, true) => prefix.to_string(),
        _ => format!("{prefix}/{rest}"),
    }
}

/// Serves one readable under one href.
pub struct SingleResourceFetcher {
    link: Link,
    source: Arc<dyn Readable>,
}

impl SingleResourceFetcher {
    pub fn new(link: Link, source: Arc<dyn Readable>) -> Self {
        Self { link, source }
    }
}

impl Fetcher for SingleResourceFetcher {
    fn links(&self) -> Vec<Link> {
        vec![self.link.clone()]
    }

    fn get(&self, link: &Link) -> Box<dyn Resource> {
        if relative_path(link) != relative_path(&self.link) {
            return Box::new(FailureResource::not_found(link.clone()));
        }
        Box::new(ReadableResource::new(
            self.link.clone(),
            Arc::clone(&self.source),
        ))
    }

    fn close(&self) {
        self.source.close();
    }
}

/// Serves the entries of a [`Container`].
pub struct ContainerFetcher {
    container: Arc<dyn Container>,
}

impl ContainerFetcher {
    pub fn new(container: Arc<dyn Container>) -> Self {
        Self { container }
    }

    pub fn container(&self) -> &Arc<dyn Container> {
        &self.container
    }
}

impl Fetcher for ContainerFetcher {
    fn links(&self) -> Vec<Link> {
        self.container.entries().into_iter().map(Link::new).collect()
    }

    fn get(&self, link: &Link) -> Box<dyn Resource> {
        match self.container.get(&link.href) {
            Some(entry) => Box::new(ReadableResource::new(link.clone(), entry)),
            None => Box::new(FailureResource::not_found(link.clone())),
        }
    }

    fn close(&self) {
        self.container.close();
    }
}

/// Serves local files and directories mounted under href prefixes.
///
/// Resolution never leaves a mounted directory.
#[derive(Debug, Default)]
pub struct FileFetcher {
    mounts: Vec<(String, PathBuf)>,
}

impl FileFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mount `path` (a file or a directory) at `href`.
    pub fn with_path(mut self, href: &str, path: impl Into<PathBuf>) -> Self {
        self.mounts
            .push((href.trim_matches('/').to_string(), path.into()));
        self
    }

    fn resolve(&self, href: &str) -> Option<PathBuf> {
        self.mounts.iter().find_map(|(prefix, path)| {
            let rest = strip_route(href, prefix)?;
            if rest.is_empty() && path.is_file() {
                return Some(path.clone());
            }
            resolve_within(path, rest).filter(|p| p.is_file())
        })
    }

    fn walk(prefix: &str, path: &Path) -> Vec<Link> {
        if path.is_file() {
            return vec![Link::new(prefix)];
        }
        let mut links: Vec<Link> = WalkDir::new(path)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| {
                let relative = entry.path().strip_prefix(path).ok()?;
                let parts: Vec<_> = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect();
                Some(Link::new(join_href(prefix, &parts.join("/"))))
            })
            .collect();
        links.sort_by(|a, b| a.href.cmp(&b.href));
        links
    }
}

impl Fetcher for FileFetcher {
    fn links(&self) -> Vec<Link> {
        self.mounts
            .iter()
            .flat_map(|(prefix, path)| Self::walk(prefix, path))
            .collect()
    }

    fn get(&self, link: &Link) -> Box<dyn Resource> {
        match self.resolve(relative_path(link)) {
            Some(path) => Box::new(ReadableResource::new(link.clone(), FileBlob::new(path))),
            None => Box::new(FailureResource::not_found(link.clone())),
        }
    }
}

/// Serves links over HTTP, resolving relative hrefs against a base URL.
pub struct HttpFetcher {
    client: Arc<dyn HttpClient>,
    base_url: Option<String>,
}

impl HttpFetcher {
    pub fn new(client: Arc<dyn HttpClient>, base_url: Option<String>) -> Self {
        Self { client, base_url }
    }

    /// Absolute URL for `href`, if it can be formed.
    pub fn resolve(&self, href: &str) -> Option<String> {
        if href.contains("://") {
            return Some(href.to_string());
        }
        let base = self.base_url.as_deref()?;
        Some(format!(
            "{}/{}",
            base.trim_end_matches('/'),
            href.trim_start_matches('/')
        ))
    }
}

impl Fetcher for HttpFetcher {
    fn links(&self) -> Vec<Link> {
        Vec::new()
    }

    fn get(&self, link: &Link) -> Box<dyn Resource> {
        match self.resolve(&link.href) {
            Some(url) => Box::new(HttpResource::with_link(
                Arc::clone(&self.client),
                link.clone(),
                url,
            )),
            None => Box::new(FailureResource::not_found(link.clone())),
        }
    }
}

/// Tries `primary` first and `fallback` when the primary has nothing at
/// that link, e.g. local files first, then the network.
pub struct CompositeFetcher {
    primary: Box<dyn Fetcher>,
    fallback: Box<dyn Fetcher>,
}

impl CompositeFetcher {
    pub fn new(primary: Box<dyn Fetcher>, fallback: Box<dyn Fetcher>) -> Self {
        Self { primary, fallback }
    }
}

impl Fetcher for CompositeFetcher {
    fn links(&self) -> Vec<Link> {
        let mut links = self.primary.links();
        for link in self.fallback.links() {
            if !links.iter().any(|l| l.href == link.href) {
                links.push(link);
            }
        }
        links
    }

    fn get(&self, link: &Link) -> Box<dyn Resource> {
        Box::new(FallbackResource::new(
            self.primary.get(link),
            self.fallback.get(link),
        ))
    }

    fn close(&self) {
        self.primary.close();
        self.fallback.close();
    }
}

/// Dispatches links to fetchers by href prefix.
///
/// The longest matching prefix wins, the first registered on ties. The
/// prefix is stripped before the link reaches the chosen fetcher, so the
/// returned resource carries the stripped link.
#[derive(Default)]
pub struct RoutingFetcher {
    routes: Vec<(String, Box<dyn Fetcher>)>,
}

impl RoutingFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, prefix: &str, fetcher: Box<dyn Fetcher>) -> Self {
        self.routes
            .push((prefix.trim_matches('/').to_string(), fetcher));
        self
    }
}

impl Fetcher for RoutingFetcher {
    fn links(&self) -> Vec<Link> {
        self.routes
            .iter()
            .flat_map(|(prefix, fetcher)| {
                fetcher.links().into_iter().map(move |link| Link {
                    href: join_href(prefix, link.href.trim_start_matches('/')),
                    ..link
                })
            })
            .collect()
    }

    fn get(&self, link: &Link) -> Box<dyn Resource> {
        let href = link.href.trim_start_matches('/');
        let mut best: Option<(&str, &dyn Fetcher, &str)> = None;
        for (prefix, fetcher) in &self.routes {
            if let Some(rest) = strip_route(href, prefix) {
                if best.map_or(true, |(p, _, _)| prefix.len() > p.len()) {
                    best = Some((prefix.as_str(), &**fetcher, rest));
                }
            }
        }

        match best {
            Some((_, fetcher, rest)) => fetcher.get(&Link {
                href: rest.to_string(),
                ..link.clone()
            }),
            None => Box::new(FailureResource::not_found(link.clone())),
        }
    }

    fn close(&self) {
        for (_, fetcher) in &self.routes {
            fetcher.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::DirectoryContainer;
    use crate::http::tests::FakeClient;
    use quire_common::MemoryBlob;
    use std::fs;

    fn memory_fetcher(href: &str, bytes: &[u8]) -> Box<dyn Fetcher> {
        Box::new(SingleResourceFetcher::new(
            Link::new(href),
            Arc::new(MemoryBlob::from(bytes)),
        ))
    }

    #[test]
    fn test_single_resource_fetcher() {
        let fetcher = memory_fetcher("cover.jpg", b"\xff\xd8\xff");
        assert_eq!(fetcher.get(&Link::new("/cover.jpg#x")).read(None).unwrap(), b"\xff\xd8\xff");
        assert!(fetcher
            .get(&Link::new("other.jpg"))
            .read(None)
            .unwrap_err()
            .is_not_found());
        assert_eq!(fetcher.links(), vec![Link::new("cover.jpg")]);
    }

    #[test]
    fn test_container_fetcher() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("OEBPS")).unwrap();
        fs::write(dir.path().join("OEBPS/ch1.xhtml"), b"<html/>").unwrap();
        let container = DirectoryContainer::open(dir.path()).unwrap();
        let fetcher = ContainerFetcher::new(Arc::new(container));

        assert_eq!(fetcher.links(), vec![Link::new("OEBPS/ch1.xhtml")]);
        let resource = fetcher.get(&Link::new("/OEBPS/ch1.xhtml#top"));
        assert_eq!(resource.read(None).unwrap(), b"<html/>");
        assert_eq!(resource.link().href, "/OEBPS/ch1.xhtml#top");
        assert!(fetcher
            .get(&Link::new("OEBPS/ch2.xhtml"))
            .length()
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn test_file_fetcher_mounts() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("book/audio")).unwrap();
        fs::write(dir.path().join("book/audio/01.mp3"), b"ID3").unwrap();
        fs::write(dir.path().join("secret.txt"), b"secret").unwrap();
        fs::write(dir.path().join("cover.png"), b"\x89PNG").unwrap();

        let fetcher = FileFetcher::new()
            .with_path("/pub", dir.path().join("book"))
            .with_path("cover.png", dir.path().join("cover.png"));

        assert_eq!(fetcher.get(&Link::new("pub/audio/01.mp3")).read(None).unwrap(), b"ID3");
        assert_eq!(fetcher.get(&Link::new("cover.png")).read(None).unwrap(), b"\x89PNG");
        assert!(fetcher
            .get(&Link::new("pub/../secret.txt"))
            .read(None)
            .unwrap_err()
            .is_not_found());
        assert!(fetcher
            .get(&Link::new("publisher/audio/01.mp3"))
            .read(None)
            .unwrap_err()
            .is_not_found());

        let hrefs: Vec<String> = fetcher.links().into_iter().map(|l| l.href).collect();
        assert_eq!(hrefs, vec!["pub/audio/01.mp3", "cover.png"]);
    }

    #[test]
    fn test_http_fetcher_resolves_against_base() {
        let client = Arc::new(FakeClient::default().with(
            "https://example.org/pub/manifest.json",
            Some("application/webpub+json"),
            b"{}",
        ));
        let fetcher = HttpFetcher::new(client.clone(), Some("https://example.org/pub/".into()));

        assert_eq!(fetcher.get(&Link::new("/manifest.json")).read(None).unwrap(), b"{}");
        assert_eq!(
            fetcher
                .get(&Link::new("https://example.org/pub/manifest.json"))
                .length()
                .unwrap(),
            2
        );

        let no_base = HttpFetcher::new(client, None);
        assert!(no_base
            .get(&Link::new("manifest.json"))
            .read(None)
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn test_composite_fetcher_falls_back() {
        let fetcher = CompositeFetcher::new(
            memory_fetcher("local.mp3", b"local"),
            memory_fetcher("remote.mp3", b"remote"),
        );
        assert_eq!(fetcher.get(&Link::new("local.mp3")).read(None).unwrap(), b"local");
        assert_eq!(fetcher.get(&Link::new("remote.mp3")).read(None).unwrap(), b"remote");
        assert!(fetcher
            .get(&Link::new("nowhere.mp3"))
            .read(None)
            .unwrap_err()
            .is_not_found());
        assert_eq!(fetcher.links().len(), 2);
    }

    #[test]
    fn test_routing_fetcher_longest_prefix() {
        let fetcher = RoutingFetcher::new()
            .route("", memory_fetcher("index.html", b"root"))
            .route("media", memory_fetcher("a.mp3", b"media"))
            .route("media/hd", memory_fetcher("a.mp3", b"hd"));

        assert_eq!(fetcher.get(&Link::new("/media/hd/a.mp3")).read(None).unwrap(), b"hd");
        assert_eq!(fetcher.get(&Link::new("media/a.mp3")).read(None).unwrap(), b"media");
        assert_eq!(fetcher.get(&Link::new("index.html")).read(None).unwrap(), b"root");
        assert!(fetcher
            .get(&Link::new("mediaa/a.mp3"))
            .read(None)
            .unwrap_err()
            .is_not_found());

        let hrefs: Vec<String> = fetcher.links().into_iter().map(|l| l.href).collect();
        assert_eq!(hrefs, vec!["index.html", "media/a.mp3", "media/hd/a.mp3"]);
    }
}
