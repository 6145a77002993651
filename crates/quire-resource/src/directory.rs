//! Exploded publications: a directory on disk seen as a [`Container`].

use std::io;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use quire_common::{resolve_within, Container, Entry, FileBlob, ReadError, ReadResult, Readable};
use walkdir::WalkDir;

struct Shared {
    root: PathBuf,
    closed: AtomicBool,
}

/// A directory tree exposed as a container of its regular files.
///
/// The tree is walked once when opened. Entry paths are relative to the
/// root, `/`-separated and listed in lexicographic order. Symlinks are not
/// followed and names that are not valid UTF-8 are skipped. Lookups only
/// resolve listed paths, so they never leave the root.
pub struct DirectoryContainer {
    shared: Arc<Shared>,
    entries: Vec<String>,
}

impl DirectoryContainer {
    pub fn open(root: impl AsRef<Path>) -> ReadResult<Self> {
        let root = root.as_ref().canonicalize()?;
        if !root.is_dir() {
            return Err(ReadError::not_found(format!(
                "{} is not a directory",
                root.display()
            )));
        }

        let mut entries = Vec::new();
        for entry in WalkDir::new(&root).follow_links(false) {
            let entry = entry.map_err(io::Error::from)?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&root) else {
                continue;
            };
            let parts: Option<Vec<&str>> = relative
                .components()
                .map(|c| c.as_os_str().to_str())
                .collect();
            match parts {
                Some(parts) => entries.push(parts.join("/")),
                None => {
                    tracing::debug!(path = %relative.display(), "skipping non UTF-8 file name")
                }
            }
        }
        entries.sort_unstable();

        tracing::debug!(root = %root.display(), entries = entries.len(), "opened directory");
        Ok(Self {
            shared: Arc::new(Shared {
                root,
                closed: AtomicBool::new(false),
            }),
            entries,
        })
    }

    /// Canonical root of the tree.
    pub fn root(&self) -> &Path {
        &self.shared.root
    }
}

impl Container for DirectoryContainer {
    fn entries(&self) -> Vec<String> {
        self.entries.clone()
    }

    fn get_exact(&self, path: &str) -> Option<Box<dyn Entry>> {
        let path = path.trim_start_matches('/');
        self.entries
            .binary_search_by(|listed| listed.as_str().cmp(path))
            .ok()?;
        let file = resolve_within(&self.shared.root, path)?;
        if !file.is_file() {
            return None;
        }
        Some(Box::new(DirectoryEntry {
            path: path.to_string(),
            blob: FileBlob::new(file),
            shared: Arc::clone(&self.shared),
        }))
    }

    fn close(&self) {
        self.shared.closed.store(true, Ordering::Release);
    }
}

impl std::fmt::Debug for DirectoryContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryContainer")
            .field("root", &self.shared.root)
            .field("entries", &self.entries.len())
            .finish()
    }
}

struct DirectoryEntry {
    path: String,
    blob: FileBlob,
    shared: Arc<Shared>,
}

impl DirectoryEntry {
    fn ensure_open(&self) -> ReadResult<()> {
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(ReadError::closed());
        }
        Ok(())
    }
}

impl Readable for DirectoryEntry {
    fn length(&self) -> ReadResult<u64> {
        self.ensure_open()?;
        self.blob.length()
    }

    fn read(&self, range: Option<Range<u64>>) -> ReadResult<Vec<u8>> {
        self.ensure_open()?;
        self.blob.read(range)
    }

    fn close(&self) {
        self.blob.close()
    }
}

impl Entry for DirectoryEntry {
    fn path(&self) -> &str {
        &self.path
    }

    fn declared_length(&self) -> Option<u64> {
        self.blob.length().ok()
    }
}
