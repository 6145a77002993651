//! Containers of named entries.

use crate::readable::Readable;

/// A set of named, independently readable entries: a ZIP archive, an
/// exploded directory.
///
/// Entry paths are `/`-separated, relative, and unique within the container.
pub trait Container: Send + Sync {
    /// Paths of all non-directory entries, in a stable order: archive order
    /// when the backend has one, lexicographic otherwise.
    fn entries(&self) -> Vec<String>;

    /// Look up an entry by exact path. Backends implement this; callers use
    /// [`Container::get`].
    fn get_exact(&self, path: &str) -> Option<Box<dyn Entry>>;

    /// Look up an entry, falling back to the normalised candidates of
    /// [`lookup_candidates`] when the exact path misses.
    fn get(&self, path: &str) -> Option<Box<dyn Entry>> {
        lookup_candidates(path)
            .into_iter()
            .find_map(|candidate| self.get_exact(&candidate))
    }

    /// Release the backend's handles. Idempotent. Entries obtained earlier
    /// fail their reads afterwards.
    fn close(&self);
}

impl<C: Container + ?Sized> Container for Box<C> {
    fn entries(&self) -> Vec<String> {
        (**self).entries()
    }

    fn get_exact(&self, path: &str) -> Option<Box<dyn Entry>> {
        (**self).get_exact(path)
    }

    fn get(&self, path: &str) -> Option<Box<dyn Entry>> {
        (**self).get(path)
    }

    fn close(&self) {
        (**self).close()
    }
}

impl<C: Container + ?Sized> Container for std::sync::Arc<C> {
    fn entries(&self) -> Vec<String> {
        (**self).entries()
    }

    fn get_exact(&self, path: &str) -> Option<Box<dyn Entry>> {
        (**self).get_exact(path)
    }

    fn get(&self, path: &str) -> Option<Box<dyn Entry>> {
        (**self).get(path)
    }

    fn close(&self) {
        (**self).close()
    }
}

/// A readable view of one container entry.
pub trait Entry: Readable {
    /// Path of the entry inside its container.
    fn path(&self) -> &str;

    /// Uncompressed size, when the backend knows it without reading.
    fn declared_length(&self) -> Option<u64>;

    /// Stored size, present only when the entry is compressed. Advisory:
    /// it may exceed the declared length.
    fn compressed_length(&self) -> Option<u64> {
        None
    }
}

/// Candidate paths tried in order when looking up `path`.
///
/// 1. the path as given,
/// 2. without leading slashes,
/// 3. with everything from the first `#` or `?` removed.
///
/// Duplicates and empty candidates are skipped.
pub fn lookup_candidates(path: &str) -> Vec<String> {
    let mut candidates: Vec<String> = Vec::with_capacity(3);
    let mut push = |candidate: &str| {
        if !candidate.is_empty() && !candidates.iter().any(|c| c == candidate) {
            candidates.push(candidate.to_string());
        }
    };

    push(path);
    let relative = path.trim_start_matches('/');
    push(relative);
    if let Some(cut) = relative.find(['#', '?']) {
        push(&relative[..cut]);
    }

    candidates
}
