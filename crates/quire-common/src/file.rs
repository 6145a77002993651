//! Local-file byte sources.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::ops::Range;
use std::path::{Component, Path, PathBuf};

use memmap2::Mmap;
use parking_lot::{Mutex, RwLock};

use crate::error::{ReadError, ReadResult};
use crate::readable::{clamp_range, Readable, DEFAULT_READ_CEILING};

/// A local file read with positioned reads.
///
/// The file is opened lazily on first access so that listing a directory
/// does not hold one descriptor per entry. Whole-content reads fail with
/// [`ReadError::OutOfMemory`] above the ceiling.
#[derive(Debug)]
pub struct FileBlob {
    path: PathBuf,
    state: Mutex<FileState>,
    ceiling: u64,
}

#[derive(Debug)]
enum FileState {
    Unopened,
    Open { file: File, length: u64 },
    Closed,
}

impl FileBlob {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: Mutex::new(FileState::Unopened),
            ceiling: DEFAULT_READ_CEILING,
        }
    }

    /// Cap whole-content reads at `ceiling` bytes instead of
    /// [`DEFAULT_READ_CEILING`].
    pub fn with_ceiling(mut self, ceiling: u64) -> Self {
        self.ceiling = ceiling;
        self
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn with_file<T>(&self, f: impl FnOnce(&mut File, u64) -> ReadResult<T>) -> ReadResult<T> {
        let mut state = self.state.lock();
        if let FileState::Unopened = *state {
            tracing::trace!(path = %self.path.display(), "opening file");
            let file = File::open(&self.path)?;
            let metadata = file.metadata()?;
            if metadata.is_dir() {
                return Err(ReadError::not_found(format!(
                    "{} is a directory",
                    self.path.display()
                )));
            }
            *state = FileState::Open {
                file,
                length: metadata.len(),
            };
        }

        match &mut *state {
            FileState::Open { file, length } => f(file, *length),
            _ => Err(ReadError::closed()),
        }
    }
}

impl Readable for FileBlob {
    fn length(&self) -> ReadResult<u64> {
        self.with_file(|_, length| Ok(length))
    }

    fn read(&self, range: Option<Range<u64>>) -> ReadResult<Vec<u8>> {
        self.with_file(|file, length| {
            if range.is_none() {
                check_ceiling(length, self.ceiling)?;
            }
            let r = clamp_range(range, length);
            let mut buffer = vec![0u8; (r.end - r.start) as usize];
            file.seek(SeekFrom::Start(r.start))?;
            file.read_exact(&mut buffer)?;
            Ok(buffer)
        })
    }

    fn close(&self) {
        *self.state.lock() = FileState::Closed;
    }
}

/// A memory-mapped local file.
///
/// Suited to large archives read many times at random offsets.
pub struct MmapBlob {
    path: PathBuf,
    mmap: RwLock<Option<Mmap>>,
    ceiling: u64,
}

impl MmapBlob {
    pub fn open(path: impl Into<PathBuf>) -> ReadResult<Self> {
        let path = path.into();
        let file = File::open(&path)?;
        // SAFETY: the mapping is read-only; concurrent truncation of the file
        // by another process is outside what this reader guards against.
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Self {
            path,
            mmap: RwLock::new(Some(mmap)),
            ceiling: DEFAULT_READ_CEILING,
        })
    }

    /// Cap whole-content copies at `ceiling` bytes instead of
    /// [`DEFAULT_READ_CEILING`].
    pub fn with_ceiling(mut self, ceiling: u64) -> Self {
        self.ceiling = ceiling;
        self
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for MmapBlob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MmapBlob")
            .field("path", &self.path)
            .field("open", &self.mmap.read().is_some())
            .finish()
    }
}

impl Readable for MmapBlob {
    fn length(&self) -> ReadResult<u64> {
        let guard = self.mmap.read();
        let mmap = guard.as_ref().ok_or_else(ReadError::closed)?;
        Ok(mmap.len() as u64)
    }

    fn read(&self, range: Option<Range<u64>>) -> ReadResult<Vec<u8>> {
        let guard = self.mmap.read();
        let mmap = guard.as_ref().ok_or_else(ReadError::closed)?;
        if range.is_none() {
            check_ceiling(mmap.len() as u64, self.ceiling)?;
        }
        let r = clamp_range(range, mmap.len() as u64);
        Ok(mmap[r.start as usize..r.end as usize].to_vec())
    }

    fn close(&self) {
        self.mmap.write().take();
    }
}

fn check_ceiling(length: u64, ceiling: u64) -> ReadResult<()> {
    if length > ceiling {
        return Err(ReadError::OutOfMemory {
            requested: length,
            limit: ceiling,
        });
    }
    Ok(())
}

/// Resolve `relative` under `root`, refusing anything that escapes it.
///
/// `relative` is a `/`-separated href. Parent components are rejected
/// outright; the canonicalised result must be `root` itself or one of its
/// descendants, so symlinks pointing outside the root are refused as well.
/// Returns `None` when the target does not exist or escapes the root.
pub fn resolve_within(root: &Path, relative: &str) -> Option<PathBuf> {
    let root = root.canonicalize().ok()?;
    let relative = relative.trim_start_matches('/');

    let mut candidate = root.clone();
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(part) => candidate.push(part),
            Component::CurDir => {}
            _ => return None,
        }
    }

    let canonical = candidate.canonicalize().ok()?;
    canonical.starts_with(&root).then_some(canonical)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_file_blob_ranges() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chapter.xhtml");
        fs::write(&path, b"0123456789").unwrap();

        let blob = FileBlob::new(&path);
        assert_eq!(blob.length().unwrap(), 10);
        assert_eq!(blob.read(Some(2..5)).unwrap(), b"234");
        assert_eq!(blob.read(Some(8..20)).unwrap(), b"89");
        assert_eq!(blob.read(None).unwrap(), b"0123456789");
    }

    #[test]
    fn test_file_blob_missing_is_not_found() {
        let blob = FileBlob::new("/definitely/not/here.epub");
        assert!(blob.length().unwrap_err().is_not_found());
    }

    #[test]
    fn test_file_blob_close_twice() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        fs::write(&path, b"abc").unwrap();

        let blob = FileBlob::new(&path);
        assert_eq!(blob.read(None).unwrap(), b"abc");
        blob.close();
        blob.close();
        assert!(matches!(
            blob.read(None),
            Err(ReadError::Access(crate::AccessError::Closed))
        ));
    }

    #[test]
    fn test_whole_reads_respect_ceiling() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audio.mp3");
        fs::write(&path, vec![7u8; 100]).unwrap();

        let blob = FileBlob::new(&path).with_ceiling(64);
        assert!(matches!(
            blob.read(None),
            Err(ReadError::OutOfMemory {
                requested: 100,
                limit: 64
            })
        ));
        assert_eq!(blob.read(Some(0..100)).unwrap().len(), 100);

        let mapped = MmapBlob::open(&path).unwrap().with_ceiling(64);
        assert!(matches!(mapped.read(None), Err(ReadError::OutOfMemory { .. })));
        assert_eq!(mapped.read(Some(90..200)).unwrap(), vec![7u8; 10]);

        let roomy = FileBlob::new(&path).with_ceiling(100);
        assert_eq!(roomy.read(None).unwrap().len(), 100);
    }

    #[test]
    fn test_mmap_blob() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.zip");
        fs::write(&path, b"PK\x03\x04rest").unwrap();

        let blob = MmapBlob::open(&path).unwrap();
        assert_eq!(blob.read(Some(0..4)).unwrap(), b"PK\x03\x04");
        blob.close();
        blob.close();
        assert!(blob.length().is_err());
    }

    #[test]
    fn test_resolve_within_rejects_escape() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("OEBPS")).unwrap();
        fs::write(dir.path().join("OEBPS/ch1.xhtml"), b"x").unwrap();

        assert!(resolve_within(dir.path(), "/OEBPS/ch1.xhtml").is_some());
        assert!(resolve_within(dir.path(), "OEBPS/../OEBPS/ch1.xhtml").is_none());
        assert!(resolve_within(dir.path(), "../etc/passwd").is_none());
        assert!(resolve_within(dir.path(), "OEBPS/missing.xhtml").is_none());
        assert_eq!(
            resolve_within(dir.path(), ""),
            Some(dir.path().canonicalize().unwrap())
        );
    }
}
