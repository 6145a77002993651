use quire_common::{Container, Format, FormatHints, ReadResult};

use super::{extension_of, hinted};
use crate::sniffer::{SniffSource, Sniffer};

const ZIP_MAGICS: [&[u8]; 3] = [b"PK\x03\x04", b"PK\x05\x06", b"PK\x07\x08"];

/// Plain ZIP archives.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipSniffer;

impl Sniffer for ZipSniffer {
    fn name(&self) -> &'static str {
        "zip"
    }

    fn sniff_hints(&self, format: Option<Format>, hints: &FormatHints) -> Option<Format> {
        if hinted(hints, &["application/zip"], &["zip"]) {
            return Some(Format::ZIP);
        }
        format
    }

    fn sniff_blob(
        &self,
        format: Option<Format>,
        source: &SniffSource<'_>,
    ) -> ReadResult<Option<Format>> {
        for magic in ZIP_MAGICS {
            if source.starts_with(magic)? {
                return Ok(Some(Format::ZIP));
            }
        }
        Ok(format)
    }
}

/// RAR archives. Recognised only; there is no RAR backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct RarSniffer;

impl Sniffer for RarSniffer {
    fn name(&self) -> &'static str {
        "rar"
    }

    fn sniff_hints(&self, format: Option<Format>, hints: &FormatHints) -> Option<Format> {
        if hinted(
            hints,
            &[
                "application/vnd.rar",
                "application/x-rar",
                "application/x-rar-compressed",
            ],
            &["rar"],
        ) {
            return Some(Format::RAR);
        }
        format
    }

    fn sniff_blob(
        &self,
        format: Option<Format>,
        source: &SniffSource<'_>,
    ) -> ReadResult<Option<Format>> {
        if source.starts_with(b"Rar!\x1a\x07")? {
            return Ok(Some(Format::RAR));
        }
        Ok(format)
    }
}

const BITMAP_EXTENSIONS: &[&str] = &[
    "avif", "bmp", "dib", "gif", "jfi", "jfif", "jif", "jpe", "jpeg", "jpg", "png", "tif", "tiff",
    "webp",
];

const AUDIO_EXTENSIONS: &[&str] = &[
    "aac", "aif", "aiff", "flac", "m4a", "m4b", "mp3", "mp4", "oga", "ogg", "opus", "wav", "webm",
];

const PLAYLIST_EXTENSIONS: &[&str] = &["asx", "bio", "m3u", "m3u8", "pla", "pls", "smil", "vlc", "wpl", "xspf", "zpl"];

/// Sidecar files tolerated next to the content of comic and audio archives.
fn is_ignored(path: &str) -> bool {
    let name = path.rsplit('/').next().unwrap_or(path);
    path.starts_with("__MACOSX/")
        || name.starts_with('.')
        || name.eq_ignore_ascii_case("Thumbs.db")
        || matches!(extension_of(path).as_deref(), Some("xml" | "acbf" | "txt"))
}

/// Comic (CBZ) and audio (ZAB) archives: plain archives whose content is
/// made only of bitmaps or only of audio files.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArchiveSniffer;

impl Sniffer for ArchiveSniffer {
    fn name(&self) -> &'static str {
        "archive"
    }

    fn sniff_hints(&self, format: Option<Format>, hints: &FormatHints) -> Option<Format> {
        if hinted(
            hints,
            &["application/vnd.comicbook+zip", "application/x-cbz"],
            &["cbz"],
        ) {
            return Some(Format::CBZ);
        }
        if hinted(hints, &["application/x.readium.zab+zip"], &["zab"]) {
            return Some(Format::ZAB);
        }
        format
    }

    fn sniff_container(
        &self,
        format: Option<Format>,
        container: &dyn Container,
    ) -> ReadResult<Option<Format>> {
        let extensions: Vec<Option<String>> = container
            .entries()
            .iter()
            .filter(|path| !is_ignored(path))
            .map(|path| extension_of(path))
            .collect();
        if extensions.is_empty() {
            return Ok(format);
        }

        let is_one_of = |ext: &Option<String>, table: &[&str]| {
            ext.as_deref().is_some_and(|ext| table.contains(&ext))
        };

        if extensions.iter().all(|ext| is_one_of(ext, BITMAP_EXTENSIONS)) {
            return Ok(Some(Format::CBZ));
        }
        if extensions
            .iter()
            .all(|ext| is_one_of(ext, AUDIO_EXTENSIONS) || is_one_of(ext, PLAYLIST_EXTENSIONS))
            && extensions.iter().any(|ext| is_one_of(ext, AUDIO_EXTENSIONS))
        {
            return Ok(Some(Format::ZAB));
        }
        Ok(format)
    }
}
