use quire_common::{Format, FormatHints, ReadResult};

use super::hinted;
use crate::sniffer::{SniffSource, Sniffer};

/// Hint table shared by the media sniffers: format, media types, extensions.
type HintRow = (Format, &'static [&'static str], &'static [&'static str]);

fn sniff_table(table: &[HintRow], hints: &FormatHints) -> Option<Format> {
    table
        .iter()
        .find(|(_, media_types, extensions)| hinted(hints, media_types, extensions))
        .map(|(format, _, _)| format.clone())
}

const BITMAP_HINTS: &[HintRow] = &[
    (Format::AVIF, &["image/avif"], &["avif"]),
    (Format::BMP, &["image/bmp", "image/x-bmp"], &["bmp", "dib"]),
    (Format::GIF, &["image/gif"], &["gif"]),
    (
        Format::JPEG,
        &["image/jpeg"],
        &["jpg", "jpeg", "jpe", "jif", "jfif", "jfi"],
    ),
    (Format::PNG, &["image/png"], &["png"]),
    (Format::TIFF, &["image/tiff", "image/tiff-fx"], &["tif", "tiff"]),
    (Format::WEBP, &["image/webp"], &["webp"]),
];

/// Raster images.
#[derive(Debug, Clone, Copy, Default)]
pub struct BitmapSniffer;

impl Sniffer for BitmapSniffer {
    fn name(&self) -> &'static str {
        "bitmap"
    }

    fn sniff_hints(&self, format: Option<Format>, hints: &FormatHints) -> Option<Format> {
        sniff_table(BITMAP_HINTS, hints).or(format)
    }

    fn sniff_blob(
        &self,
        format: Option<Format>,
        source: &SniffSource<'_>,
    ) -> ReadResult<Option<Format>> {
        let detected = if source.starts_with(b"\x89PNG\r\n\x1a\n")? {
            Some(Format::PNG)
        } else if source.starts_with(b"\xff\xd8\xff")? {
            Some(Format::JPEG)
        } else if source.starts_with(b"GIF87a")? || source.starts_with(b"GIF89a")? {
            Some(Format::GIF)
        } else if source.starts_with(b"RIFF")? && source.matches_at(8, b"WEBP")? {
            Some(Format::WEBP)
        } else if source.matches_at(4, b"ftypavif")? || source.matches_at(4, b"ftypavis")? {
            Some(Format::AVIF)
        } else if source.starts_with(b"II*\0")? || source.starts_with(b"MM\0*")? {
            Some(Format::TIFF)
        } else if source.starts_with(b"BM")? && source.length()? >= 26 {
            Some(Format::BMP)
        } else {
            None
        };
        Ok(detected.or(format))
    }
}

const AUDIO_HINTS: &[HintRow] = &[
    (Format::AAC, &["audio/aac", "audio/aacp"], &["aac"]),
    (Format::FLAC, &["audio/flac"], &["flac"]),
    (Format::MP3, &["audio/mpeg"], &["mp3"]),
    (Format::MP4, &["audio/mp4"], &["m4a", "m4b", "mp4"]),
    (Format::OPUS, &["audio/opus"], &["opus"]),
    (Format::OGG, &["audio/ogg"], &["oga", "ogg"]),
    (Format::WAV, &["audio/wav", "audio/x-wav", "audio/vnd.wave"], &["wav"]),
    (Format::WEBM, &["audio/webm"], &["webm"]),
];

/// Audio files.
#[derive(Debug, Clone, Copy, Default)]
pub struct AudioSniffer;

impl Sniffer for AudioSniffer {
    fn name(&self) -> &'static str {
        "audio"
    }

    fn sniff_hints(&self, format: Option<Format>, hints: &FormatHints) -> Option<Format> {
        sniff_table(AUDIO_HINTS, hints).or(format)
    }

    fn sniff_blob(
        &self,
        format: Option<Format>,
        source: &SniffSource<'_>,
    ) -> ReadResult<Option<Format>> {
        let prefix = source.prefix()?;
        let detected = if prefix.starts_with(b"ID3") {
            Some(Format::MP3)
        } else if prefix.starts_with(b"fLaC") {
            Some(Format::FLAC)
        } else if prefix.starts_with(b"OggS") {
            if source.matches_at(28, b"OpusHead")? {
                Some(Format::OPUS)
            } else {
                Some(Format::OGG)
            }
        } else if prefix.starts_with(b"RIFF") && source.matches_at(8, b"WAVE")? {
            Some(Format::WAV)
        } else if prefix.starts_with(b"\x1a\x45\xdf\xa3") {
            Some(Format::WEBM)
        } else if source.matches_at(4, b"ftyp")? && !source.matches_at(8, b"avi")? {
            Some(Format::MP4)
        } else {
            frame_sync(prefix)
        };
        Ok(detected.or(format))
    }
}

/// MPEG audio frame sync: eleven set bits, then the layer field tells
/// MP3 (layer set) from ADTS AAC (layer zero).
fn frame_sync(prefix: &[u8]) -> Option<Format> {
    match prefix {
        [0xff, second, ..] if second & 0xf6 == 0xf0 => Some(Format::AAC),
        [0xff, second, ..] if second & 0xe0 == 0xe0 && second & 0x06 != 0 => Some(Format::MP3),
        _ => None,
    }
}
