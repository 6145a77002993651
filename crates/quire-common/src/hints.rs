//! Pre-read evidence about a byte source.

use std::path::Path;

use crate::media_type::MediaType;

/// Declared media types and file extensions known before any byte is read.
///
/// Both sets are unordered and compared case-insensitively. Extensions are
/// stored lowercase without a leading dot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormatHints {
    media_types: Vec<MediaType>,
    file_extensions: Vec<String>,
}

impl FormatHints {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hints made of a media type string. Unparseable strings are ignored.
    pub fn from_media_type(media_type: &str) -> Self {
        Self::new().with_media_type(media_type)
    }

    pub fn from_file_extension(extension: &str) -> Self {
        Self::new().with_file_extension(extension)
    }

    /// Hints taken from the extension of `path`, if it has one.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        match path.as_ref().extension().and_then(|e| e.to_str()) {
            Some(ext) => Self::from_file_extension(ext),
            None => Self::new(),
        }
    }

    pub fn with_media_type(mut self, media_type: &str) -> Self {
        if let Some(mt) = MediaType::parse(media_type) {
            if !self.media_types.contains(&mt) {
                self.media_types.push(mt);
            }
        }
        self
    }

    pub fn with_file_extension(mut self, extension: &str) -> Self {
        let ext = extension.trim().trim_start_matches('.').to_ascii_lowercase();
        if !ext.is_empty() && !self.file_extensions.contains(&ext) {
            self.file_extensions.push(ext);
        }
        self
    }

    /// Union of both hint sets.
    pub fn merge(mut self, other: FormatHints) -> Self {
        for mt in other.media_types {
            if !self.media_types.contains(&mt) {
                self.media_types.push(mt);
            }
        }
        for ext in other.file_extensions {
            if !self.file_extensions.contains(&ext) {
                self.file_extensions.push(ext);
            }
        }
        self
    }

    pub fn media_types(&self) -> &[MediaType] {
        &self.media_types
    }

    pub fn file_extensions(&self) -> &[String] {
        &self.file_extensions
    }

    pub fn is_empty(&self) -> bool {
        self.media_types.is_empty() && self.file_extensions.is_empty()
    }

    /// Whether any declared media type matches any of `candidates`.
    pub fn has_media_type(&self, candidates: &[&str]) -> bool {
        candidates
            .iter()
            .filter_map(|c| MediaType::parse(c))
            .any(|pattern| self.media_types.iter().any(|mt| mt.matches(&pattern)))
    }

    /// Whether any declared extension equals one of `candidates`,
    /// ignoring case.
    pub fn has_file_extension(&self, candidates: &[&str]) -> bool {
        candidates.iter().any(|c| {
            let c = c.trim_start_matches('.');
            self.file_extensions
                .iter()
                .any(|ext| ext.eq_ignore_ascii_case(c))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_extension_normalisation() {
        let hints = FormatHints::from_file_extension(".EPUB");
        assert!(hints.has_file_extension(&["epub"]));
        assert!(hints.has_file_extension(&[".epub"]));
        assert_eq!(hints.file_extensions(), &["epub".to_string()]);
    }

    #[test]
    fn test_from_path() {
        let hints = FormatHints::from_path("/books/Moby Dick.Cbz");
        assert!(hints.has_file_extension(&["cbz"]));
        assert!(FormatHints::from_path("/books/README").is_empty());
    }

    #[test]
    fn test_media_type_with_parameters() {
        let hints = FormatHints::from_media_type("text/html; charset=UTF-8");
        assert!(hints.has_media_type(&["text/html"]));
        assert!(!hints.has_media_type(&["application/xhtml+xml"]));
    }

    #[test]
    fn test_invalid_media_type_ignored() {
        let hints = FormatHints::from_media_type("not a media type");
        assert!(hints.is_empty());
    }

    #[test]
    fn test_merge_deduplicates() {
        let hints = FormatHints::from_file_extension("zip")
            .merge(FormatHints::from_file_extension("ZIP").with_media_type("application/zip"));
        assert_eq!(hints.file_extensions().len(), 1);
        assert_eq!(hints.media_types().len(), 1);
    }

    proptest! {
        #[test]
        fn prop_media_type_case_insensitive(mask in proptest::collection::vec(any::<bool>(), 20)) {
            let canonical = "application/epub+zip";
            let cased: String = canonical
                .chars()
                .zip(mask.iter().cycle())
                .map(|(c, upper)| if *upper { c.to_ascii_uppercase() } else { c })
                .collect();

            let hints = FormatHints::from_media_type(&cased);
            prop_assert!(hints.has_media_type(&[canonical]));
            prop_assert_eq!(hints, FormatHints::from_media_type(canonical));
        }
    }
}
