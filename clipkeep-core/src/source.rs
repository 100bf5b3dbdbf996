use std::collections::BTreeSet;

use thiserror::Error;

/// Legacy AppKit file list: a property list array of POSIX paths.
pub const FORMAT_FILENAMES: &str = "NSFilenamesPboardType";
pub const FORMAT_FILE_URL: &str = "public.file-url";
pub const FORMAT_URI_LIST: &str = "text/uri-list";

pub const FORMAT_PNG: &str = "public.png";
pub const FORMAT_TIFF: &str = "public.tiff";
pub const FORMAT_IMAGE_PNG: &str = "image/png";

pub const FORMAT_UTF8_TEXT: &str = "public.utf8-plain-text";
pub const FORMAT_NS_STRING: &str = "NSStringPboardType";
pub const FORMAT_TEXT_PLAIN: &str = "text/plain";

/// File list formats in resolution order.
pub const FILE_LIST_FORMATS: &[&str] = &[FORMAT_FILENAMES, FORMAT_FILE_URL, FORMAT_URI_LIST];
pub const BITMAP_FORMATS: &[&str] = &[FORMAT_PNG, FORMAT_TIFF, FORMAT_IMAGE_PNG];
pub const TEXT_FORMATS: &[&str] = &[FORMAT_UTF8_TEXT, FORMAT_NS_STRING, FORMAT_TEXT_PLAIN];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormatSet(BTreeSet<String>);

impl FormatSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, format: impl Into<String>) {
        self.0.insert(format.into());
    }

    pub fn contains(&self, format: &str) -> bool {
        self.0.contains(format)
    }

    /// First format of `candidates` present in the set.
    pub fn first_of<'a>(&self, candidates: &[&'a str]) -> Option<&'a str> {
        candidates.iter().copied().find(|f| self.contains(f))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for FormatSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Rendered bitmap as straight RGBA8 rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbaImage {
    pub width: u32,
    pub height: u32,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("clipboard unavailable: {0}")]
    Unavailable(String),
    #[error("clipboard read failed: {0}")]
    Read(String),
    #[error("clipboard write failed: {0}")]
    Write(String),
}

/// Access to the OS clipboard.
///
/// Reads return `Ok(None)` when the requested representation is absent.
pub trait ClipboardSource: Send + Sync {
    fn available_formats(&self) -> Result<FormatSet, SourceError>;

    fn read_text(&self) -> Result<Option<String>, SourceError>;

    fn read_rendered_image(&self) -> Result<Option<RgbaImage>, SourceError>;

    fn read_file_list_descriptor(&self, format: &str) -> Result<Option<Vec<u8>>, SourceError>;

    /// OS change counter, when the platform exposes one.
    fn change_count(&self) -> Option<i64> {
        None
    }

    fn write_text(&self, text: &str) -> Result<(), SourceError>;

    fn write_image(&self, image: &RgbaImage) -> Result<(), SourceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_of_respects_candidate_order() {
        let formats: FormatSet = [FORMAT_URI_LIST, FORMAT_FILENAMES].into_iter().collect();
        assert_eq!(formats.first_of(FILE_LIST_FORMATS), Some(FORMAT_FILENAMES));
        assert_eq!(formats.first_of(TEXT_FORMATS), None);
    }
}
